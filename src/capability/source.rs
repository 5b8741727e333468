//! Module sources: the pinned CDN and the in-process builtin set.

use super::{Capability, CapabilityHandle, Module, ModuleSource};
use crate::export::pdf::LopdfAuthor;
use crate::export::slides::PptxAuthor;
use crate::rendering::raster::NativeRasterizer;
use crate::{Error, ExportConfig, Result};
use futures::future::BoxFuture;
use log::debug;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The backend linked to a capability once its module is available.
fn native_handle(capability: Capability) -> CapabilityHandle {
    match capability {
        Capability::BitmapSnapshot => CapabilityHandle::BitmapSnapshot(Arc::new(NativeRasterizer::new())),
        Capability::PdfAuthor => CapabilityHandle::PdfAuthor(Arc::new(LopdfAuthor::new())),
        Capability::SlideAuthor => CapabilityHandle::SlideAuthor(Arc::new(PptxAuthor::new())),
    }
}

/// Fetches each capability's module from its pinned URL.
///
/// A module is accepted when the fetch succeeds and the body declares the
/// capability's entry point as an export; the entry point is then bound to
/// the matching native backend. A body without the export yields a module
/// with no entry, which the loader reports as unavailable.
pub struct CdnModuleSource {
    client: Client,
    urls: HashMap<Capability, String>,
    user_agent: String,
    timeout_ms: u64,
}

impl CdnModuleSource {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let urls = Capability::ALL
            .iter()
            .map(|c| (*c, c.module_url().to_string()))
            .collect();
        Ok(Self {
            client,
            urls,
            user_agent: config.user_agent.clone(),
            timeout_ms: config.http_timeout_ms,
        })
    }

    /// Point one capability at a different location (mirrors, fixtures).
    pub fn with_url(mut self, capability: Capability, url: impl Into<String>) -> Self {
        self.urls.insert(capability, url.into());
        self
    }

    pub fn url_for(&self, capability: Capability) -> &str {
        self.urls
            .get(&capability)
            .map(String::as_str)
            .unwrap_or_else(|| capability.module_url())
    }
}

impl ModuleSource for CdnModuleSource {
    fn describe(&self) -> String {
        format!("cdn (agent {}, timeout {}ms)", self.user_agent, self.timeout_ms)
    }

    fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
        Box::pin(async move {
            let url = self.url_for(capability).to_string();
            let unavailable = |cause: String| Error::DependencyUnavailable { capability, cause };

            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| unavailable(format!("fetch {} failed: {}", url, e)))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(unavailable(format!("{} returned HTTP {}", url, status.as_u16())));
            }
            let body = resp
                .text()
                .await
                .map_err(|e| unavailable(format!("reading {} failed: {}", url, e)))?;
            debug!("Fetched {} ({} bytes)", url, body.len());

            let entry = capability.entry_point();
            let mut module = Module::new(url);
            if declares_export(&body, entry) {
                module = module.with_export(entry, native_handle(capability));
            }
            Ok(module)
        })
    }
}

/// Resolves every capability in-process without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinModuleSource;

impl ModuleSource for BuiltinModuleSource {
    fn describe(&self) -> String {
        "builtin".to_string()
    }

    fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
        Box::pin(async move {
            Ok(Module::new(format!("builtin:{}", capability))
                .with_export(capability.entry_point(), native_handle(capability)))
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn has_ident(haystack: &str, name: &str) -> bool {
    haystack.match_indices(name).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + name.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

/// Whether an ES module (or CommonJS bundle) body exports `name`.
///
/// This is a text scan, not a parse. An `export` inside a string literal or
/// a comment counts too, so a body can be accepted that a module loader
/// would reject.
pub(crate) fn declares_export(source: &str, name: &str) -> bool {
    if name == "default"
        && (source.contains("export default")
            || has_ident(source, "default") && source.contains(" as default")
            || source.contains("module.exports"))
    {
        return true;
    }
    if source.contains(&format!("exports.{} ", name)) || source.contains(&format!("exports.{}=", name)) {
        return true;
    }

    source.match_indices("export").any(|(at, _)| {
        let rest = source[at + "export".len()..].trim_start();
        let stmt = if rest.starts_with('{') {
            rest.split('}').next().unwrap_or("")
        } else {
            let end = rest
                .find(|c| matches!(c, ';' | '\n' | '(' | '=' | '{'))
                .unwrap_or(rest.len());
            &rest[..end]
        };
        has_ident(stmt, name)
    })
}
