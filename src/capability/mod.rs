//! Optional rendering capabilities resolved from a module source on first use.
//!
//! The three heavyweight pieces of the export pipeline (bitmap snapshot,
//! PDF authoring, slide authoring) are not linked into a caller until an
//! export actually needs them. A [`ModuleSource`] produces a [`Module`] for a
//! capability; the [`DependencyLoader`] extracts the capability's entry point
//! from it and memoizes the resulting [`CapabilityHandle`].

pub mod loader;
pub mod source;

pub use loader::DependencyLoader;
pub use source::{BuiltinModuleSource, CdnModuleSource};

use crate::export::pdf::PdfAuthor;
use crate::export::slides::SlideAuthor;
use crate::rendering::raster::Rasterizer;
use crate::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The closed set of lazily loaded capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    BitmapSnapshot,
    PdfAuthor,
    SlideAuthor,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::BitmapSnapshot,
        Capability::PdfAuthor,
        Capability::SlideAuthor,
    ];

    /// Stable identifier used in logs and errors
    pub fn id(self) -> &'static str {
        match self {
            Capability::BitmapSnapshot => "bitmap-snapshot",
            Capability::PdfAuthor => "pdf-author",
            Capability::SlideAuthor => "slide-author",
        }
    }

    /// Name of the export a module must provide for this capability
    pub fn entry_point(self) -> &'static str {
        match self {
            Capability::BitmapSnapshot => "toPng",
            Capability::PdfAuthor => "jsPDF",
            Capability::SlideAuthor => "default",
        }
    }

    /// Fixed, versioned location of the module. Not configurable.
    pub fn module_url(self) -> &'static str {
        match self {
            Capability::BitmapSnapshot => "https://cdn.jsdelivr.net/npm/html-to-image@1.11.11/+esm",
            Capability::PdfAuthor => "https://cdn.jsdelivr.net/npm/jspdf@2.5.1/+esm",
            Capability::SlideAuthor => "https://cdn.jsdelivr.net/npm/pptxgenjs@3.12.0/+esm",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Capability::BitmapSnapshot => 0,
            Capability::PdfAuthor => 1,
            Capability::SlideAuthor => 2,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A resolved capability. Cheap to clone; every clone shares the backend.
#[derive(Clone)]
pub enum CapabilityHandle {
    BitmapSnapshot(Arc<dyn Rasterizer>),
    PdfAuthor(Arc<dyn PdfAuthor>),
    SlideAuthor(Arc<dyn SlideAuthor>),
}

impl CapabilityHandle {
    /// Which capability this handle provides
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityHandle::BitmapSnapshot(_) => Capability::BitmapSnapshot,
            CapabilityHandle::PdfAuthor(_) => Capability::PdfAuthor,
            CapabilityHandle::SlideAuthor(_) => Capability::SlideAuthor,
        }
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapabilityHandle")
            .field(&self.capability().id())
            .finish()
    }
}

/// A fetched module: its location and the entry points it exports.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub url: String,
    exports: HashMap<String, CapabilityHandle>,
}

impl Module {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exports: HashMap::new(),
        }
    }

    pub fn with_export(mut self, name: impl Into<String>, handle: CapabilityHandle) -> Self {
        self.exports.insert(name.into(), handle);
        self
    }

    pub fn export(&self, name: &str) -> Option<&CapabilityHandle> {
        self.exports.get(name)
    }
}

/// Where capability modules come from.
///
/// Implementations perform the (possibly remote) fetch; they do not cache.
/// Caching and retry policy live in [`DependencyLoader`].
pub trait ModuleSource: Send + Sync {
    fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>>;

    /// Short label used in loader logs.
    fn describe(&self) -> String {
        "module source".to_string()
    }
}
