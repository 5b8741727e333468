//! Capability-keyed memoization table.

use super::{Capability, CapabilityHandle, CdnModuleSource, ModuleSource};
use crate::export::pdf::PdfAuthor;
use crate::export::slides::SlideAuthor;
use crate::rendering::raster::Rasterizer;
use crate::{Error, ExportConfig, Result};
use log::{debug, info, warn};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

static SHARED: OnceLock<Arc<DependencyLoader>> = OnceLock::new();

/// Resolves capabilities once per loader and hands out the cached handle.
///
/// Only successful resolutions are cached. A failed fetch leaves the slot
/// empty so the next `acquire` fetches again. Concurrent callers for the same
/// capability share a single in-flight fetch.
pub struct DependencyLoader {
    source: Arc<dyn ModuleSource>,
    slots: [OnceCell<CapabilityHandle>; 3],
}

impl DependencyLoader {
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self {
            source,
            slots: [OnceCell::new(), OnceCell::new(), OnceCell::new()],
        }
    }

    /// The process-wide loader backed by the pinned CDN module URLs.
    ///
    /// The first call builds the HTTP client from `config` (timeout and user
    /// agent). Later calls return that same loader and ignore their `config`.
    pub fn shared(config: &ExportConfig) -> Result<Arc<DependencyLoader>> {
        if let Some(loader) = SHARED.get() {
            return Ok(loader.clone());
        }
        let source = CdnModuleSource::new(config)?;
        let loader = Arc::new(DependencyLoader::new(Arc::new(source)));
        Ok(SHARED.get_or_init(|| loader).clone())
    }

    pub fn source(&self) -> String {
        self.source.describe()
    }

    /// Whether `capability` has already been resolved
    pub fn is_resolved(&self, capability: Capability) -> bool {
        self.slots[capability.index()].initialized()
    }

    /// Return the handle for `capability`, fetching its module on first use.
    pub async fn acquire(&self, capability: Capability) -> Result<CapabilityHandle> {
        let slot = &self.slots[capability.index()];
        if let Some(handle) = slot.get() {
            debug!("{} already resolved", capability);
            return Ok(handle.clone());
        }
        slot.get_or_try_init(|| self.resolve(capability))
            .await
            .cloned()
    }

    async fn resolve(&self, capability: Capability) -> Result<CapabilityHandle> {
        info!("Loading {} module from {}", capability, self.source.describe());
        let module = self.source.fetch(capability).await.map_err(|e| match e {
            Error::DependencyUnavailable { .. } => e,
            other => Error::DependencyUnavailable {
                capability,
                cause: other.to_string(),
            },
        });
        let module = match module {
            Ok(m) => m,
            Err(e) => {
                warn!("{}", e);
                return Err(e);
            }
        };

        let entry = capability.entry_point();
        let handle = module
            .export(entry)
            .cloned()
            .ok_or_else(|| Error::DependencyUnavailable {
                capability,
                cause: format!("module {} has no `{}` export", module.url, entry),
            })?;
        if handle.capability() != capability {
            return Err(Error::DependencyUnavailable {
                capability,
                cause: format!(
                    "`{}` export of {} provides {}",
                    entry,
                    module.url,
                    handle.capability()
                ),
            });
        }
        info!("{} ready from {}", capability, module.url);
        Ok(handle)
    }

    pub async fn rasterizer(&self) -> Result<Arc<dyn Rasterizer>> {
        match self.acquire(Capability::BitmapSnapshot).await? {
            CapabilityHandle::BitmapSnapshot(r) => Ok(r),
            other => Err(mismatch(Capability::BitmapSnapshot, &other)),
        }
    }

    pub async fn pdf_author(&self) -> Result<Arc<dyn PdfAuthor>> {
        match self.acquire(Capability::PdfAuthor).await? {
            CapabilityHandle::PdfAuthor(a) => Ok(a),
            other => Err(mismatch(Capability::PdfAuthor, &other)),
        }
    }

    pub async fn slide_author(&self) -> Result<Arc<dyn SlideAuthor>> {
        match self.acquire(Capability::SlideAuthor).await? {
            CapabilityHandle::SlideAuthor(a) => Ok(a),
            other => Err(mismatch(Capability::SlideAuthor, &other)),
        }
    }
}

fn mismatch(capability: Capability, got: &CapabilityHandle) -> Error {
    Error::DependencyUnavailable {
        capability,
        cause: format!("resolved handle provides {}", got.capability()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BuiltinModuleSource, Module};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails until `fail_remaining` reaches zero, counting every fetch.
    struct FlakySource {
        fetches: AtomicUsize,
        fail_remaining: Mutex<usize>,
    }

    impl FlakySource {
        fn new(failures: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_remaining: Mutex::new(failures),
            }
        }
    }

    impl ModuleSource for FlakySource {
        fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                let fail = {
                    let mut left = self.fail_remaining.lock().unwrap();
                    let fail = *left > 0;
                    if fail {
                        *left -= 1;
                    }
                    fail
                };
                if fail {
                    return Err(Error::Network("connection reset".into()));
                }
                BuiltinModuleSource.fetch(capability).await
            })
        }
    }

    #[tokio::test]
    async fn success_is_fetched_once() {
        let source = Arc::new(FlakySource::new(0));
        let loader = DependencyLoader::new(source.clone());
        for _ in 0..5 {
            loader.acquire(Capability::PdfAuthor).await.unwrap();
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(loader.is_resolved(Capability::PdfAuthor));
        assert!(!loader.is_resolved(Capability::SlideAuthor));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let source = Arc::new(FlakySource::new(3));
        let loader = DependencyLoader::new(source.clone());
        for _ in 0..3 {
            let err = loader.acquire(Capability::SlideAuthor).await.unwrap_err();
            match err {
                Error::DependencyUnavailable { capability, cause } => {
                    assert_eq!(capability, Capability::SlideAuthor);
                    assert!(cause.contains("connection reset"));
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);

        loader.slide_author().await.unwrap();
        loader.slide_author().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);
    }

    struct EmptyModules;

    impl ModuleSource for EmptyModules {
        fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
            Box::pin(async move { Ok(Module::new(format!("mem://{}", capability))) })
        }
    }

    #[tokio::test]
    async fn missing_entry_point_is_unavailable() {
        let loader = DependencyLoader::new(Arc::new(EmptyModules));
        let err = loader.rasterizer().await.err().expect("should fail");
        assert!(err.to_string().contains("toPng"));
        assert!(!loader.is_resolved(Capability::BitmapSnapshot));
    }

    struct WrongShape;

    impl ModuleSource for WrongShape {
        fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
            Box::pin(async move {
                let pdf = BuiltinModuleSource.fetch(Capability::PdfAuthor).await?;
                let handle = pdf.export("jsPDF").cloned().unwrap();
                Ok(Module::new("mem://wrong").with_export(capability.entry_point(), handle))
            })
        }
    }

    #[tokio::test]
    async fn export_of_wrong_kind_is_rejected() {
        let loader = DependencyLoader::new(Arc::new(WrongShape));
        assert!(loader.acquire(Capability::SlideAuthor).await.is_err());
        assert!(loader.acquire(Capability::PdfAuthor).await.is_ok());
    }

    #[test]
    fn shared_loader_keeps_the_first_config() {
        let first = ExportConfig {
            user_agent: "roster-export/test".into(),
            http_timeout_ms: 1_500,
            ..Default::default()
        };
        let loader = DependencyLoader::shared(&first).unwrap();
        assert_eq!(loader.source(), "cdn (agent roster-export/test, timeout 1500ms)");

        let again = DependencyLoader::shared(&ExportConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&loader, &again));
        assert_eq!(again.source(), loader.source());
    }

    #[test]
    fn builtin_source_describes_itself() {
        let loader = DependencyLoader::new(Arc::new(BuiltinModuleSource));
        assert_eq!(loader.source(), "builtin");
        assert_eq!(DependencyLoader::new(Arc::new(EmptyModules)).source(), "module source");
    }
}
