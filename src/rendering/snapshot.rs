//! Capture a staged [`RenderTarget`] as a PNG artifact.

use crate::capability::DependencyLoader;
use crate::rendering::paint::build_scene;
use crate::rendering::raster::RasterOptions;
use crate::rendering::target::RenderTarget;
use crate::rendering::{Color, ExportArtifact};
use crate::{Error, ExportConfig, Result};
use log::{debug, info};
use std::sync::Arc;

/// Turns render targets into [`ExportArtifact`]s.
#[derive(Clone)]
pub struct SnapshotRenderer {
    loader: Arc<DependencyLoader>,
    options: RasterOptions,
    background: Color,
    include_cross_origin: bool,
}

impl SnapshotRenderer {
    pub fn new(loader: Arc<DependencyLoader>, config: &ExportConfig) -> Self {
        Self {
            loader,
            options: RasterOptions {
                pixel_ratio: config.pixel_ratio,
            },
            background: config.background_color,
            include_cross_origin: config.include_cross_origin_images,
        }
    }

    /// Capture `target`.
    ///
    /// Steps run strictly in order:
    /// 1. measure; a zero-sized target fails with `EmptyRenderTarget`
    /// 2. wait for every contained image to load or error (unbounded)
    /// 3. patch hidden staging styles; restored when the guard drops,
    ///    whichever way this function exits
    /// 4. acquire the bitmap-snapshot capability
    /// 5. rasterize at the configured pixel ratio and background
    /// 6. validate the encoded result
    pub async fn capture(&self, target: &RenderTarget) -> Result<ExportArtifact> {
        let (width, height) = target.measured_size();
        if width == 0 || height == 0 {
            debug!("Refusing to capture {}x{} target", width, height);
            return Err(Error::EmptyRenderTarget);
        }

        target.wait_for_images().await;
        debug!("All {} images settled", target.images().len());

        let _guard = target.prepare_for_capture();
        let rasterizer = self.loader.rasterizer().await?;
        let background = target.effective_background(self.background);
        let scene = build_scene(target, background, self.include_cross_origin);
        let encoded = rasterizer.to_png(&scene, self.options).await?;
        let artifact = ExportArtifact::from_data_url(encoded)?;

        info!(
            "Captured {} records as {}x{} PNG",
            target.records().len(),
            artifact.width,
            artifact.height
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        BuiltinModuleSource, Capability, CapabilityHandle, Module, ModuleSource,
    };
    use crate::record::ExportableRecord;
    use crate::rendering::images::ImageLoader;
    use crate::rendering::paint::Scene;
    use crate::rendering::raster::Rasterizer;
    use crate::rendering::target::StagingMode;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct NoImages;

    impl ImageLoader for NoImages {
        fn load(&self, _src: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
            Box::pin(async { Err(Error::Network("offline".into())) })
        }
    }

    struct Gated(Arc<Notify>);

    impl ImageLoader for Gated {
        fn load(&self, _src: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
            let gate = self.0.clone();
            Box::pin(async move {
                gate.notified().await;
                Err(Error::Network("slow then broken".into()))
            })
        }
    }

    /// Returns whatever `output` says and counts calls.
    struct FixedOutput {
        output: String,
        calls: Arc<AtomicUsize>,
    }

    impl Rasterizer for FixedOutput {
        fn to_png<'a>(&'a self, _scene: &'a Scene, _options: RasterOptions) -> BoxFuture<'a, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = self.output.clone();
            Box::pin(async move { Ok(out) })
        }
    }

    struct RasterOnly(Arc<dyn Rasterizer>);

    impl ModuleSource for RasterOnly {
        fn fetch(&self, capability: Capability) -> BoxFuture<'_, Result<Module>> {
            let handle = CapabilityHandle::BitmapSnapshot(self.0.clone());
            Box::pin(async move {
                Ok(Module::new("mem://raster").with_export(capability.entry_point(), handle))
            })
        }
    }

    fn renderer() -> SnapshotRenderer {
        let loader = Arc::new(DependencyLoader::new(Arc::new(BuiltinModuleSource)));
        SnapshotRenderer::new(loader, &ExportConfig::default())
    }

    fn stage(mode: StagingMode, loader: Arc<dyn ImageLoader>) -> RenderTarget {
        RenderTarget::stage(
            vec![
                ExportableRecord::new("1", "Ada Lovelace").with_image("https://img.test/ada.png"),
                ExportableRecord::new("2", "Alan Turing").with_designation("Dean"),
            ],
            Some("Academic Council"),
            mode,
            &ExportConfig::default(),
            loader,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn capture_produces_measured_png() {
        let target = stage(StagingMode::OffScreen, Arc::new(NoImages));
        let before = target.style();
        let artifact = renderer().capture(&target).await.unwrap();
        assert!(artifact.data_url.starts_with(ExportArtifact::PNG_DATA_PREFIX));
        let (w, h) = target.measured_size();
        assert_eq!((artifact.width, artifact.height), (w * 2, h * 2));
        assert_eq!(target.style(), before);
    }

    #[tokio::test]
    async fn display_none_fails_before_rasterizing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let raster = Arc::new(FixedOutput {
            output: "unused".into(),
            calls: calls.clone(),
        });
        let loader = Arc::new(DependencyLoader::new(Arc::new(RasterOnly(raster))));
        let renderer = SnapshotRenderer::new(loader.clone(), &ExportConfig::default());

        let target = stage(StagingMode::OnScreen, Arc::new(NoImages));
        target.hide();
        assert!(matches!(renderer.capture(&target).await, Err(Error::EmptyRenderTarget)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!loader.is_resolved(Capability::BitmapSnapshot));
    }

    #[tokio::test]
    async fn invalid_output_is_rejected_and_styles_restored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let raster = Arc::new(FixedOutput {
            output: "data:,".into(),
            calls: calls.clone(),
        });
        let loader = Arc::new(DependencyLoader::new(Arc::new(RasterOnly(raster))));
        let renderer = SnapshotRenderer::new(loader, &ExportConfig::default());

        let target = stage(StagingMode::OffScreen, Arc::new(NoImages));
        let before = target.style();
        let result = renderer.capture(&target).await;
        assert!(matches!(result, Err(Error::RenderProducedInvalidImage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(target.style(), before);
    }

    #[tokio::test]
    async fn capture_waits_for_pending_images() {
        let gate = Arc::new(Notify::new());
        let target = stage(StagingMode::OffScreen, Arc::new(Gated(gate.clone())));
        let renderer = renderer();

        let early = tokio::time::timeout(Duration::from_millis(60), renderer.capture(&target)).await;
        assert!(early.is_err(), "capture resolved while an image was pending");

        gate.notify_one();
        let artifact = renderer.capture(&target).await.unwrap();
        assert!(artifact.width > 0 && artifact.height > 0);
    }
}
