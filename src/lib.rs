//! Pamphlet
//!
//! Turns a roster of people into a downloadable single-page PDF or a
//! single-slide deck by rasterizing a staged card layout.
//!
//! # Pipeline
//!
//! - **Dependency loader**: the bitmap, PDF and slide capabilities are
//!   resolved from a module source on first use and cached per process
//! - **Snapshot renderer**: waits for every image in the target to settle,
//!   then captures it as a PNG at a fixed pixel ratio
//! - **Assemblers**: wrap the PNG as one full-bleed page or slide and save it
//!
//! # Example
//!
//! ```no_run
//! use pamphlet::{ExportConfig, ExportableRecord, Exporter, HttpImageLoader, RenderTarget, StagingMode};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig {
//!     output_dir: "exports".into(),
//!     ..Default::default()
//! };
//! let records = vec![
//!     ExportableRecord::new("1", "Ada Lovelace").with_designation("Dean"),
//!     ExportableRecord::new("2", "Alan Turing").with_image("https://example.com/alan.jpg"),
//! ];
//! let loader = Arc::new(HttpImageLoader::new(&config)?);
//! let target = RenderTarget::stage(records, Some("Academic Council"), StagingMode::OffScreen, &config, loader)?;
//!
//! let exporter = Exporter::new(&config)?;
//! let outcome = exporter.export_as_pdf(&target, "academic-council-pamphlet.pdf").await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use url::Url;

pub mod capability;
pub mod error;
pub mod export;
pub mod record;
pub mod rendering;

pub use capability::{Capability, CapabilityHandle, DependencyLoader};
pub use error::{Error, ExportUnavailable, Result};
pub use export::{DirectorySink, ExportOutcome, ExportState, Exporter, SaveSink};
pub use record::ExportableRecord;
pub use rendering::images::{HttpImageLoader, ImageLoader};
pub use rendering::layout::LayoutOptions;
pub use rendering::snapshot::SnapshotRenderer;
pub use rendering::target::{RenderTarget, StagingMode};
pub use rendering::{Color, ExportArtifact};

/// Configuration for staging, capture and saving
///
/// Defaults match what the two roster exports use:
/// - captures at 2x on white
/// - cross-origin photos are included
/// - files land in the current directory
///
/// # Examples
///
/// ```
/// let cfg = pamphlet::ExportConfig::default();
/// assert_eq!(cfg.pixel_ratio, 2.0);
/// assert!(cfg.include_cross_origin_images);
/// ```
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Device pixels per CSS px in the captured image
    pub pixel_ratio: f32,
    /// Capture background when the target has no opaque color of its own
    pub background_color: Color,
    /// Paint photos from other origins instead of leaving their slots blank
    pub include_cross_origin_images: bool,
    /// Geometry of the staged card grid
    pub layout: LayoutOptions,
    /// Directory `DirectorySink` writes into
    pub output_dir: PathBuf,
    /// Timeout for module and image requests in milliseconds
    pub http_timeout_ms: u64,
    /// User agent sent with module and image requests
    pub user_agent: String,
    /// Page the target lives on; relative image URLs resolve against it
    pub page_origin: Option<Url>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            background_color: Color::WHITE,
            include_cross_origin_images: true,
            layout: LayoutOptions::default(),
            output_dir: PathBuf::from("."),
            http_timeout_ms: 30000,
            user_agent: format!("pamphlet/{}", env!("CARGO_PKG_VERSION")),
            page_origin: None,
        }
    }
}
