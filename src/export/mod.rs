//! Document assemblers and the export-in-progress state machine.
//!
//! [`Exporter`] is the single boundary between the pipeline and whoever
//! triggers an export. Internal stages fail with [`Error`]; the exporter logs
//! the cause and hands the caller only [`ExportUnavailable`].

pub mod pdf;
pub mod slides;

use crate::capability::DependencyLoader;
use crate::rendering::snapshot::SnapshotRenderer;
use crate::rendering::target::RenderTarget;
use crate::{Error, ExportConfig, ExportUnavailable, Result};
use futures::future::BoxFuture;
use log::{debug, error, info};
use slides::SlideLayout;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Whether an export is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting,
}

/// What an export call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved { path: PathBuf },
    /// The target held no records; nothing was acquired or written
    NothingToExport,
    /// Another export holds the flag; this call did nothing
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Slides,
}

impl DocumentKind {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Slides => "pptx",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => f.write_str("PDF"),
            DocumentKind::Slides => f.write_str("slide deck"),
        }
    }
}

/// Where finished documents go.
pub trait SaveSink: Send + Sync {
    fn save<'a>(&'a self, file_name: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Saves into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl SaveSink for DirectorySink {
    fn save<'a>(&'a self, file_name: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.dir.join(file_name);
            tokio::fs::write(&path, &bytes).await?;
            info!("Saved {} ({} bytes)", path.display(), bytes.len());
            Ok(path)
        })
    }
}

/// `file_name` with `.ext` appended unless it already ends with it.
pub fn file_name_with_extension(file_name: &str, kind: DocumentKind) -> Result<String> {
    let name = file_name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::Config(format!("invalid file name `{}`", file_name)));
    }
    let ext = kind.extension();
    let has_ext = name
        .rsplit_once('.')
        .map(|(stem, e)| !stem.is_empty() && e.eq_ignore_ascii_case(ext))
        .unwrap_or(false);
    Ok(if has_ext {
        name.to_string()
    } else {
        format!("{}.{}", name, ext)
    })
}

/// Clears the flag when dropped.
struct ExportSession<'a> {
    state: &'a Mutex<ExportState>,
}

impl Drop for ExportSession<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ExportState::Idle;
        debug!("Export state -> Idle");
    }
}

/// PDF and slide assemblers sharing one capability loader and one flag.
pub struct Exporter {
    loader: Arc<DependencyLoader>,
    renderer: SnapshotRenderer,
    sink: Arc<dyn SaveSink>,
    state: Mutex<ExportState>,
}

impl Exporter {
    /// Process-wide loader, files saved under `config.output_dir`.
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let loader = DependencyLoader::shared(config)?;
        let sink = Arc::new(DirectorySink::new(config.output_dir.clone()));
        Ok(Self::with_parts(loader, sink, config))
    }

    pub fn with_parts(loader: Arc<DependencyLoader>, sink: Arc<dyn SaveSink>, config: &ExportConfig) -> Self {
        Self {
            renderer: SnapshotRenderer::new(loader.clone(), config),
            loader,
            sink,
            state: Mutex::new(ExportState::Idle),
        }
    }

    pub fn loader(&self) -> &Arc<DependencyLoader> {
        &self.loader
    }

    pub fn state(&self) -> ExportState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_exporting(&self) -> bool {
        self.state() == ExportState::Exporting
    }

    /// Whether an export action for `target` should be enabled.
    pub fn can_export(&self, target: &RenderTarget) -> bool {
        !target.is_empty() && !self.is_exporting()
    }

    fn begin(&self) -> Option<ExportSession<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ExportState::Exporting {
            return None;
        }
        *state = ExportState::Exporting;
        debug!("Export state -> Exporting");
        Some(ExportSession { state: &self.state })
    }

    /// Capture `target` and save it as a one-page landscape PDF.
    pub async fn export_as_pdf(
        &self,
        target: &RenderTarget,
        file_name: &str,
    ) -> std::result::Result<ExportOutcome, ExportUnavailable> {
        self.export(target, file_name, DocumentKind::Pdf).await
    }

    /// Capture `target` and save it as a one-slide deck.
    pub async fn export_as_slides(
        &self,
        target: &RenderTarget,
        file_name: &str,
    ) -> std::result::Result<ExportOutcome, ExportUnavailable> {
        self.export(target, file_name, DocumentKind::Slides).await
    }

    async fn export(
        &self,
        target: &RenderTarget,
        file_name: &str,
        kind: DocumentKind,
    ) -> std::result::Result<ExportOutcome, ExportUnavailable> {
        if target.is_empty() {
            info!("Nothing to export as {}", kind);
            return Ok(ExportOutcome::NothingToExport);
        }
        let Some(_session) = self.begin() else {
            info!("{} export ignored: another export is running", kind);
            return Ok(ExportOutcome::Busy);
        };

        match self.assemble(target, file_name, kind).await {
            Ok(path) => Ok(ExportOutcome::Saved { path }),
            Err(e) => {
                error!("{} export of `{}` failed: {}", kind, file_name, e);
                Err(ExportUnavailable)
            }
        }
    }

    async fn assemble(&self, target: &RenderTarget, file_name: &str, kind: DocumentKind) -> Result<PathBuf> {
        let name = file_name_with_extension(file_name, kind)?;
        let artifact = self.renderer.capture(target).await?;
        let bytes = match kind {
            DocumentKind::Pdf => {
                let author = self.loader.pdf_author().await?;
                let page = author.landscape_page();
                debug!("PDF page {}x{} pt", page.width, page.height);
                author.render_full_page(&artifact, page)?
            }
            DocumentKind::Slides => {
                let author = self.loader.slide_author().await?;
                let layout = author.layout().unwrap_or(SlideLayout::WIDESCREEN);
                debug!("Slide {}x{} EMU", layout.width_emu, layout.height_emu);
                author.single_slide(&artifact, layout)?
            }
        };
        self.sink.save(&name, bytes).await
    }
}
