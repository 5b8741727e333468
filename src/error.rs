//! Error types for the export pipeline

use crate::capability::Capability;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while staging, capturing or assembling an export
#[derive(Error, Debug)]
pub enum Error {
    /// A remote capability failed to load or did not expose its entry point
    #[error("{capability} is unavailable: {cause}")]
    DependencyUnavailable {
        capability: Capability,
        cause: String,
    },

    /// The render target has no measurable size (or nothing to export)
    #[error("Render target is empty")]
    EmptyRenderTarget,

    /// Rasterization produced something that is not a usable PNG data URI
    #[error("Rasterizer produced an invalid image: {0}")]
    RenderProducedInvalidImage(String),

    /// The PDF or slide library failed while building the document
    #[error("Document assembly failed: {0}")]
    Assembly(String),

    /// Writing the finished file failed
    #[error("Failed to save export: {0}")]
    Save(#[from] std::io::Error),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration or input
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Assembly(format!("pdf: {}", err))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Assembly(format!("pptx: {}", err))
    }
}

/// The only failure an admin ever sees.
///
/// The underlying cause is logged by the exporter before this value is
/// produced; the message deliberately names neither the stage nor the
/// library that failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Export unavailable, please try again.")]
pub struct ExportUnavailable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_error_names_capability() {
        let err = Error::DependencyUnavailable {
            capability: Capability::PdfAuthor,
            cause: "HTTP 503".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pdf-author"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn user_facing_message_is_generic() {
        assert_eq!(
            ExportUnavailable.to_string(),
            "Export unavailable, please try again."
        );
    }
}
