use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ocr::BoundingBox;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("input directory {} does not exist", .0.display())]
    InputDirNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {:.1}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("worker task failed: {0}")]
    Task(String),
}

impl Error {
    /// Errors that must stop the run before any file is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::InputDirNotFound(_) | Error::Configuration(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Ocr,
    Translation,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Ocr => f.write_str("ocr"),
            ServiceKind::Translation => f.write_str("translation"),
        }
    }
}

/// Failure reported by an external collaborator.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("ocr rejected the image: {0}")]
    InvalidImage(String),

    #[error("unsupported target language '{0}'")]
    UnsupportedLanguage(String),

    #[error("{service} service unavailable: {message}")]
    Unavailable { service: ServiceKind, message: String },

    #[error("{service} service rejected the request ({status}): {message}")]
    Rejected {
        service: ServiceKind,
        status: u16,
        message: String,
    },

    #[error("{service} service returned a malformed response: {message}")]
    Malformed { service: ServiceKind, message: String },
}

impl ServiceError {
    pub fn service(&self) -> ServiceKind {
        match self {
            ServiceError::InvalidImage(_) => ServiceKind::Ocr,
            ServiceError::UnsupportedLanguage(_) => ServiceKind::Translation,
            ServiceError::Unavailable { service, .. }
            | ServiceError::Rejected { service, .. }
            | ServiceError::Malformed { service, .. } => *service,
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("degenerate box {0:?} has no area")]
    DegenerateBox(BoundingBox),

    #[error("failed to build overlay svg: {0}")]
    Svg(String),

    #[error("failed to rasterize overlay: {0}")]
    Raster(String),
}

/// A font that could not be loaded; callers fall back instead of failing.
#[derive(Error, Debug)]
#[error("font unavailable: {source_name} ({reason})")]
pub struct FontUnavailable {
    pub source_name: String,
    pub reason: String,
}
