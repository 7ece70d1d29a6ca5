mod parse;
mod tesseract;

use std::future::Future;
use std::pin::Pin;

use crate::error::ServiceError;
use crate::ocr::TextFragment;

pub use tesseract::Tesseract;

pub(crate) use parse::parse_tsv_words;

/// Fragments recognized in one image, in the order the service reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrDetection {
    /// Whole-image aggregate text; never treated as a located fragment.
    pub full_text: Option<String>,
    pub fragments: Vec<TextFragment>,
}

pub type OcrFuture<'a> = Pin<Box<dyn Future<Output = Result<OcrDetection, ServiceError>> + Send + 'a>>;

pub trait OcrService: Send + Sync {
    fn detect<'a>(&'a self, image_bytes: &'a [u8]) -> OcrFuture<'a>;
}
