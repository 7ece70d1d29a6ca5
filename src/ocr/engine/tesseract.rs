use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{ServiceError, ServiceKind};

use super::{OcrDetection, OcrFuture, OcrService, parse_tsv_words};

/// Sparse text: find as much text as possible in no particular order.
const PAGE_SEGMENTATION_MODE: u32 = 11;

/// Local OCR through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct Tesseract {
    languages: String,
}

impl Tesseract {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }
}

impl OcrService for Tesseract {
    fn detect<'a>(&'a self, image_bytes: &'a [u8]) -> OcrFuture<'a> {
        let bytes = image_bytes.to_vec();
        let languages = self.languages.clone();
        Box::pin(async move {
            let format = image::guess_format(&bytes)
                .map_err(|err| ServiceError::InvalidImage(err.to_string()))?;
            let suffix = format!(".{}", format.extensions_str().first().copied().unwrap_or("img"));
            let tsv = tokio::task::spawn_blocking(move || {
                let mut tmp = tempfile::Builder::new()
                    .suffix(&suffix)
                    .tempfile()
                    .map_err(|err| unavailable(format!("failed to create temp file: {}", err)))?;
                tmp.write_all(&bytes)
                    .and_then(|_| tmp.flush())
                    .map_err(|err| unavailable(format!("failed to write temp image: {}", err)))?;
                run_tesseract_tsv(tmp.path(), &languages)
            })
            .await
            .map_err(|err| unavailable(format!("tesseract task failed: {}", err)))??;

            let fragments = parse_tsv_words(&tsv);
            debug!("tesseract found {} words", fragments.len());
            let full_text = (!fragments.is_empty()).then(|| {
                fragments
                    .iter()
                    .map(|fragment| fragment.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            });
            Ok(OcrDetection {
                full_text,
                fragments,
            })
        })
    }
}

fn run_tesseract_tsv(path: &Path, languages: &str) -> Result<String, ServiceError> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(PAGE_SEGMENTATION_MODE.to_string())
        .arg("tsv")
        .output()
        .map_err(|err| unavailable(format!("failed to run tesseract (is it installed?): {}", err)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim().to_string();
        if message.contains("Error in pixRead") || message.contains("Unsupported image") {
            return Err(ServiceError::InvalidImage(message));
        }
        return Err(unavailable(format!("tesseract failed: {}", message)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn unavailable(message: String) -> ServiceError {
    ServiceError::Unavailable {
        service: ServiceKind::Ocr,
        message,
    }
}
