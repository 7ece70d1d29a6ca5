use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info};

pub mod batch;
pub mod error;
pub mod languages;
pub mod logging;
pub mod ocr;
pub mod providers;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod translator;

pub use batch::{BatchOptions, BatchReport, FileFailure, FileReport, Pipeline, run_batch};
pub use error::{Error, RenderError, ServiceError};
pub use translator::Translator;

use ocr::{Compositor, LayoutPlanner, OcrService, OverlayFonts, Tesseract};
use providers::{GoogleClient, GoogleTranslate, GoogleVision};
use settings::OcrEngine;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub lang: String,
    pub merge_threshold: Option<i32>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub jobs: Option<usize>,
}

/// Validates the configuration, wires the collaborators from settings and
/// translates every image in the input directory.
pub async fn run(config: Config) -> Result<BatchReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(jobs) = config.jobs {
        settings.jobs = Some(jobs);
    }

    let threshold = config.merge_threshold.unwrap_or(settings.merge_threshold);
    if threshold < 0 {
        return Err(Error::InvalidArgument(format!(
            "merge threshold must be non-negative (got {})",
            threshold
        ))
        .into());
    }
    validate_lang_code(&config.lang)?;
    if !config.input_dir.is_dir() {
        return Err(Error::InputDirNotFound(config.input_dir.clone()).into());
    }

    let key = providers::resolve_key(config.key.as_deref())
        .with_context(|| "no API key found for Google Cloud")?;
    let limiter = Arc::new(Semaphore::new(settings.max_in_flight_requests));
    let client = GoogleClient::with_limiter(key, limiter)?;

    let ocr: Arc<dyn OcrService> = match settings.ocr_engine {
        OcrEngine::GoogleVision => Arc::new(GoogleVision::new(client.clone())),
        OcrEngine::Tesseract => Arc::new(Tesseract::new(settings.tesseract_languages.clone())),
    };
    let translator: Arc<dyn Translator> = Arc::new(GoogleTranslate::new(client));
    debug!("ocr engine: {:?}", settings.ocr_engine);

    let fonts = OverlayFonts::resolve(&settings.font_paths, &settings.font_families);
    let compositor = Compositor::new(LayoutPlanner::new(settings.overlay.clone()), Arc::new(fonts))
        .with_policy(settings.on_phrase_error)
        .with_concurrency(settings.translate_concurrency);

    let pipeline = Pipeline::new(ocr, translator, compositor, config.lang.as_str())
        .with_merge_threshold(threshold);
    let options = BatchOptions {
        jobs: settings.resolved_jobs(),
        file_timeout: settings.file_timeout,
    };

    let report = run_batch(
        Arc::new(pipeline),
        &config.input_dir,
        &config.output_dir,
        &options,
    )
    .await?;
    info!(
        "finished: {} of {} image(s) translated",
        report.succeeded.len(),
        report.total()
    );
    Ok(report)
}

fn validate_lang_code(lang: &str) -> Result<()> {
    if lang.trim().is_empty() {
        return Err(Error::InvalidArgument("target language is empty".to_string()).into());
    }
    if !languages::is_valid_lang_code(lang) {
        return Err(Error::InvalidArgument(format!(
            "invalid target language code '{}' (expected ISO 639-1/2/3 code, optionally with a region or script suffix)",
            lang
        ))
        .into());
    }
    Ok(())
}
