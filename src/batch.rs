use std::any::Any;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ocr::{Compositor, DEFAULT_MERGE_THRESHOLD, OcrService, RenderStats, merge_phrases};
use crate::translator::Translator;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const OUTPUT_SUFFIX: &str = "_translated";

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Supported image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `dir/name.ext` -> `output_dir/name_translated.ext`, keeping the extension as written.
pub fn output_path_for(input: &Path, output_dir: &Path) -> Option<PathBuf> {
    let stem = input.file_stem()?.to_str()?;
    let name = match input.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext),
        None => format!("{}{}", stem, OUTPUT_SUFFIX),
    };
    Some(output_dir.join(name))
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub fragments: usize,
    pub phrases: usize,
    pub stats: RenderStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub input: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub jobs: usize,
    pub file_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            file_timeout: Duration::from_secs(120),
        }
    }
}

/// One image's OCR -> merge -> translate -> draw pipeline.
#[derive(Clone)]
pub struct Pipeline {
    ocr: Arc<dyn OcrService>,
    translator: Arc<dyn Translator>,
    compositor: Compositor,
    target_lang: String,
    merge_threshold: i32,
}

impl Pipeline {
    pub fn new(
        ocr: Arc<dyn OcrService>,
        translator: Arc<dyn Translator>,
        compositor: Compositor,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            ocr,
            translator,
            compositor,
            target_lang: target_lang.into(),
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
        }
    }

    pub fn with_merge_threshold(mut self, threshold: i32) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Produces the encoded output image without touching the output directory.
    pub async fn translate_file(&self, input: &Path, output: &Path) -> Result<(Vec<u8>, FileReport)> {
        let format = ImageFormat::from_path(output)?;
        let bytes = tokio::fs::read(input).await?;
        let detection = self.ocr.detect(&bytes).await?;
        let phrases = merge_phrases(&detection.fragments, self.merge_threshold)?;

        let mut stats = RenderStats::default();
        let translated = self
            .compositor
            .translate_phrases(&phrases, self.translator.as_ref(), &self.target_lang, &mut stats)
            .await?;

        let compositor = self.compositor.clone();
        let (encoded, stats) = tokio::task::spawn_blocking(move || -> Result<_> {
            let image = image::load_from_memory(&bytes)?.to_rgb8();
            let image = compositor.compose(image, &translated, &mut stats)?;
            let mut encoded = Vec::new();
            DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut encoded), format)?;
            Ok((encoded, stats))
        })
        .await
        .map_err(|err| Error::Task(err.to_string()))??;

        Ok((
            encoded,
            FileReport {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
                fragments: detection.fragments.len(),
                phrases: phrases.len(),
                stats,
            },
        ))
    }

    /// Translates `input` and writes `output`. The write happens outside the
    /// timeout so a timed-out file leaves nothing behind.
    pub async fn process_file(
        &self,
        input: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<FileReport> {
        let (encoded, report) = tokio::time::timeout(timeout, self.translate_file(input, output))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        tokio::fs::write(output, encoded).await?;
        Ok(report)
    }
}

/// Runs every supported image in `input_dir` through `pipeline`. Per-file
/// failures are collected in the report and do not stop the batch.
pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    input_dir: &Path,
    output_dir: &Path,
    options: &BatchOptions,
) -> Result<BatchReport> {
    if !input_dir.is_dir() {
        return Err(Error::InputDirNotFound(input_dir.to_path_buf()));
    }
    tokio::fs::create_dir_all(output_dir).await?;
    let files = list_images(input_dir)?;
    info!(
        "translating {} image(s) from {} with {} worker(s)",
        files.len(),
        input_dir.display(),
        options.jobs.max(1)
    );

    let workers = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut tasks = JoinSet::new();
    let mut report = BatchReport::default();
    let mut pending = BTreeSet::new();
    let mut lost_worker = None;
    for input in files {
        let Some(output) = output_path_for(&input, output_dir) else {
            report.failed.push(FileFailure {
                error: "file name is not valid UTF-8".to_string(),
                input,
            });
            continue;
        };
        pending.insert(input.clone());
        let pipeline = pipeline.clone();
        let workers = workers.clone();
        let timeout = options.file_timeout;
        tasks.spawn(async move {
            let result = match workers.acquire_owned().await {
                Ok(_permit) => {
                    AssertUnwindSafe(pipeline.process_file(&input, &output, timeout))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(Error::Task(panic_message(panic.as_ref()))))
                }
                Err(err) => Err(Error::Task(err.to_string())),
            };
            (input, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (input, result) = match joined {
            Ok(done) => done,
            Err(err) => {
                warn!("worker task failed: {}", err);
                lost_worker = Some(err.to_string());
                continue;
            }
        };
        pending.remove(&input);
        match result {
            Ok(file) => {
                info!(
                    "{} -> {} ({} phrase(s), {} drawn)",
                    file.input.display(),
                    file.output.display(),
                    file.phrases,
                    file.stats.drawn
                );
                report.succeeded.push(file);
            }
            Err(err) => {
                warn!("{}: {}", input.display(), err);
                report.failed.push(FileFailure {
                    input,
                    error: err.to_string(),
                });
            }
        }
    }
    // Only a cancelled worker can leave files unaccounted for.
    if let Some(error) = lost_worker {
        report.failed.extend(pending.into_iter().map(|input| FileFailure {
            input,
            error: format!("worker task failed: {}", error),
        }));
    }
    report.succeeded.sort_by(|a, b| a.input.cmp(&b.input));
    report.failed.sort_by(|a, b| a.input.cmp(&b.input));
    Ok(report)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {}", detail)
}
