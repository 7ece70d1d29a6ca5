use anyhow::{Context, Result, anyhow};
use image::Rgb;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::{DEFAULT_MERGE_THRESHOLD, OverlayStyle, PhraseErrorPolicy};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngine {
    GoogleVision,
    Tesseract,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub merge_threshold: i32,
    pub overlay: OverlayStyle,
    pub font_paths: Vec<PathBuf>,
    pub font_families: Vec<String>,
    pub ocr_engine: OcrEngine,
    pub tesseract_languages: String,
    pub on_phrase_error: PhraseErrorPolicy,
    pub translate_concurrency: usize,
    pub jobs: Option<usize>,
    pub file_timeout: Duration,
    pub max_in_flight_requests: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            overlay: OverlayStyle::default(),
            font_paths: vec![PathBuf::from("./Montserrat-Bold.ttf")],
            font_families: vec!["Montserrat".to_string(), "sans-serif".to_string()],
            ocr_engine: OcrEngine::GoogleVision,
            tesseract_languages: "eng".to_string(),
            on_phrase_error: PhraseErrorPolicy::Fail,
            translate_concurrency: 4,
            jobs: None,
            file_timeout: Duration::from_secs(120),
            max_in_flight_requests: 8,
        }
    }
}

impl Settings {
    /// Worker count for the batch, defaulting to the CPU count capped at 4.
    pub fn resolved_jobs(&self) -> usize {
        self.jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| num_cpus::get().clamp(1, 4))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    merge: Option<MergeSettings>,
    overlay: Option<OverlaySettings>,
    fonts: Option<FontSettings>,
    ocr: Option<OcrSettings>,
    translate: Option<TranslateSettings>,
    batch: Option<BatchSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct MergeSettings {
    threshold: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    fill_color: Option<String>,
    text_color: Option<String>,
    corner_radius: Option<f32>,
    padding_left: Option<f32>,
    font_scale: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    paths: Option<Vec<String>>,
    families: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    engine: Option<String>,
    tesseract_languages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    on_phrase_error: Option<String>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchSettings {
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
    max_in_flight_requests: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults)?;
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings in {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(threshold) = incoming.merge.and_then(|merge| merge.threshold) {
            self.merge_threshold = threshold;
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(color) = overlay.fill_color.filter(|c| !c.trim().is_empty()) {
                self.overlay.fill_color = parse_hex_color(&color)?;
            }
            if let Some(color) = overlay.text_color.filter(|c| !c.trim().is_empty()) {
                self.overlay.text_color = parse_hex_color(&color)?;
            }
            if let Some(radius) = overlay.corner_radius.filter(|r| *r >= 0.0) {
                self.overlay.corner_radius = radius;
            }
            if let Some(padding) = overlay.padding_left {
                self.overlay.padding_left = padding;
            }
            if let Some(scale) = overlay.font_scale.filter(|s| *s > 0.0) {
                self.overlay.font_scale = scale;
            }
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(paths) = fonts.paths {
                self.font_paths = paths
                    .into_iter()
                    .filter(|path| !path.trim().is_empty())
                    .map(PathBuf::from)
                    .collect();
            }
            if let Some(families) = fonts.families {
                self.font_families = families
                    .into_iter()
                    .filter(|family| !family.trim().is_empty())
                    .collect();
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(engine) = ocr.engine {
                self.ocr_engine = parse_engine(&engine)?;
            }
            if let Some(languages) = ocr.tesseract_languages.filter(|l| !l.trim().is_empty()) {
                self.tesseract_languages = languages;
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(policy) = translate.on_phrase_error {
                self.on_phrase_error = parse_policy(&policy)?;
            }
            if let Some(concurrency) = translate.concurrency.filter(|c| *c > 0) {
                self.translate_concurrency = concurrency;
            }
        }
        if let Some(batch) = incoming.batch {
            if let Some(jobs) = batch.jobs {
                self.jobs = Some(jobs);
            }
            if let Some(secs) = batch.timeout_secs.filter(|s| *s > 0) {
                self.file_timeout = Duration::from_secs(secs);
            }
            if let Some(limit) = batch.max_in_flight_requests.filter(|l| *l > 0) {
                self.max_in_flight_requests = limit;
            }
        }
        Ok(())
    }
}

fn parse_hex_color(value: &str) -> Result<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid color '{}' (expected #rrggbb)", value));
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

fn parse_engine(value: &str) -> Result<OcrEngine> {
    match value.trim().to_lowercase().as_str() {
        "google-vision" | "vision" | "google" => Ok(OcrEngine::GoogleVision),
        "tesseract" => Ok(OcrEngine::Tesseract),
        other => Err(anyhow!(
            "unknown ocr engine '{}' (expected google-vision or tesseract)",
            other
        )),
    }
}

fn parse_policy(value: &str) -> Result<PhraseErrorPolicy> {
    match value.trim().to_lowercase().as_str() {
        "fail" => Ok(PhraseErrorPolicy::Fail),
        "skip" => Ok(PhraseErrorPolicy::Skip),
        other => Err(anyhow!(
            "unknown on_phrase_error '{}' (expected fail or skip)",
            other
        )),
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".image-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn defaults_match_reference_layout() {
        with_temp_home(|home| {
            let settings = load_settings(None).expect("load settings");
            assert_eq!(settings.merge_threshold, 10);
            assert_eq!(settings.overlay.fill_color, Rgb([169, 169, 169]));
            assert_eq!(settings.overlay.text_color, Rgb([0, 0, 0]));
            assert_eq!(settings.overlay.corner_radius, 10.0);
            assert_eq!(settings.overlay.padding_left, 2.0);
            assert_eq!(settings.ocr_engine, OcrEngine::GoogleVision);
            assert_eq!(settings.on_phrase_error, PhraseErrorPolicy::Fail);
            assert!(home.join(".image-translator-rust/settings.toml").exists());
        });
    }

    #[test]
    fn extra_file_overrides_defaults() {
        with_temp_home(|home| {
            let path = home.join("extra.toml");
            fs::write(
                &path,
                "[merge]\nthreshold = 4\n[overlay]\nfill_color = \"#ffffff\"\n[ocr]\nengine = \"tesseract\"\n[translate]\non_phrase_error = \"skip\"\n[batch]\njobs = 2\ntimeout_secs = 5\n",
            )
            .expect("write settings");
            let settings = load_settings(Some(&path)).expect("load settings");
            assert_eq!(settings.merge_threshold, 4);
            assert_eq!(settings.overlay.fill_color, Rgb([255, 255, 255]));
            assert_eq!(settings.ocr_engine, OcrEngine::Tesseract);
            assert_eq!(settings.on_phrase_error, PhraseErrorPolicy::Skip);
            assert_eq!(settings.resolved_jobs(), 2);
            assert_eq!(settings.file_timeout, Duration::from_secs(5));
        });
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("nope.toml"))).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("zzzzzz").is_err());
        assert_eq!(parse_hex_color("a9a9a9").unwrap(), Rgb([169, 169, 169]));
        assert!(parse_engine("paddle").is_err());
        assert!(parse_policy("retry").is_err());
    }
}
