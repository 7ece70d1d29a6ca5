use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use crate::error::FontUnavailable;

/// Parsed metrics of one font face, shared between measurement and rendering.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, size: f32) -> f32 {
        size / self.units_per_em.max(1) as f32
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics, FontUnavailable> {
    let data = std::fs::read(path).map_err(|err| FontUnavailable {
        source_name: path.display().to_string(),
        reason: err.to_string(),
    })?;
    load_font_metrics_from_data(data, None).map_err(|reason| FontUnavailable {
        source_name: path.display().to_string(),
        reason,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
    /// Distance from the top of the extent to the baseline.
    pub ascent: f32,
}

/// A font at one pixel size.
#[derive(Debug, Clone)]
pub struct FontHandle {
    size: f32,
    metrics: Option<FontMetrics>,
}

impl FontHandle {
    pub fn new(size: f32, metrics: FontMetrics) -> Self {
        Self {
            size,
            metrics: Some(metrics),
        }
    }

    /// Built-in estimated metrics, used when no font face could be loaded.
    pub fn fallback(size: f32) -> Self {
        Self {
            size,
            metrics: None,
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn family(&self) -> Option<&str> {
        self.metrics.as_ref().and_then(|metrics| metrics.family())
    }

    pub fn is_fallback(&self) -> bool {
        self.metrics.is_none()
    }

    /// Width and height are the ink box of the rendered glyphs, so centring
    /// ignores side bearings and empty ascender space. `ascent` is the line
    /// ascender, the offset from the drawing origin to the baseline. Text
    /// without ink (spaces only) falls back to the advance width and line box.
    pub fn measure(&self, text: &str) -> TextExtent {
        let Some(metrics) = &self.metrics else {
            return TextExtent {
                width: measure_text_width_px(text, self.size, None),
                height: self.size,
                ascent: self.size * 0.8,
            };
        };
        let scale = metrics.scale(self.size);
        let ascent = metrics.ascender as f32 * scale;
        match measure_ink_px(text, self.size, metrics) {
            Some((width, height)) => TextExtent {
                width,
                height,
                ascent,
            },
            None => TextExtent {
                width: measure_text_width_px(text, self.size, Some(metrics)),
                height: ascent - metrics.descender as f32 * scale,
                ascent,
            },
        }
    }
}

pub trait FontProvider: Send + Sync {
    /// Never fails: providers degrade to [`FontHandle::fallback`].
    fn font(&self, size: f32) -> FontHandle;

    /// Font database handed to the rasterizer.
    fn database(&self) -> Arc<fontdb::Database>;
}

/// Resolves the overlay font once: configured files first, then system
/// families, then built-in metrics.
pub struct OverlayFonts {
    metrics: Option<FontMetrics>,
    db: Arc<fontdb::Database>,
}

impl OverlayFonts {
    pub fn resolve(paths: &[PathBuf], families: &[String]) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let mut metrics = None;
        for path in paths {
            match load_font_metrics(path) {
                Ok(found) => {
                    db.load_font_data(found.data().to_vec());
                    metrics = Some(found);
                    break;
                }
                Err(err) => debug!("{}", err),
            }
        }
        if metrics.is_none() {
            for family in families {
                match load_font_metrics_from_family(&db, family) {
                    Ok(found) => {
                        metrics = Some(found);
                        break;
                    }
                    Err(err) => debug!("{}", err),
                }
            }
        }
        match metrics.as_ref().and_then(|m| m.family()) {
            Some(family) => debug!("overlay font: {}", family),
            None => debug!("overlay font: built-in metrics"),
        }

        Self {
            metrics,
            db: Arc::new(db),
        }
    }

    pub fn builtin() -> Self {
        Self {
            metrics: None,
            db: Arc::new(fontdb::Database::new()),
        }
    }
}

impl FontProvider for OverlayFonts {
    fn font(&self, size: f32) -> FontHandle {
        match &self.metrics {
            Some(metrics) => FontHandle::new(size, metrics.clone()),
            None => FontHandle::fallback(size),
        }
    }

    fn database(&self) -> Arc<fontdb::Database> {
        self.db.clone()
    }
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Ok(face) = Face::parse(&font.data, font.face_index)
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(font.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(font.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        return advance as f32 * font.scale(font_size);
    }
    estimate_text_width_units(text) * font_size
}

/// Ink box `(width, height)` of `text` laid out on one line, in pixels.
fn measure_ink_px(text: &str, font_size: f32, font: &FontMetrics) -> Option<(f32, f32)> {
    let face = Face::parse(&font.data, font.face_index).ok()?;
    let mut pen = 0i32;
    let mut ink: Option<(i32, i32, i32, i32)> = None;
    for ch in text.chars().filter(|ch| *ch != '\n') {
        let glyph = face.glyph_index(ch);
        if let Some(rect) = glyph.and_then(|glyph| face.glyph_bounding_box(glyph)) {
            let (x_min, x_max) = (pen + rect.x_min as i32, pen + rect.x_max as i32);
            let (y_min, y_max) = (rect.y_min as i32, rect.y_max as i32);
            ink = Some(match ink {
                Some((left, bottom, right, top)) => (
                    left.min(x_min),
                    bottom.min(y_min),
                    right.max(x_max),
                    top.max(y_max),
                ),
                None => (x_min, y_min, x_max, y_max),
            });
        }
        let advance = glyph
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .unwrap_or(font.space_advance);
        pen = pen.saturating_add(advance as i32);
    }
    let (left, bottom, right, top) = ink?;
    let scale = font.scale(font_size);
    Some(((right - left) as f32 * scale, (top - bottom) as f32 * scale))
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn load_font_metrics_from_data(
    data: Vec<u8>,
    preferred_family: Option<&str>,
) -> Result<FontMetrics, String> {
    let data = Arc::new(data);
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(&data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: data.clone(),
            units_per_em,
            space_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| "failed to parse font data".to_string())
}

fn load_font_metrics_from_family(
    db: &fontdb::Database,
    family: &str,
) -> Result<FontMetrics, FontUnavailable> {
    let unavailable = |reason: &str| FontUnavailable {
        source_name: family.to_string(),
        reason: reason.to_string(),
    };
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db.query(&query).ok_or_else(|| unavailable("not installed"))?;
    let data = db
        .with_face_data(id, |data, _| data.to_vec())
        .ok_or_else(|| unavailable("failed to load face data"))?;
    let preferred = (!family.eq_ignore_ascii_case("sans-serif")).then_some(family);
    load_font_metrics_from_data(data, preferred).map_err(|reason| unavailable(&reason))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
