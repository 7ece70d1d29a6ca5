use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use quick_xml::escape::escape;
use image::{Rgb, RgbImage};
use resvg::render;
use tiny_skia::Pixmap;
use tracing::warn;
use usvg::{Options, Tree, fontdb};

use crate::error::{Error, RenderError, Result};
use crate::translator::{TranslateFuture, Translator, decode_entities};

use super::font::FontProvider;
use super::layout::{LayoutPlanner, RenderPlan};
use super::{MergedPhrase, TranslatedPhrase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhraseErrorPolicy {
    /// A failed translation fails the whole image.
    #[default]
    Fail,
    /// A failed translation leaves that phrase's pixels untouched.
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RenderStats {
    pub phrases: usize,
    pub drawn: usize,
    pub skipped_geometry: usize,
    pub skipped_translation: usize,
}

#[derive(Clone)]
pub struct Compositor {
    planner: LayoutPlanner,
    fonts: Arc<dyn FontProvider>,
    policy: PhraseErrorPolicy,
    concurrency: usize,
}

impl Compositor {
    pub fn new(planner: LayoutPlanner, fonts: Arc<dyn FontProvider>) -> Self {
        Self {
            planner,
            fonts,
            policy: PhraseErrorPolicy::default(),
            concurrency: 1,
        }
    }

    pub fn with_policy(mut self, policy: PhraseErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of translation requests kept in flight per image.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn render(
        &self,
        image: RgbImage,
        phrases: &[MergedPhrase],
        translator: &dyn Translator,
        target_lang: &str,
    ) -> Result<(RgbImage, RenderStats)> {
        let mut stats = RenderStats::default();
        let translated = self
            .translate_phrases(phrases, translator, target_lang, &mut stats)
            .await?;
        let image = self.compose(image, &translated, &mut stats)?;
        Ok((image, stats))
    }

    /// Translates every phrase, yielding results in phrase order even when
    /// requests overlap.
    pub async fn translate_phrases(
        &self,
        phrases: &[MergedPhrase],
        translator: &dyn Translator,
        target_lang: &str,
        stats: &mut RenderStats,
    ) -> Result<Vec<TranslatedPhrase>> {
        stats.phrases += phrases.len();
        let requests: Vec<TranslateFuture<'_>> = phrases
            .iter()
            .map(|phrase| translator.translate(&phrase.text, target_lang))
            .collect();
        let mut results = stream::iter(requests).buffered(self.concurrency);

        let mut translated = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            let Some(result) = results.next().await else {
                break;
            };
            match result {
                Ok(text) => translated.push(TranslatedPhrase {
                    bbox: phrase.bbox,
                    source: phrase.text.clone(),
                    text: decode_entities(&text),
                }),
                Err(err) if self.policy == PhraseErrorPolicy::Skip => {
                    warn!("keeping original text for '{}': {}", phrase.text, err);
                    stats.skipped_translation += 1;
                }
                Err(err) => return Err(Error::Service(err)),
            }
        }
        Ok(translated)
    }

    /// Paints a patch and then the text for each phrase, in order.
    pub fn compose(
        &self,
        mut image: RgbImage,
        phrases: &[TranslatedPhrase],
        stats: &mut RenderStats,
    ) -> std::result::Result<RgbImage, RenderError> {
        let mut plans = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            match self.planner.plan(phrase.bbox, &phrase.text, self.fonts.as_ref()) {
                Ok(plan) => plans.push(plan),
                Err(RenderError::DegenerateBox(bbox)) => {
                    warn!("skipping '{}': box {:?} has no area", phrase.source, bbox);
                    stats.skipped_geometry += 1;
                }
                Err(err) => return Err(err),
            }
        }
        if plans.is_empty() {
            return Ok(image);
        }

        let (width, height) = image.dimensions();
        let svg = overlay_svg(width, height, &plans);
        let overlay = rasterize_overlay(&svg, width, height, self.fonts.database())?;
        blend_overlay(&mut image, overlay.data());
        stats.drawn += plans.len();
        Ok(image)
    }
}

/// Builds a transparent SVG layer holding every patch and text run.
pub fn overlay_svg(width: u32, height: u32, plans: &[RenderPlan]) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    for plan in plans {
        let bbox = plan.patch.bbox;
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}" fill="{fill}"/>"#,
            x = bbox.left(),
            y = bbox.top(),
            w = bbox.width(),
            h = bbox.height(),
            r = plan.patch.radius,
            fill = svg_color(plan.patch.fill)
        ));
        let family = plan
            .font
            .family()
            .map(|family| format!(r#" font-family="{}""#, escape(family)))
            .unwrap_or_default();
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}"{family} xml:space="preserve">{text}</text>"#,
            x = plan.x,
            y = plan.baseline_y,
            size = plan.font.size(),
            color = svg_color(plan.text_color),
            family = family,
            text = escape(plan.text.as_str())
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn rasterize_overlay(
    svg: &str,
    width: u32,
    height: u32,
    db: Arc<fontdb::Database>,
) -> std::result::Result<Pixmap, RenderError> {
    let options = Options {
        fontdb: db,
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).map_err(|err| RenderError::Svg(err.to_string()))?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Raster(format!("invalid canvas {}x{}", width, height)))?;
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Source-over composite of a premultiplied RGBA8 layer onto an RGB raster
/// of the same size.
pub fn blend_overlay(image: &mut RgbImage, overlay: &[u8]) {
    for (pixel, src) in image.pixels_mut().zip(overlay.chunks_exact(4)) {
        let alpha = src[3] as u32;
        if alpha == 0 {
            continue;
        }
        let inverse = 255 - alpha;
        for channel in 0..3 {
            let blended = src[channel] as u32 + (pixel.0[channel] as u32 * inverse + 127) / 255;
            pixel.0[channel] = blended.min(255) as u8;
        }
    }
}

fn svg_color(color: Rgb<u8>) -> String {
    let Rgb([r, g, b]) = color;
    format!("rgb({},{},{})", r, g, b)
}
