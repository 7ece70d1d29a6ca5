mod engine;
mod font;
mod geom;
mod layout;
mod merge;
mod render;

pub use engine::{OcrDetection, OcrFuture, OcrService, Tesseract};
pub use font::{FontHandle, FontMetrics, FontProvider, OverlayFonts, TextExtent, load_font_metrics};
pub use geom::BoundingBox;
pub use layout::{LayoutPlanner, OverlayStyle, Patch, RenderPlan, position_text};
pub use merge::{DEFAULT_MERGE_THRESHOLD, merge_phrases};
pub use render::{Compositor, PhraseErrorPolicy, RenderStats, blend_overlay, overlay_svg};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TextFragment {
    pub bbox: BoundingBox,
    pub text: String,
}

impl TextFragment {
    pub fn new(bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
        }
    }
}

/// A contiguous run of fragments treated as one translatable unit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MergedPhrase {
    pub bbox: BoundingBox,
    pub text: String,
    pub fragments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPhrase {
    pub bbox: BoundingBox,
    pub source: String,
    pub text: String,
}
