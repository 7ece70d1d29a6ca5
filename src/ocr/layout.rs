use image::Rgb;
use tracing::debug;

use crate::error::RenderError;

use super::font::{FontHandle, FontProvider, TextExtent};
use super::geom::BoundingBox;

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub fill_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub corner_radius: f32,
    pub padding_left: f32,
    /// Font size as a fraction of the box height.
    pub font_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill_color: Rgb([169, 169, 169]),
            text_color: Rgb([0, 0, 0]),
            corner_radius: 10.0,
            padding_left: 2.0,
            font_scale: 0.6,
        }
    }
}

/// Opaque rounded rectangle painted over the original text.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub bbox: BoundingBox,
    pub radius: f32,
    pub fill: Rgb<u8>,
}

#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub text: String,
    /// Top-left of the measured text extent.
    pub x: f32,
    pub y: f32,
    pub baseline_y: f32,
    pub extent: TextExtent,
    pub font: FontHandle,
    pub patch: Patch,
    pub text_color: Rgb<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutPlanner {
    style: OverlayStyle,
}

impl LayoutPlanner {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn font_size_for(&self, bbox: &BoundingBox) -> f32 {
        (bbox.height() as f32 * self.style.font_scale).floor().max(1.0)
    }

    pub fn plan(
        &self,
        bbox: BoundingBox,
        text: &str,
        fonts: &dyn FontProvider,
    ) -> Result<RenderPlan, RenderError> {
        if bbox.is_degenerate() {
            return Err(RenderError::DegenerateBox(bbox));
        }
        let font = fonts.font(self.font_size_for(&bbox));
        let extent = font.measure(text);
        let (x, y) = position_text(&bbox, &extent, self.style.padding_left);
        debug!(
            "plan {:?}: size={} extent={:.1}x{:.1} at ({:.1}, {:.1})",
            bbox,
            font.size(),
            extent.width,
            extent.height,
            x,
            y
        );
        Ok(RenderPlan {
            text: text.to_string(),
            x,
            y,
            baseline_y: y + extent.ascent,
            extent,
            font,
            patch: Patch {
                bbox,
                radius: self.style.corner_radius,
                fill: self.style.fill_color,
            },
            text_color: self.style.text_color,
        })
    }
}

/// Centers `extent` inside `bbox`, shifted right by `padding_left`.
/// The result is not rounded.
pub fn position_text(bbox: &BoundingBox, extent: &TextExtent, padding_left: f32) -> (f32, f32) {
    let x = bbox.left() as f32 + (bbox.width() as f32 - extent.width) / 2.0 + padding_left;
    let y = bbox.top() as f32 + (bbox.height() as f32 - extent.height) / 2.0;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OverlayFonts;

    #[test]
    fn text_is_centered_with_left_padding() {
        let extent = TextExtent {
            width: 40.0,
            height: 20.0,
            ascent: 16.0,
        };
        let (x, y) = position_text(&BoundingBox::new(0, 0, 100, 50), &extent, 2.0);
        assert_eq!((x, y), (32.0, 15.0));
    }

    #[test]
    fn offset_boxes_keep_fractional_positions() {
        let extent = TextExtent {
            width: 41.0,
            height: 21.0,
            ascent: 17.0,
        };
        let (x, y) = position_text(&BoundingBox::new(10, 20, 110, 70), &extent, 2.0);
        assert_eq!((x, y), (41.5, 34.5));
    }

    #[test]
    fn plan_uses_sixty_percent_of_box_height() {
        let planner = LayoutPlanner::default();
        let fonts = OverlayFonts::builtin();
        let plan = planner
            .plan(BoundingBox::new(0, 0, 100, 50), "ABCD", &fonts)
            .unwrap();

        assert_eq!(plan.font.size(), 30.0);
        // Built-in metrics: 0.55em per alphanumeric glyph, 1em tall.
        assert!((plan.extent.width - 66.0).abs() < 1e-3);
        assert!((plan.x - 19.0).abs() < 1e-3);
        assert!((plan.y - 10.0).abs() < 1e-3);
        assert!((plan.baseline_y - 34.0).abs() < 1e-3);
        assert_eq!(plan.patch.bbox, BoundingBox::new(0, 0, 100, 50));
        assert_eq!(plan.patch.radius, 10.0);
        assert_eq!(plan.patch.fill, Rgb([169, 169, 169]));
        assert_eq!(plan.text_color, Rgb([0, 0, 0]));
    }

    #[test]
    fn font_size_is_floored() {
        let planner = LayoutPlanner::default();
        assert_eq!(planner.font_size_for(&BoundingBox::new(0, 0, 10, 17)), 10.0);
        assert_eq!(planner.font_size_for(&BoundingBox::new(0, 0, 10, 1)), 1.0);
    }

    #[test]
    fn degenerate_box_is_reported() {
        let planner = LayoutPlanner::default();
        let fonts = OverlayFonts::builtin();
        let err = planner
            .plan(BoundingBox::new(5, 5, 5, 40), "text", &fonts)
            .unwrap_err();
        assert!(matches!(err, RenderError::DegenerateBox(_)));
    }
}
