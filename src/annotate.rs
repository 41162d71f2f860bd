use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::bbox::{BBox, Ltrb};
use crate::config::AnnotateConfig;
use crate::error::Error;
use crate::plate::Plate;
use crate::violation::Violation;

const CLEAR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_OFFSET: f32 = 10.0;

/// Everything drawn for one track.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub track_id: u32,
    pub bbox: BBox<Ltrb>,
    pub plate: Plate,
    pub speed: f64,
    pub unit: String,
    pub violation: Violation,
}

impl Overlay {
    /// `ID:3 Plate:MH12AB1234 Speed:84.1 km/h`
    pub fn label(&self) -> String {
        format!(
            "ID:{} Plate:{} Speed:{:.1} {}",
            self.track_id, self.plate, self.speed, self.unit
        )
    }
}

pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(config: &AnnotateConfig) -> Result<Self, Error> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                let font = FontArc::try_from_vec(bytes).map_err(|e| {
                    Error::Config(format!("invalid font {}: {}", path.display(), e))
                })?;
                Some(font)
            }
            None => None,
        };

        Ok(Self::with_font(font, config.font_scale))
    }

    pub fn with_font(font: Option<FontArc>, scale: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(scale),
        }
    }

    /// Copy of `frame` with boxes and, when a font is loaded, labels drawn on it.
    pub fn annotate(&self, frame: &RgbImage, overlays: &[Overlay]) -> RgbImage {
        let mut canvas = frame.clone();

        for overlay in overlays {
            let color = if overlay.violation.is_violation() {
                VIOLATION_COLOR
            } else {
                CLEAR_COLOR
            };

            draw_box(&mut canvas, &overlay.bbox, color);

            if let Some(font) = &self.font {
                let x = overlay.bbox.left().max(0.0) as i32;
                let y = (overlay.bbox.top() - LABEL_OFFSET - self.scale.y).max(0.0) as i32;
                draw_text_mut(&mut canvas, color, x, y, self.scale, font, &overlay.label());
            }
        }

        canvas
    }
}

fn draw_box(canvas: &mut RgbImage, bbox: &BBox<Ltrb>, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let width = bbox.width() as i32 - 2 * inset;
        let height = bbox.height() as i32 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }

        let rect = Rect::at(bbox.left() as i32 + inset, bbox.top() as i32 + inset)
            .of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
