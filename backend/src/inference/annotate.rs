use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::inference::postprocess::Detection;

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const MASK_ALPHA: f32 = 0.5;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable font")]
    Invalid { path: String },
}

/// Renders detections onto a copy of the input frame.
pub struct Annotator {
    labels: Vec<String>,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(labels: Vec<String>, font: Option<FontVec>) -> Self {
        Self { labels, font }
    }

    pub fn load_font(path: &Path) -> Result<FontVec, FontError> {
        let data = std::fs::read(path).map_err(|source| FontError::Read {
            path: path.display().to_string(),
            source,
        })?;
        FontVec::try_from_vec(data).map_err(|_| FontError::Invalid {
            path: path.display().to_string(),
        })
    }

    pub fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class_id))
    }

    pub fn render(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();

        // Masks first so outlines and captions stay readable.
        for detection in detections {
            if let Some(mask) = &detection.mask {
                let color = color_for(detection.class_id);
                for ((row, col), &hit) in mask.bits.indexed_iter() {
                    let (x, y) = (mask.left + col as u32, mask.top + row as u32);
                    if hit && x < canvas.width() && y < canvas.height() {
                        blend(canvas.get_pixel_mut(x, y), color);
                    }
                }
            }
        }

        for detection in detections {
            self.draw_box(&mut canvas, detection);
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection) {
        let color = Rgb(color_for(detection.class_id));
        let [x_min, y_min, x_max, y_max] = detection.bbox;
        let (x, y) = (x_min.floor() as i32, y_min.floor() as i32);
        let width = (x_max - x_min).round() as i32;
        let height = (y_max - y_min).round() as i32;

        for inset in 0..BOX_THICKNESS {
            let (w, h) = (width - 2 * inset, height - 2 * inset);
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x + inset, y + inset).of_size(w as u32, h as u32),
                color,
            );
        }

        let Some(font) = &self.font else {
            return;
        };
        let caption = format!("{} {:.2}", self.label(detection.class_id), detection.score);
        let scale = PxScale::from(LABEL_FONT_SIZE);
        let (text_w, text_h) = text_size(scale, font, &caption);
        let label_h = text_h as i32 + 2 * LABEL_PADDING;
        // Above the box when there is room, otherwise inside it.
        let label_y = if y >= label_h { y - label_h } else { y };

        draw_filled_rect_mut(
            canvas,
            Rect::at(x, label_y).of_size(text_w + 2 * LABEL_PADDING as u32, label_h as u32),
            color,
        );
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            x + LABEL_PADDING,
            label_y + LABEL_PADDING,
            scale,
            font,
            &caption,
        );
    }
}

fn color_for(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

fn blend(pixel: &mut Rgb<u8>, color: [u8; 3]) {
    for (channel, tint) in pixel.0.iter_mut().zip(color) {
        *channel = (*channel as f32 * (1.0 - MASK_ALPHA) + tint as f32 * MASK_ALPHA).round() as u8;
    }
}
