//! Decoding of raw YOLO segmentation output into detections with masks.
//!
//! Layout of the prediction matrix is `[4 + classes + mask_coeffs, anchors]`:
//! rows 0..4 are `cx, cy, w, h` in input pixels, followed by per-class scores
//! (already sigmoid-activated by the exported graph) and the mask coefficients.

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub input_width: u32,
    pub input_height: u32,
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub mask_threshold: f32,
}

/// Model output copied off the device.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub predictions: Array2<f32>,
    pub prototypes: Option<Array3<f32>>,
}

/// Binary mask covering the pixels of a detection's box.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub left: u32,
    pub top: u32,
    pub bits: Array2<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub score: f32,
    /// `[x_min, y_min, x_max, y_max]` in input pixels.
    pub bbox: [f32; 4],
    pub mask: Option<Mask>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    anchor: usize,
    class_id: usize,
    score: f32,
    bbox: [f32; 4],
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("prediction matrix has {rows} rows, expected at least {expected}")]
    TooFewRows { rows: usize, expected: usize },
    #[error("prototype grid is empty ({height}x{width})")]
    EmptyPrototypes { height: usize, width: usize },
}

pub fn decode(raw: &RawOutput, params: &DecodeParams) -> Result<Vec<Detection>, DecodeError> {
    let rows = raw.predictions.nrows();
    let num_coeffs = raw.prototypes.as_ref().map_or(0, |p| p.shape()[0]);
    if rows < 5 + num_coeffs {
        return Err(DecodeError::TooFewRows {
            rows,
            expected: 5 + num_coeffs,
        });
    }
    if let Some(protos) = raw.prototypes.as_ref() {
        let (_, height, width) = protos.dim();
        if height == 0 || width == 0 {
            return Err(DecodeError::EmptyPrototypes { height, width });
        }
    }
    let num_classes = rows - 4 - num_coeffs;

    let candidates = collect_candidates(raw.predictions.view(), num_classes, params);
    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
    log::debug!("{} detections kept after NMS", kept.len());

    let detections = kept
        .into_iter()
        .map(|candidate| {
            let mask = raw.prototypes.as_ref().map(|protos| {
                let coeffs = raw
                    .predictions
                    .slice(s![4 + num_classes.., candidate.anchor]);
                assemble_mask(coeffs, protos, &candidate.bbox, params)
            });
            Detection {
                class_id: candidate.class_id,
                score: candidate.score,
                bbox: candidate.bbox,
                mask,
            }
        })
        .collect();
    Ok(detections)
}

fn collect_candidates(
    predictions: ArrayView2<f32>,
    num_classes: usize,
    params: &DecodeParams,
) -> Vec<Candidate> {
    let (w, h) = (params.input_width as f32, params.input_height as f32);

    predictions
        .axis_iter(Axis(1))
        .enumerate()
        .filter_map(|(anchor, column)| {
            let (class_id, score) = column
                .slice(s![4..4 + num_classes])
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;
            if score.is_nan() || score < params.confidence {
                return None;
            }

            let (cx, cy, bw, bh) = (column[0], column[1], column[2], column[3]);
            let bbox = [
                (cx - bw / 2.0).clamp(0.0, w),
                (cy - bh / 2.0).clamp(0.0, h),
                (cx + bw / 2.0).clamp(0.0, w),
                (cy + bh / 2.0).clamp(0.0, h),
            ];
            Some(Candidate {
                anchor,
                class_id,
                score,
                bbox,
            })
        })
        .collect()
}

/// Class-aware greedy NMS, highest score first.
fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// `sigmoid(coeffs . protos)`, bilinearly sampled at every input pixel inside the box.
fn assemble_mask(
    coeffs: ArrayView1<f32>,
    protos: &Array3<f32>,
    bbox: &[f32; 4],
    params: &DecodeParams,
) -> Mask {
    let (_, ph, pw) = protos.dim();
    let mut logits = Array2::<f32>::zeros((ph, pw));
    for (proto, &c) in protos.outer_iter().zip(coeffs.iter()) {
        logits.scaled_add(c, &proto);
    }
    let probs = logits.mapv_into(|v| 1.0 / (1.0 + (-v).exp()));

    let left = bbox[0].floor().max(0.0) as u32;
    let top = bbox[1].floor().max(0.0) as u32;
    let right = (bbox[2].ceil() as u32).min(params.input_width);
    let bottom = (bbox[3].ceil() as u32).min(params.input_height);
    let width = right.saturating_sub(left) as usize;
    let height = bottom.saturating_sub(top) as usize;

    let sx = pw as f32 / params.input_width as f32;
    let sy = ph as f32 / params.input_height as f32;

    let bits = Array2::from_shape_fn((height, width), |(row, col)| {
        let x = left as f32 + col as f32 + 0.5;
        let y = top as f32 + row as f32 + 0.5;
        let inside = x >= bbox[0] && x <= bbox[2] && y >= bbox[1] && y <= bbox[3];
        inside && sample_bilinear(&probs, x * sx - 0.5, y * sy - 0.5) > params.mask_threshold
    });

    Mask { left, top, bits }
}

fn sample_bilinear(grid: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = grid.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let top = grid[[y0, x0]] * (1.0 - fx) + grid[[y0, x1]] * fx;
    let bottom = grid[[y1, x0]] * (1.0 - fx) + grid[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
