//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every grid cell of every stride (8, 16, 32) predicts
//! one candidate face. The network emits twelve tensors, four per stride, in
//! this order:
//!
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32`
//!
//! with shapes `[1, H*W, 1]` for cls/obj, `[1, H*W, 4]` for bbox and
//! `[1, H*W, 10]` for the five landmarks. Decoding for cell `(row, col)`:
//!
//! ```text
//! score = sqrt(clamp(cls) * clamp(obj))
//! cx    = (col + dx) * stride        w = exp(dw) * stride
//! cy    = (row + dy) * stride        h = exp(dh) * stride
//! lm_x  = (col + lx) * stride        lm_y = (row + ly) * stride
//! ```

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// One candidate face, coordinates normalized to the square network input.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// The four prediction maps of a single stride, one row per grid cell.
#[derive(Debug, Clone)]
pub struct ScaleOutput {
    pub stride: usize,
    pub cls: Array2<f32>,
    pub obj: Array2<f32>,
    pub bbox: Array2<f32>,
    pub kps: Array2<f32>,
}

impl ScaleOutput {
    fn cells(&self) -> usize {
        self.cls.nrows()
    }

    fn score(&self, idx: usize) -> f32 {
        let cls = self.cls[[idx, 0]].clamp(0.0, 1.0);
        let obj = self.obj[[idx, 0]].clamp(0.0, 1.0);
        (cls * obj).sqrt()
    }
}

fn tensor(
    outputs: &[(&[i64], &[f32])],
    index: usize,
    rows: usize,
    cols: usize,
    name: &str,
) -> Result<Array2<f32>> {
    let (shape, data) = outputs
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("missing {} output at index {}", name, index))?;

    let expected = [1, rows as i64, cols as i64];
    if **shape != expected[..] {
        anyhow::bail!(
            "unexpected {} shape at index {}: {:?}, expected {:?}",
            name,
            index,
            shape,
            expected
        );
    }

    Ok(Array2::from_shape_vec((rows, cols), data.to_vec())?)
}

/// Split the twelve raw output tensors into per-stride maps.
pub fn parse_outputs(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
) -> Result<Vec<ScaleOutput>> {
    if outputs.len() < 12 {
        anyhow::bail!("yunet produced {} outputs, expected 12", outputs.len());
    }

    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let side = input_size / stride;
            let cells = side * side;
            Ok(ScaleOutput {
                stride,
                cls: tensor(outputs, i, cells, 1, "cls")?,
                obj: tensor(outputs, i + 3, cells, 1, "obj")?,
                bbox: tensor(outputs, i + 6, cells, 4, "bbox")?,
                kps: tensor(outputs, i + 9, cells, 10, "kps")?,
            })
        })
        .collect()
}

/// Turn per-stride maps into candidate faces scoring at least `score_threshold`.
pub fn decode(
    scales: &[ScaleOutput],
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    let size = input_size as f32;
    let mut detections = Vec::new();

    for scale in scales {
        let side = input_size / scale.stride;
        if scale.cells() != side * side {
            anyhow::bail!(
                "stride {} expects a {}x{} grid, got {} cells",
                scale.stride,
                side,
                side,
                scale.cells()
            );
        }
        let stride = scale.stride as f32;

        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = scale.score(idx);
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + scale.bbox[[idx, 0]]) * stride;
                let cy = (row as f32 + scale.bbox[[idx, 1]]) * stride;
                let w = scale.bbox[[idx, 2]].exp() * stride;
                let h = scale.bbox[[idx, 3]].exp() * stride;

                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (col as f32 + scale.kps[[idx, k * 2]]) * stride / size;
                    landmarks[k * 2 + 1] =
                        (row as f32 + scale.kps[[idx, k * 2 + 1]]) * stride / size;
                }

                detections.push(RawDetection {
                    bbox: [(cx - w / 2.0) / size, (cy - h / 2.0) / size, w / size, h / size],
                    score,
                    landmarks,
                });
            }
        }
    }

    Ok(detections)
}
