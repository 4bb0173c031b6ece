use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// Square input side of the YuNet detector.
pub const DETECTOR_INPUT: u32 = 640;
/// Square input side of the SFace recognizer.
pub const RECOGNIZER_INPUT: u32 = 112;

/// Detection result from YuNet
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

impl Detection {
    /// Box as integer `(left, top, right, bottom)`, each multiplied by `factor`.
    pub fn scaled_corners(&self, factor: u32) -> (i32, i32, i32, i32) {
        let f = factor as f32;
        let [x, y, w, h] = self.bbox;
        (
            (x * f).round() as i32,
            (y * f).round() as i32,
            ((x + w) * f).round() as i32,
            ((y + h) * f).round() as i32,
        )
    }
}

/// Face embedding (SFace output)
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

/// Planar BGR float tensor `[1, 3, H, W]` with values in `[0, 255]`.
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    let (b, rest) = data.split_at_mut(plane);
    let (g, r) = rest.split_at_mut(plane);

    for (i, px) in img.pixels().enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (orig_width, orig_height) = img.dimensions();
    if orig_width == 0 || orig_height == 0 {
        anyhow::bail!("empty image");
    }

    // Letterbox into the square detector input to avoid distortion
    let target = DETECTOR_INPUT;
    let scale = target as f32 / orig_width.max(orig_height) as f32;
    let new_width = ((orig_width as f32 * scale) as u32).max(1);
    let new_height = ((orig_height as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);

    let mut canvas = DynamicImage::new_rgb8(target, target);
    let offset_x = ((target - new_width) / 2) as f32;
    let offset_y = ((target - new_height) / 2) as f32;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    let input = Value::from_array(bgr_tensor(&canvas.to_rgb8())?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        owned.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = owned
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let scales = yunet::parse_outputs(&refs, target as usize)?;
    let raw = yunet::decode(&scales, score_threshold, target as usize)?;
    log::debug!("yunet: {} raw candidates", raw.len());

    // Normalized canvas coordinates -> source pixels
    let unmap_x = |v: f32| (v * target as f32 - offset_x) / scale;
    let unmap_y = |v: f32| (v * target as f32 - offset_y) / scale;
    let detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for i in 0..5 {
                landmarks[i * 2] = unmap_x(d.landmarks[i * 2]);
                landmarks[i * 2 + 1] = unmap_y(d.landmarks[i * 2 + 1]);
            }
            Detection {
                bbox: [
                    unmap_x(d.bbox[0]),
                    unmap_y(d.bbox[1]),
                    d.bbox[2] * target as f32 / scale,
                    d.bbox[3] * target as f32 / scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        Ok(detections)
    }
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Align and crop a face to `size`x`size` by mapping the eyes onto the
/// ArcFace reference eye positions (rotation + uniform scale + translation).
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }

    let unit = size as f32 / RECOGNIZER_INPUT as f32;
    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let ref_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );

    // out = M * in + t, M = scale * [cos sin; -sin cos]
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let tx = ref_center.0 - (a * center.0 + b * center.1);
    let ty = ref_center.1 - (c * center.0 + d * center.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let mut out = RgbImage::new(size, size);

    for oy in 0..size {
        for ox in 0..size {
            let (px, py) = (ox as f32 - tx, oy as f32 - ty);
            let sx = (d * px - b * py) / det;
            let sy = (-c * px + a * py) / det;
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                continue;
            }

            // Bilinear sample
            let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
            let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);
            let weights = [
                (x0, y0, (1.0 - fx) * (1.0 - fy)),
                (x1, y0, fx * (1.0 - fy)),
                (x0, y1, (1.0 - fx) * fy),
                (x1, y1, fx * fy),
            ];

            let mut rgb = [0.0f32; 3];
            for (x, y, wt) in weights {
                let p = src.get_pixel(x, y);
                for ch in 0..3 {
                    rgb[ch] += p[ch] as f32 * wt;
                }
            }
            out.put_pixel(ox, oy, image::Rgb(rgb.map(|v| v.clamp(0.0, 255.0) as u8)));
        }
    }

    Ok(DynamicImage::ImageRgb8(out))
}

/// Encode face image to an L2-normalized embedding using SFace
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let size = RECOGNIZER_INPUT;
    let face = face_img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let input = Value::from_array(bgr_tensor(&face)?)?;
    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let len = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    if len == 0 || len > data.len() {
        anyhow::bail!("recognizer returned malformed output shape {:?}", shape);
    }

    let mut values = data[..len].to_vec();
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }

    Ok(Embedding::from_vec(values))
}

/// Cosine similarity between two embeddings, in `[-1, 1]`.
///
/// Returns 0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.vector.iter().zip(b.vector.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }

    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0) as f32
}

/// `1 - cosine_similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &Embedding, b: &Embedding) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Similarity at or above the threshold counts as a match.
pub fn is_match(similarity: f32, threshold: f32) -> bool {
    similarity >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], score: f32) -> Detection {
        Detection {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);

        // No overlap
        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms() {
        let detections = vec![
            det([10.0, 10.0, 20.0, 20.0], 0.8),
            det([12.0, 12.0, 20.0, 20.0], 0.9),
            det([100.0, 100.0, 20.0, 20.0], 0.85),
        ];

        let result = nms(&detections, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
        assert!(nms(&[], 0.3).is_empty());
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = Embedding::from_vec(vec![0.3, -1.2, 4.5, 0.01]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = Embedding::from_vec(vec![1.0, 2.0, 3.0]);
        let b = Embedding::from_vec(vec![-2.0, 0.5, 1.0]);
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_similarity_known_values() {
        let x = Embedding::from_vec(vec![1.0, 0.0]);
        let y = Embedding::from_vec(vec![0.0, 3.0]);
        let neg = Embedding::from_vec(vec![-2.0, 0.0]);
        assert!(cosine_similarity(&x, &y).abs() < 1e-6);
        assert!((cosine_similarity(&x, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_degenerate_inputs() {
        let zero = Embedding::from_vec(vec![0.0, 0.0]);
        let x = Embedding::from_vec(vec![1.0, 0.0]);
        let longer = Embedding::from_vec(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&zero, &x), 0.0);
        assert_eq!(cosine_similarity(&x, &longer), 0.0);
    }

    #[test]
    fn test_threshold_inclusive() {
        assert!(is_match(0.85, 0.85));
        assert!(is_match(0.9, 0.85));
        assert!(!is_match(0.8499, 0.85));
    }

    #[test]
    fn test_scaled_corners() {
        let d = det([10.0, 20.0, 30.0, 40.0], 0.9);
        assert_eq!(d.scaled_corners(1), (10, 20, 40, 60));
        assert_eq!(d.scaled_corners(4), (40, 80, 160, 240));
    }

    #[test]
    fn test_align_face_output_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, image::Rgb([90, 120, 200])));
        let mut d = det([50.0, 50.0, 100.0, 100.0], 0.9);
        d.landmarks[..4].copy_from_slice(&[80.0, 90.0, 120.0, 90.0]);

        let aligned = align_face(&img, &d, 112).unwrap();
        assert_eq!(aligned.dimensions(), (112, 112));
        // Centre of the crop samples the uniform source
        let px = aligned.to_rgb8().get_pixel(56, 56).0;
        assert!((px[0] as i32 - 90).abs() <= 1);

        d.landmarks[2] = 80.0;
        d.landmarks[3] = 90.0;
        assert!(align_face(&img, &d, 112).is_err());
    }

    #[test]
    fn test_bgr_tensor_layout() {
        let img = RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30]));
        let t = bgr_tensor(&img).unwrap();
        assert_eq!(t.dim(), (1, 3, 1, 2));
        assert_eq!(t[[0, 0, 0, 0]], 30.0);
        assert_eq!(t[[0, 1, 0, 1]], 20.0);
        assert_eq!(t[[0, 2, 0, 0]], 10.0);
    }
}
