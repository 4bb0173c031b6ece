use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};

use facecheck_vision::overlay;

use crate::config::Config;
use crate::live::{FrameAnnotator, LiveLoop, LoopSummary};
use crate::{preview, Camera, Embedding, FaceAnalyzer, Pipeline};

/// Outcome of comparing one frame against the reference face.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Verification {
    pub verified: bool,
    /// Cosine distance to the reference; absent when the frame could not be processed.
    pub distance: Option<f32>,
}

impl Verification {
    pub fn label(&self) -> String {
        let verdict = if self.verified { "MATCH" } else { "NO MATCH" };
        match self.distance {
            Some(d) => format!("{} ({:.3})", verdict, d),
            None => verdict.to_string(),
        }
    }
}

/// Load an image that must exist; a missing file is a startup error.
pub fn open_reference(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        anyhow::bail!("Reference image not found: {}", path.display());
    }
    image::open(path).with_context(|| format!("reading reference image {}", path.display()))
}

/// Verifies every frame against one reference face.
pub struct Verifier<A> {
    analyzer: A,
    reference: Embedding,
    max_distance: f32,
    font_scale: i32,
}

impl<A: FaceAnalyzer> Verifier<A> {
    pub fn new(analyzer: A, reference: Embedding, max_distance: f32) -> Self {
        Self {
            analyzer,
            reference,
            max_distance,
            font_scale: 2,
        }
    }

    /// Encode the reference image once. A reference without a detectable
    /// face is encoded whole.
    pub fn from_reference_image(mut analyzer: A, path: &Path, max_distance: f32) -> Result<Self> {
        let img = open_reference(path)?;
        let reference = analyzer
            .encode_lenient(&img)
            .with_context(|| format!("encoding reference image {}", path.display()))?;
        log::info!("reference face loaded from {}", path.display());
        Ok(Self::new(analyzer, reference, max_distance))
    }

    pub fn with_font_scale(mut self, scale: i32) -> Self {
        self.font_scale = scale;
        self
    }

    pub fn verify(&mut self, frame: &DynamicImage) -> Result<Verification> {
        let probe = self.analyzer.encode_lenient(frame)?;
        let distance = facecheck_vision::cosine_distance(&self.reference, &probe);
        Ok(Verification {
            verified: distance <= self.max_distance,
            distance: Some(distance),
        })
    }
}

impl<A: FaceAnalyzer> FrameAnnotator for Verifier<A> {
    fn annotate(&mut self, frame: &mut RgbImage) {
        let img = DynamicImage::ImageRgb8(frame.clone());
        let result = self.verify(&img).unwrap_or_else(|e| {
            log::warn!("error while processing frame: {:#}", e);
            Verification::default()
        });
        log::debug!("verification: {:?}", result);

        overlay::draw_label(
            frame,
            &result.label(),
            20,
            40,
            overlay::verdict_color(result.verified),
            self.font_scale,
        );
    }
}

/// Live verification against `reference` until capture fails or the user quits.
pub fn run(cfg: &Config, reference: &Path, camera: &str) -> Result<LoopSummary> {
    // Fail on a missing reference before touching models or camera
    open_reference(reference)?;

    let pipeline = Pipeline::new(&cfg.models.detector, &cfg.models.recognizer)
        .context("Failed to initialize face recognition pipeline")?
        .with_thresholds(cfg.detection.score_threshold, cfg.detection.nms_threshold);
    let mut verifier =
        Verifier::from_reference_image(pipeline, reference, cfg.verify.max_distance)?
            .with_font_scale(cfg.preview.font_scale);

    let camera = Camera::open(camera).context("Cannot open camera")?;
    let preview = preview::open(&cfg.preview, "Live Face Verification");

    log::info!("Starting live verification. Press q to quit.");
    LiveLoop::new(camera, preview).run(&mut verifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::testing::*;
    use crate::live::StopReason;
    use crate::testing::{face, Scene, ScriptedAnalyzer};

    #[test]
    fn test_labels() {
        let hit = Verification {
            verified: true,
            distance: Some(0.1234),
        };
        assert_eq!(hit.label(), "MATCH (0.123)");
        assert_eq!(Verification::default().label(), "NO MATCH");
    }

    #[test]
    fn test_verify_threshold_is_inclusive() {
        let analyzer = ScriptedAnalyzer::new(vec![Scene::Faces(vec![face(10.0, vec![1.0, 0.0])])]);
        let mut v = Verifier::new(analyzer, Embedding::from_vec(vec![1.0, 0.0]), 0.0);
        let result = v.verify(&DynamicImage::new_rgb8(8, 8)).unwrap();
        assert!(result.verified);
        assert!(result.distance.unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_no_face_falls_back_to_whole_frame() {
        let mut analyzer = ScriptedAnalyzer::new(vec![Scene::Faces(vec![])]);
        analyzer.whole_image = vec![0.0, 1.0];
        let mut v = Verifier::new(analyzer, Embedding::from_vec(vec![1.0, 0.0]), 0.5);
        let result = v.verify(&DynamicImage::new_rgb8(8, 8)).unwrap();
        assert!(!result.verified);
        assert!((result.distance.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("me.jpg");
        let err = Verifier::from_reference_image(ScriptedAnalyzer::new(vec![]), &missing, 0.5)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Reference image not found"));
    }

    #[test]
    fn test_reference_encoded_once_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("me.png");
        RgbImage::new(8, 8).save(&path).unwrap();

        let analyzer = ScriptedAnalyzer::new(vec![
            Scene::Faces(vec![face(1.0, vec![0.0, 2.0])]),
            Scene::Faces(vec![face(3.0, vec![0.0, 5.0])]),
        ]);
        let mut v = Verifier::from_reference_image(analyzer, &path, 0.3).unwrap();
        assert_eq!(v.reference.to_vec(), vec![0.0, 2.0]);
        assert!(v.verify(&DynamicImage::new_rgb8(8, 8)).unwrap().verified);
    }

    #[test]
    fn test_processing_errors_do_not_stop_loop() {
        let analyzer = ScriptedAnalyzer::new(vec![
            Scene::Fail,
            Scene::Faces(vec![face(10.0, vec![1.0, 0.0])]),
            Scene::Fail,
        ]);
        let mut verifier =
            Verifier::new(analyzer, Embedding::from_vec(vec![1.0, 0.0]), 0.5).with_font_scale(1);
        let source = ScriptedSource::new(3, 200, 60);
        let mut preview = RecordingPreview::default();

        let summary = {
            let mut live = LiveLoop::new(source, &mut preview);
            let mut reason = None;
            while reason.is_none() {
                reason = live.step(&mut verifier).unwrap();
            }
            assert_eq!(live.frames(), 3);
            reason.unwrap()
        };
        assert_eq!(summary, StopReason::CaptureFailed);

        // Errors render red NO MATCH, the good frame green MATCH
        let has = |img: &RgbImage, color: image::Rgb<u8>| img.pixels().any(|p| *p == color);
        assert!(has(&preview.shown[0], overlay::RED));
        assert!(!has(&preview.shown[0], overlay::GREEN));
        assert!(has(&preview.shown[1], overlay::GREEN));
        assert!(has(&preview.shown[2], overlay::RED));
    }
}
