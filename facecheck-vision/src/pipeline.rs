use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::analyzer::FaceAnalyzer;
use crate::face::{self, Detection, Embedding};

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Pipeline {
    pub fn new(detector_model: &Path, recognizer_model: &Path) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(detector_model)?,
            encoder: crate::model::recognizer_session(recognizer_model)?,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        })
    }

    pub fn with_thresholds(mut self, score_threshold: f32, nms_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self.nms_threshold = nms_threshold;
        self
    }
}

impl FaceAnalyzer for Pipeline {
    fn locate_faces(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            self.score_threshold,
            self.nms_threshold,
        )
        .context("detecting faces")
    }

    fn encode_face(&mut self, img: &DynamicImage, detection: &Detection) -> Result<Embedding> {
        let aligned =
            face::align_face(img, detection, face::RECOGNIZER_INPUT).context("aligning face")?;
        face::encode_face(&mut self.encoder, &aligned).context("encoding face")
    }

    fn encode_image(&mut self, img: &DynamicImage) -> Result<Embedding> {
        face::encode_face(&mut self.encoder, img).context("encoding image")
    }
}
