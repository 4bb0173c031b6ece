use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};

use facecheck_vision::{cosine_similarity, is_match, overlay};

use crate::config::Config;
use crate::live::{FrameAnnotator, LiveLoop, LoopSummary};
use crate::storage::{FaceRecord, FaceStore};
use crate::{matcher, preview, verify, Camera, Embedding, FaceAnalyzer, Pipeline};

/// What detected faces are compared against.
#[derive(Debug, Clone)]
pub enum Reference {
    /// One known face, typically encoded from a reference image.
    Single(Embedding),
    /// Enrolled, named faces; the most similar one wins.
    Gallery(Vec<FaceRecord>),
}

impl Reference {
    fn compare(&self, probe: &Embedding) -> (f32, Option<&str>) {
        match self {
            Reference::Single(reference) => (cosine_similarity(reference, probe), None),
            Reference::Gallery(records) => match matcher::best_match(records, probe) {
                Some((record, score)) => (score, Some(record.name.as_str())),
                None => (0.0, None),
            },
        }
    }
}

/// One detected face, its box in full-frame pixels and its verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    /// `(left, top, right, bottom)`
    pub rect: (i32, i32, i32, i32),
    pub similarity: f32,
    pub matched: bool,
    pub name: Option<String>,
}

impl FaceMatch {
    pub fn label(&self) -> String {
        match (&self.name, self.matched) {
            (Some(name), true) => format!("{} ({:.2})", name.to_uppercase(), self.similarity),
            (None, true) => format!("MATCH ({:.2})", self.similarity),
            (_, false) => format!("NO MATCH ({:.2})", self.similarity),
        }
    }
}

/// Shrink a frame by an integer factor before detection.
pub fn downsample(frame: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return frame.clone();
    }
    let w = (frame.width() / factor).max(1);
    let h = (frame.height() / factor).max(1);
    image::imageops::resize(frame, w, h, FilterType::Triangle)
}

/// Recognizes every face in every frame against a fixed reference.
pub struct Recognizer<A> {
    analyzer: A,
    reference: Reference,
    threshold: f32,
    downscale: u32,
    font_scale: i32,
}

impl<A: FaceAnalyzer> Recognizer<A> {
    pub fn new(analyzer: A, reference: Reference, threshold: f32, downscale: u32) -> Self {
        Self {
            analyzer,
            reference,
            threshold,
            downscale: downscale.max(1),
            font_scale: 2,
        }
    }

    pub fn with_font_scale(mut self, scale: i32) -> Self {
        self.font_scale = scale;
        self
    }

    /// Encoding of the best face in a reference image; a reference without a
    /// face is an error.
    pub fn encode_reference(analyzer: &mut A, path: &Path) -> Result<Embedding> {
        let img = verify::open_reference(path)?;
        let face = analyzer
            .best_face(&img)
            .with_context(|| format!("encoding reference image {}", path.display()))?
            .ok_or_else(|| anyhow::anyhow!("No face found in reference image {}", path.display()))?;
        Ok(face.embedding)
    }

    pub fn recognize(&mut self, frame: &RgbImage) -> Result<Vec<FaceMatch>> {
        let small = DynamicImage::ImageRgb8(downsample(frame, self.downscale));
        let faces = self.analyzer.faces(&small)?;

        Ok(faces
            .into_iter()
            .map(|face| {
                let (similarity, name) = self.reference.compare(&face.embedding);
                let matched = is_match(similarity, self.threshold);
                FaceMatch {
                    rect: face.detection.scaled_corners(self.downscale),
                    similarity,
                    matched,
                    name: name.filter(|_| matched).map(str::to_string),
                }
            })
            .collect())
    }
}

impl<A: FaceAnalyzer> FrameAnnotator for Recognizer<A> {
    fn annotate(&mut self, frame: &mut RgbImage) {
        let matches = self.recognize(frame).unwrap_or_else(|e| {
            log::warn!("error while processing frame: {:#}", e);
            Vec::new()
        });
        log::debug!("{} face(s) in frame", matches.len());

        for m in &matches {
            let color = overlay::verdict_color(m.matched);
            overlay::draw_rect(frame, m.rect, color, 2);
            overlay::draw_label(frame, &m.label(), m.rect.0, m.rect.1 - 10, color, self.font_scale);
        }
    }
}

/// Live recognition until capture fails or the user quits. With `enrolled`
/// the enrolled faces replace the reference image.
pub fn run(cfg: &Config, reference: &Path, enrolled: bool, camera: &str) -> Result<LoopSummary> {
    let gallery = if enrolled {
        let store = FaceStore::new(&cfg.store.dir);
        let records = store.load().context("Failed to load face records")?;
        if records.is_empty() {
            anyhow::bail!(
                "No enrolled faces found in {}. Run 'enroll' first.",
                store.dir().display()
            );
        }
        log::info!("Found {} enrolled face(s)", records.len());
        Some(records)
    } else {
        verify::open_reference(reference)?;
        None
    };

    let mut pipeline = Pipeline::new(&cfg.models.detector, &cfg.models.recognizer)
        .context("Failed to initialize face recognition pipeline")?
        .with_thresholds(cfg.detection.score_threshold, cfg.detection.nms_threshold);
    let reference = match gallery {
        Some(records) => Reference::Gallery(records),
        None => Reference::Single(Recognizer::encode_reference(&mut pipeline, reference)?),
    };
    let mut recognizer = Recognizer::new(
        pipeline,
        reference,
        cfg.recognize.threshold,
        cfg.recognize.downscale,
    )
    .with_font_scale(cfg.preview.font_scale);

    let camera = Camera::open(camera).context("Cannot open camera")?;
    let preview = preview::open(&cfg.preview, "Live Face Recognition");

    log::info!("Starting live recognition. Press q to quit.");
    LiveLoop::new(camera, preview).run(&mut recognizer)
}
