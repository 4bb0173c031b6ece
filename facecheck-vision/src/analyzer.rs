use anyhow::Result;
use image::DynamicImage;

use crate::face::{Detection, Embedding};

/// One detected face together with its encoding.
#[derive(Debug, Clone)]
pub struct FaceEncoding {
    pub detection: Detection,
    pub embedding: Embedding,
}

/// Face location and encoding backend used by the live loops.
pub trait FaceAnalyzer {
    /// All faces in the image, in image pixel coordinates.
    fn locate_faces(&mut self, img: &DynamicImage) -> Result<Vec<Detection>>;

    /// Encode the face at `detection`.
    fn encode_face(&mut self, img: &DynamicImage, detection: &Detection) -> Result<Embedding>;

    /// Encode the whole image as if it were a face crop.
    fn encode_image(&mut self, img: &DynamicImage) -> Result<Embedding>;

    /// Locate every face and encode each one. A face that fails to encode
    /// is skipped so the rest of the frame still counts.
    fn faces(&mut self, img: &DynamicImage) -> Result<Vec<FaceEncoding>> {
        let detections = self.locate_faces(img)?;
        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            match self.encode_face(img, &detection) {
                Ok(embedding) => faces.push(FaceEncoding {
                    detection,
                    embedding,
                }),
                Err(e) => log::warn!("skipping face at {:?}: {:#}", detection.bbox, e),
            }
        }
        Ok(faces)
    }

    /// Encoding of the highest scoring face, `None` when no face is found.
    fn best_face(&mut self, img: &DynamicImage) -> Result<Option<FaceEncoding>> {
        let best = self
            .locate_faces(img)?
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));
        match best {
            Some(detection) => {
                let embedding = self.encode_face(img, &detection)?;
                Ok(Some(FaceEncoding {
                    detection,
                    embedding,
                }))
            }
            None => Ok(None),
        }
    }

    /// Best face encoding, or the whole image when no face is detected.
    fn encode_lenient(&mut self, img: &DynamicImage) -> Result<Embedding> {
        match self.best_face(img)? {
            Some(face) => Ok(face.embedding),
            None => {
                log::debug!("no face detected, encoding whole image");
                self.encode_image(img)
            }
        }
    }
}
