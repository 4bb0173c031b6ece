pub mod config;
pub mod embedder;
pub mod live;
pub mod matcher;
pub mod preview;
pub mod recognize;
pub mod storage;
pub mod verify;

// Re-export vision types for convenience
pub use facecheck_vision::{
    face, overlay, pipeline, video, Camera, Detection, Embedding, FaceAnalyzer, FaceEncoding,
    FrameSource, Pipeline,
};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use anyhow::Result;
    use image::DynamicImage;

    use crate::{Detection, Embedding, FaceAnalyzer};

    /// What the analyzer reports for one frame.
    pub enum Scene {
        Faces(Vec<(Detection, Vec<f32>)>),
        Fail,
    }

    /// A 10x10 face at `(x, 10)` with the given encoding.
    pub fn face(x: f32, embedding: Vec<f32>) -> (Detection, Vec<f32>) {
        let detection = Detection {
            bbox: [x, 10.0, 10.0, 10.0],
            score: 0.9 - x / 1000.0,
            landmarks: [0.0; 10],
        };
        (detection, embedding)
    }

    /// Plays back one scene per `locate_faces` call.
    pub struct ScriptedAnalyzer {
        scenes: VecDeque<Scene>,
        current: Vec<(Detection, Vec<f32>)>,
        pub whole_image: Vec<f32>,
    }

    impl ScriptedAnalyzer {
        pub fn new(scenes: Vec<Scene>) -> Self {
            Self {
                scenes: scenes.into(),
                current: Vec::new(),
                whole_image: vec![0.5, 0.5],
            }
        }
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn locate_faces(&mut self, _img: &DynamicImage) -> Result<Vec<Detection>> {
            match self.scenes.pop_front() {
                Some(Scene::Faces(faces)) => {
                    self.current = faces;
                    Ok(self.current.iter().map(|(d, _)| d.clone()).collect())
                }
                Some(Scene::Fail) => anyhow::bail!("detector exploded"),
                None => anyhow::bail!("no scene scripted"),
            }
        }

        fn encode_face(&mut self, _img: &DynamicImage, detection: &Detection) -> Result<Embedding> {
            self.current
                .iter()
                .find(|(d, _)| d == detection)
                .map(|(_, e)| Embedding::from_vec(e.clone()))
                .ok_or_else(|| anyhow::anyhow!("unknown detection"))
        }

        fn encode_image(&mut self, _img: &DynamicImage) -> Result<Embedding> {
            Ok(Embedding::from_vec(self.whole_image.clone()))
        }
    }
}
