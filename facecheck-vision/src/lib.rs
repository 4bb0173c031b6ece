pub mod analyzer;
pub mod face;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use analyzer::{FaceAnalyzer, FaceEncoding};
pub use face::{cosine_distance, cosine_similarity, is_match, Detection, Embedding};
pub use pipeline::Pipeline;
pub use video::{Camera, FrameSource};
