pub mod image;
pub mod prompt;
pub mod reconcile;

pub use self::image::{DecodeError, DecodedImage, decode_image_blocking};
pub use prompt::build_prompt;
pub use reconcile::{AnalysisResult, reconcile};
