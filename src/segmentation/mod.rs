mod lifecycle;
mod preprocess;
pub mod quality;
mod rvm;
pub mod types;

pub use lifecycle::RequestLifecycle;
pub use preprocess::Preprocessor;
pub use quality::{resolve, EngineQualityConfig, QualityLevel};
pub use rvm::{RvmEngine, RvmRequest};
pub use types::{ConfidenceMap, EngineImage, InferenceEngine};
