pub mod backends;
pub mod extract;
pub mod fallback;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod staging;
pub mod types;

pub use backends::build_engines;
pub use extract::Extractor;
pub use fallback::{normalize_text, FallbackOrchestrator, FallbackOutcome, QualityGate};
pub use pipeline::{OcrPipeline, PipelineError};
pub use preprocess::{DecodeError, Preprocessor};
pub use recognizer::{
    EngineFailure, ExclusiveEngine, MockRecognizer, RecognitionEngine, Serialized,
    UnavailableEngine,
};
pub use staging::StagedUpload;
pub use types::{PipelineOutput, PreprocessedImage, RawImage, Recognition};
