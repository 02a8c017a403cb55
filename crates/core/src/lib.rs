pub mod config;
pub mod metrics;

pub use config::{
    ConfigError, DetectionEngineConfig, EnginesConfig, GateConfig, PipelineConfig,
    PreprocessConfig, ReaderEngineConfig, TesseractConfig,
};
pub use metrics::{FarmName, MetricsRecord, Rate, RateOutOfRange, DEFAULT_FARM_NAME};
