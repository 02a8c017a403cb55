use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zooscan_core::PipelineConfig;

use crate::backends;
use crate::extract::Extractor;
use crate::fallback::{FallbackOrchestrator, QualityGate};
use crate::preprocess::{DecodeError, Preprocessor};
use crate::recognizer::RecognitionEngine;
use crate::staging::StagedUpload;
use crate::types::{PipelineOutput, RawImage};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image could not be decoded: {0}")]
    Decode(#[from] DecodeError),
}

/// Orchestrates: preprocess → engine fallback → metric extraction.
///
/// Engines are loaded once when the pipeline is built and shared by every call;
/// the pipeline is `Send + Sync` and can serve concurrent uploads.
pub struct OcrPipeline {
    preprocessor: Preprocessor,
    orchestrator: FallbackOrchestrator,
    staging_dir: PathBuf,
}

impl OcrPipeline {
    /// Build with the configured backends in their fixed priority order.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_engines(config, backends::build_engines(&config.engines))
    }

    /// Build with caller-supplied engines, tried in the given order.
    pub fn with_engines(config: &PipelineConfig, engines: Vec<Box<dyn RecognitionEngine>>) -> Self {
        Self {
            preprocessor: Preprocessor::new(&config.preprocess),
            orchestrator: FallbackOrchestrator::new(engines, QualityGate::new(&config.gate)),
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Directory where [`process_upload`](Self::process_upload) parks uploads.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.orchestrator.engine_names()
    }

    /// Process raw bytes. Only an undecodable image is an error; anything the
    /// engines or the extractor miss comes back as `None` fields.
    pub fn process(&self, raw: RawImage<'_>) -> Result<PipelineOutput, DecodeError> {
        let image = self.preprocessor.prepare(&raw)?;
        let outcome = self.orchestrator.recognize(&image);
        let metrics = Extractor::extract(&outcome.text);

        tracing::info!(
            engine = outcome.engine.unwrap_or("none"),
            accepted = outcome.accepted,
            fields = metrics.recovered_fields(),
            farm_found = !metrics.farm_name.is_unknown(),
            "sheet processed"
        );

        Ok(PipelineOutput {
            text: outcome.text,
            metrics,
            accepted: outcome.accepted,
        })
    }

    /// Process an image file on disk; the media type is inferred from the extension.
    pub async fn process_file(&self, path: &Path) -> Result<PipelineOutput, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let media_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(image::ImageFormat::from_extension)
            .map(|f| f.to_mime_type());
        let raw = RawImage { bytes: &bytes, media_type };
        Ok(self.process(raw)?)
    }

    /// Stage an upload stream in a temp file, process it, and remove the file on
    /// every exit path.
    pub fn process_upload<R: Read>(
        &self,
        upload: R,
        media_type: Option<&str>,
    ) -> Result<PipelineOutput, PipelineError> {
        let staged = StagedUpload::stage(upload, media_type, &self.staging_dir)?;
        let bytes = staged.read()?;
        let output = self.process(RawImage { bytes: &bytes, media_type })?;
        if let Err(e) = staged.release() {
            tracing::warn!(error = %e, "failed to remove staged upload");
        }
        Ok(output)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
