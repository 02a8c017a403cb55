//! Concrete recognition backends, each behind its own cargo feature.
//!
//! The pipeline always runs three slots in a fixed order:
//!
//! 1. `detection`: PP-OCR text detection + recognition (ONNX), tuned for Portuguese.
//! 2. `reader`: general-purpose line reader (`ocrs`).
//! 3. `tesseract`: classic single-language recognizer, last resort.
//!
//! A slot whose feature is disabled, or whose models fail to load, is filled by an
//! [`UnavailableEngine`] so the order never shifts.

use zooscan_core::EnginesConfig;

use crate::recognizer::{RecognitionEngine, UnavailableEngine};

pub const DETECTION: &str = "detection";
pub const READER: &str = "reader";
pub const TESSERACT: &str = "tesseract";

/// Build the three engine slots in priority order. Model loading happens here,
/// once, and the returned engines are meant to live for the whole process.
pub fn build_engines(config: &EnginesConfig) -> Vec<Box<dyn RecognitionEngine>> {
    vec![
        detection_slot(config),
        reader_slot(config),
        tesseract_slot(config),
    ]
}

fn unavailable(name: &'static str, reason: String) -> Box<dyn RecognitionEngine> {
    tracing::warn!(engine = name, %reason, "recognition engine disabled");
    Box::new(UnavailableEngine::new(name, reason))
}

#[cfg(feature = "detection")]
fn detection_slot(config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    use crate::recognizer::Serialized;
    match detection_backend::DetectionEngine::new(&config.detection) {
        Ok(engine) => Box::new(Serialized::new(engine)),
        Err(e) => unavailable(DETECTION, e.to_string()),
    }
}

#[cfg(not(feature = "detection"))]
fn detection_slot(_config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    unavailable(DETECTION, "built without `detection` feature".into())
}

#[cfg(feature = "reader")]
fn reader_slot(config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    match reader_backend::ReaderEngine::new(&config.reader) {
        Ok(engine) => Box::new(engine),
        Err(e) => unavailable(READER, e.to_string()),
    }
}

#[cfg(not(feature = "reader"))]
fn reader_slot(_config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    unavailable(READER, "built without `reader` feature".into())
}

#[cfg(feature = "tesseract")]
fn tesseract_slot(config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    use crate::recognizer::Serialized;
    match tesseract_backend::TesseractEngine::new(&config.tesseract) {
        Ok(engine) => Box::new(Serialized::new(engine)),
        Err(e) => unavailable(TESSERACT, e.to_string()),
    }
}

#[cfg(not(feature = "tesseract"))]
fn tesseract_slot(_config: &EnginesConfig) -> Box<dyn RecognitionEngine> {
    unavailable(TESSERACT, "built without `tesseract` feature".into())
}

#[cfg_attr(not(any(feature = "detection", feature = "reader")), allow(dead_code))]
fn require<'a, T>(value: &'a Option<T>, key: &str) -> Result<&'a T, crate::EngineFailure> {
    value
        .as_ref()
        .ok_or_else(|| crate::EngineFailure::ModelLoad(format!("{key} is not set")))
}

/// Join recognized fragments with single spaces, dropping blank ones.
#[cfg_attr(not(any(feature = "detection", feature = "reader")), allow(dead_code))]
fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .filter_map(|f| {
            let f = f.as_ref().trim();
            (!f.is_empty()).then(|| f.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── PP-OCR detection + recognition (optional, gated behind `detection`) ───────

#[cfg(feature = "detection")]
pub mod detection_backend {
    use oar_ocr::oarocr::{OAROCRBuilder, OAROCR};
    use zooscan_core::DetectionEngineConfig;

    use super::{join_fragments, require, DETECTION};
    use crate::recognizer::{EngineFailure, ExclusiveEngine};
    use crate::types::PreprocessedImage;

    pub struct DetectionEngine {
        ocr: OAROCR,
    }

    impl DetectionEngine {
        pub fn new(config: &DetectionEngineConfig) -> Result<Self, EngineFailure> {
            let det = require(&config.detection_model, "engines.detection.detection_model")?;
            let rec = require(&config.recognition_model, "engines.detection.recognition_model")?;
            let dict = require(&config.dictionary, "engines.detection.dictionary")?;
            let ocr = OAROCRBuilder::new(det.clone(), rec.clone(), dict.clone())
                .build()
                .map_err(|e| EngineFailure::ModelLoad(e.to_string()))?;
            Ok(Self { ocr })
        }
    }

    impl ExclusiveEngine for DetectionEngine {
        fn name(&self) -> &'static str {
            DETECTION
        }

        fn recognize_mut(&mut self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
            let results = self
                .ocr
                .predict(vec![image.to_rgb()])
                .map_err(|e| EngineFailure::Engine(e.to_string()))?;
            let text = join_fragments(
                results
                    .into_iter()
                    .flat_map(|r| r.text_regions)
                    .filter_map(|region| region.text),
            );
            if text.is_empty() {
                return Err(EngineFailure::NoDetections);
            }
            Ok(text)
        }
    }
}

// ── General-purpose reader (optional, gated behind `reader`) ───────────────────

#[cfg(feature = "reader")]
pub mod reader_backend {
    use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
    use rten::Model;
    use zooscan_core::ReaderEngineConfig;

    use super::{join_fragments, require, READER};
    use crate::recognizer::{EngineFailure, RecognitionEngine};
    use crate::types::PreprocessedImage;

    pub struct ReaderEngine {
        engine: OcrEngine,
    }

    impl ReaderEngine {
        pub fn new(config: &ReaderEngineConfig) -> Result<Self, EngineFailure> {
            let det = require(&config.detection_model, "engines.reader.detection_model")?;
            let rec = require(&config.recognition_model, "engines.reader.recognition_model")?;
            let detection_model =
                Model::load_file(det).map_err(|e| EngineFailure::ModelLoad(e.to_string()))?;
            let recognition_model =
                Model::load_file(rec).map_err(|e| EngineFailure::ModelLoad(e.to_string()))?;
            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|e| EngineFailure::ModelLoad(e.to_string()))?;
            Ok(Self { engine })
        }
    }

    impl RecognitionEngine for ReaderEngine {
        fn name(&self) -> &'static str {
            READER
        }

        fn recognize(&self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
            let rgb = image.to_rgb();
            let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
                .map_err(|e| EngineFailure::Unsupported(e.to_string()))?;
            let input = self
                .engine
                .prepare_input(source)
                .map_err(|e| EngineFailure::Engine(e.to_string()))?;
            let words = self
                .engine
                .detect_words(&input)
                .map_err(|e| EngineFailure::Engine(e.to_string()))?;
            if words.is_empty() {
                return Err(EngineFailure::NoDetections);
            }
            let lines = self.engine.find_text_lines(&input, &words);
            let texts = self
                .engine
                .recognize_text(&input, &lines)
                .map_err(|e| EngineFailure::Engine(e.to_string()))?;
            Ok(join_fragments(texts.iter().flatten().map(|line| line.to_string())))
        }
    }
}

// ── Tesseract backend (optional, gated behind `tesseract`) ─────────────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use leptess::LepTess;
    use zooscan_core::TesseractConfig;

    use super::TESSERACT;
    use crate::recognizer::{EngineFailure, ExclusiveEngine};
    use crate::types::PreprocessedImage;

    pub struct TesseractEngine {
        api: LepTess,
    }

    impl TesseractEngine {
        pub fn new(config: &TesseractConfig) -> Result<Self, EngineFailure> {
            let api = LepTess::new(config.data_path.as_deref(), &config.lang)
                .map_err(|e| EngineFailure::ModelLoad(e.to_string()))?;
            Ok(Self { api })
        }
    }

    impl ExclusiveEngine for TesseractEngine {
        fn name(&self) -> &'static str {
            TESSERACT
        }

        fn recognize_mut(&mut self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
            let png = image
                .to_png()
                .map_err(|e| EngineFailure::Unsupported(e.to_string()))?;
            self.api
                .set_image_from_mem(&png)
                .map_err(|e| EngineFailure::Unsupported(e.to_string()))?;
            self.api
                .get_utf8_text()
                .map_err(|e| EngineFailure::Engine(e.to_string()))
        }
    }
}
