use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use regex::Regex;
use zooscan_core::GateConfig;

use crate::recognizer::{EngineFailure, RecognitionEngine};
use crate::types::{PreprocessedImage, Recognition};

fn re_percent() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\d{1,3}%").expect("invalid regex"))
}

/// Decides whether recognized text is good enough to stop trying engines:
/// enough characters and at least one percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    min_chars: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}

impl QualityGate {
    pub fn new(config: &GateConfig) -> Self {
        Self { min_chars: config.min_chars }
    }

    pub fn accepts(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.min_chars && re_percent().is_match(text)
    }
}

/// Final result of a fallback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// Whitespace-normalized text handed to extraction.
    pub text: String,
    /// Engine whose text was kept; `None` if every engine came back empty.
    pub engine: Option<&'static str>,
    pub accepted: bool,
    /// Number of engines invoked.
    pub attempts: usize,
}

/// Runs engines in priority order until one produces text the gate accepts.
pub struct FallbackOrchestrator {
    engines: Vec<Box<dyn RecognitionEngine>>,
    gate: QualityGate,
}

impl FallbackOrchestrator {
    pub fn new(engines: Vec<Box<dyn RecognitionEngine>>, gate: QualityGate) -> Self {
        Self { engines, gate }
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Never fails: engine errors become empty candidates, and when nothing is
    /// accepted the last non-empty candidate is returned unaccepted.
    pub fn recognize(&self, image: &PreprocessedImage) -> FallbackOutcome {
        let mut best: Option<Recognition> = None;
        let mut attempts = 0;

        for engine in &self.engines {
            attempts += 1;
            let text = invoke(engine.as_ref(), image).unwrap_or_else(|failure| {
                tracing::warn!(engine = engine.name(), %failure, "engine failed, treating as empty");
                String::new()
            });

            if self.gate.accepts(&text) {
                tracing::info!(engine = engine.name(), attempts, "recognized text accepted");
                return FallbackOutcome {
                    text: normalize_text(&text),
                    engine: Some(engine.name()),
                    accepted: true,
                    attempts,
                };
            }

            tracing::debug!(
                engine = engine.name(),
                chars = text.trim().chars().count(),
                "recognized text rejected by quality gate"
            );
            // An empty candidate never displaces earlier partial text.
            if !text.trim().is_empty() {
                best = Some(Recognition { engine: engine.name(), text });
            }
        }

        tracing::info!(attempts, "no engine passed the quality gate");
        match best {
            Some(r) => FallbackOutcome {
                text: normalize_text(&r.text),
                engine: Some(r.engine),
                accepted: false,
                attempts,
            },
            None => FallbackOutcome {
                text: String::new(),
                engine: None,
                accepted: false,
                attempts,
            },
        }
    }
}

/// Call one engine, turning a panic into an ordinary failure.
fn invoke(engine: &dyn RecognitionEngine, image: &PreprocessedImage) -> Result<String, EngineFailure> {
    let _span = tracing::debug_span!("engine", name = engine.name()).entered();
    match catch_unwind(AssertUnwindSafe(|| engine.recognize(image))) {
        Ok(result) => result,
        Err(payload) => Err(EngineFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Collapse newlines and whitespace runs into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{GrayImage, ImageBuffer, Luma};
    use std::sync::Arc;

    fn blank() -> PreprocessedImage {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([255u8]));
        PreprocessedImage::new(img)
    }

    fn orchestrator(engines: &[Arc<MockRecognizer>]) -> FallbackOrchestrator {
        FallbackOrchestrator::new(
            engines
                .iter()
                .map(|e| Box::new(Arc::clone(e)) as Box<dyn RecognitionEngine>)
                .collect(),
            QualityGate::default(),
        )
    }

    // ── Quality gate ──────────────────────────────────────────────────────────

    #[test]
    fn gate_accepts_long_text_with_percentage() {
        let gate = QualityGate::default();
        assert!(gate.accepts("Taxa de prenhez 82%"));
        assert!(gate.accepts("   prenhez 5%   "));
    }

    #[test]
    fn gate_rejects_short_text() {
        let gate = QualityGate::default();
        assert!(!gate.accepts("oi"));
        assert!(!gate.accepts("   82%    "));
    }

    #[test]
    fn gate_rejects_text_without_percentage() {
        let gate = QualityGate::default();
        assert!(!gate.accepts("Fazenda Sao Joao partos 12"));
        assert!(!gate.accepts("prenhez 82 %"));
    }

    #[test]
    fn gate_counts_characters_not_bytes() {
        let gate = QualityGate::new(&GateConfig { min_chars: 6 });
        // five characters, more than six bytes
        assert!(!gate.accepts("çãé9%"));
        assert!(gate.accepts("çãé19%"));
    }

    #[test]
    fn gate_is_deterministic() {
        let gate = QualityGate::default();
        let text = "concepcao 70% servico 90%";
        let first = gate.accepts(text);
        assert!((0..10).all(|_| gate.accepts(text) == first));
    }

    // ── Fallback order ────────────────────────────────────────────────────────

    #[test]
    fn first_acceptable_engine_stops_the_chain() {
        let engines = [
            Arc::new(MockRecognizer::new("e1", "Fazenda X prenhez 82%")),
            Arc::new(MockRecognizer::new("e2", "unused 1%")),
            Arc::new(MockRecognizer::new("e3", "unused 2%")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(out.accepted);
        assert_eq!(out.engine, Some("e1"));
        assert_eq!(out.attempts, 1);
        assert_eq!(engines[0].calls(), 1);
        assert_eq!(engines[1].calls(), 0);
        assert_eq!(engines[2].calls(), 0);
    }

    #[test]
    fn falls_through_to_second_engine() {
        let engines = [
            Arc::new(MockRecognizer::new("e1", "garbled")),
            Arc::new(MockRecognizer::new("e2", "servico 90% partos 12")),
            Arc::new(MockRecognizer::new("e3", "unused 2%")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(out.accepted);
        assert_eq!(out.engine, Some("e2"));
        assert_eq!(engines[2].calls(), 0);
    }

    #[test]
    fn short_text_exhausts_all_engines() {
        let engines = [
            Arc::new(MockRecognizer::new("e1", "oi")),
            Arc::new(MockRecognizer::new("e2", "oi")),
            Arc::new(MockRecognizer::new("e3", "oi")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(!out.accepted);
        assert_eq!(out.attempts, 3);
        assert!(engines.iter().all(|e| e.calls() == 1));
        assert_eq!(out.text, "oi");
    }

    #[test]
    fn failures_and_panics_are_isolated() {
        let engines = [
            Arc::new(MockRecognizer::failing("e1")),
            Arc::new(MockRecognizer::panicking("e2")),
            Arc::new(MockRecognizer::new("e3", "prenhez\n\n 75%   concepcao 60%")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(out.accepted);
        assert_eq!(out.engine, Some("e3"));
        assert_eq!(out.text, "prenhez 75% concepcao 60%");
    }

    #[test]
    fn all_engines_failing_yields_empty_unaccepted_text() {
        let engines = [
            Arc::new(MockRecognizer::failing("e1")),
            Arc::new(MockRecognizer::panicking("e2")),
            Arc::new(MockRecognizer::failing("e3")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(!out.accepted);
        assert_eq!(out.engine, None);
        assert_eq!(out.text, "");
        assert_eq!(out.attempts, 3);
    }

    #[test]
    fn later_failure_keeps_earlier_partial_text() {
        let engines = [
            Arc::new(MockRecognizer::new("e1", "Fazenda   Boa Vista")),
            Arc::new(MockRecognizer::failing("e2")),
            Arc::new(MockRecognizer::new("e3", "   ")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert!(!out.accepted);
        assert_eq!(out.engine, Some("e1"));
        assert_eq!(out.text, "Fazenda Boa Vista");
    }

    #[test]
    fn later_unaccepted_text_replaces_earlier() {
        let engines = [
            Arc::new(MockRecognizer::new("e1", "abc")),
            Arc::new(MockRecognizer::new("e2", "abcdef")),
            Arc::new(MockRecognizer::new("e3", "partos 12 sem taxa")),
        ];
        let out = orchestrator(&engines).recognize(&blank());
        assert_eq!(out.engine, Some("e3"));
        assert_eq!(out.text, "partos 12 sem taxa");
    }

    #[test]
    fn no_engines_is_empty_outcome() {
        let out = FallbackOrchestrator::new(vec![], QualityGate::default()).recognize(&blank());
        assert_eq!(out.attempts, 0);
        assert!(!out.accepted);
    }

    // ── Normalization ─────────────────────────────────────────────────────────

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  a\n\nb \t c  "), "a b c");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn panic_message_extracts_str_and_string() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
