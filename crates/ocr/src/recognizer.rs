use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::types::PreprocessedImage;

#[derive(Debug, Error)]
pub enum EngineFailure {
    #[error("Engine not available: {0}")]
    Unavailable(String),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("No text detected")]
    NoDetections,
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Engine panicked: {0}")]
    Panicked(String),
}

/// One text recognizer in the fallback chain.
/// Implementations read the binarized sheet and return whatever text they can find.
pub trait RecognitionEngine: Send + Sync {
    /// Short identifier used in logs (e.g. "tesseract").
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &PreprocessedImage) -> Result<String, EngineFailure>;
}

impl<E: RecognitionEngine + ?Sized> RecognitionEngine for Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn recognize(&self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
        (**self).recognize(image)
    }
}

impl<E: RecognitionEngine + ?Sized> RecognitionEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn recognize(&self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
        (**self).recognize(image)
    }
}

/// A backend whose handle needs exclusive access while it runs.
pub trait ExclusiveEngine: Send {
    fn name(&self) -> &'static str;

    fn recognize_mut(&mut self, image: &PreprocessedImage) -> Result<String, EngineFailure>;
}

/// Shares an [`ExclusiveEngine`] across threads, one call in flight at a time.
///
/// Other engines and other pipeline calls are unaffected by the lock.
pub struct Serialized<E> {
    name: &'static str,
    inner: Mutex<E>,
}

impl<E: ExclusiveEngine> Serialized<E> {
    pub fn new(engine: E) -> Self {
        Self { name: engine.name(), inner: Mutex::new(engine) }
    }
}

impl<E: ExclusiveEngine> RecognitionEngine for Serialized<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn recognize(&self, image: &PreprocessedImage) -> Result<String, EngineFailure> {
        // A panic in an earlier call poisons the lock; the handle is still usable.
        let mut engine = self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!(engine = self.name, "recovering engine after earlier panic");
            poisoned.into_inner()
        });
        engine.recognize_mut(image)
    }
}

/// Stands in for a backend that was not compiled in or failed to initialize.
#[derive(Debug, Clone)]
pub struct UnavailableEngine {
    name: &'static str,
    reason: String,
}

impl UnavailableEngine {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self { name, reason: reason.into() }
    }
}

impl RecognitionEngine for UnavailableEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn recognize(&self, _image: &PreprocessedImage) -> Result<String, EngineFailure> {
        Err(EngineFailure::Unavailable(format!("{}: {}", self.name, self.reason)))
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

#[derive(Debug, Clone)]
enum MockBehavior {
    Text(String),
    Fail,
    Panic,
}

/// Returns a pre-set string and counts how often it was asked, useful for
/// testing the fallback order without any OCR models installed.
#[derive(Debug)]
pub struct MockRecognizer {
    name: &'static str,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockRecognizer {
    pub fn new(name: &'static str, text: impl Into<String>) -> Self {
        Self::with_behavior(name, MockBehavior::Text(text.into()))
    }

    /// Always reports an engine error.
    pub fn failing(name: &'static str) -> Self {
        Self::with_behavior(name, MockBehavior::Fail)
    }

    /// Panics on every call.
    pub fn panicking(name: &'static str) -> Self {
        Self::with_behavior(name, MockBehavior::Panic)
    }

    fn with_behavior(name: &'static str, behavior: MockBehavior) -> Self {
        Self { name, behavior, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for MockRecognizer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn recognize(&self, _image: &PreprocessedImage) -> Result<String, EngineFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Text(text) => Ok(text.clone()),
            MockBehavior::Fail => Err(EngineFailure::Engine(format!("{} mock failure", self.name))),
            MockBehavior::Panic => panic!("{} mock panic", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn blank() -> PreprocessedImage {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([255u8]));
        PreprocessedImage::new(img)
    }

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("mock", "prenhez 82%");
        assert_eq!(r.recognize(&blank()).unwrap(), "prenhez 82%");
        assert_eq!(r.calls(), 1);
    }

    #[test]
    fn mock_failing_reports_engine_error() {
        let r = MockRecognizer::failing("mock");
        assert!(matches!(r.recognize(&blank()), Err(EngineFailure::Engine(_))));
        assert_eq!(r.calls(), 1);
    }

    #[test]
    fn unavailable_engine_always_fails() {
        let e = UnavailableEngine::new("tesseract", "built without `tesseract` feature");
        let err = e.recognize(&blank()).unwrap_err();
        assert!(matches!(err, EngineFailure::Unavailable(_)));
        assert!(err.to_string().contains("tesseract"));
    }

    #[test]
    fn arc_delegates_to_inner_engine() {
        let mock = Arc::new(MockRecognizer::new("shared", "texto"));
        let boxed: Box<dyn RecognitionEngine> = Box::new(Arc::clone(&mock));
        assert_eq!(boxed.name(), "shared");
        assert_eq!(boxed.recognize(&blank()).unwrap(), "texto");
        assert_eq!(mock.calls(), 1);
    }

    /// Flags overlapping calls; exclusive access should make overlap impossible.
    struct OverlapDetector {
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    impl ExclusiveEngine for OverlapDetector {
        fn name(&self) -> &'static str {
            "overlap"
        }

        fn recognize_mut(&mut self, _image: &PreprocessedImage) -> Result<String, EngineFailure> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.store(false, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    #[test]
    fn serialized_engine_never_runs_concurrently() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let engine = Serialized::new(OverlapDetector {
            in_flight: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::clone(&overlapped),
        });
        let image = blank();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..3 {
                        assert_eq!(engine.recognize(&image).unwrap(), "ok");
                    }
                });
            }
        });

        assert!(!overlapped.load(Ordering::SeqCst));
        assert_eq!(engine.name(), "overlap");
    }

    struct PanicOnce {
        panicked: bool,
    }

    impl ExclusiveEngine for PanicOnce {
        fn name(&self) -> &'static str {
            "panic-once"
        }

        fn recognize_mut(&mut self, _image: &PreprocessedImage) -> Result<String, EngineFailure> {
            if !self.panicked {
                self.panicked = true;
                panic!("first call explodes");
            }
            Ok("recovered".into())
        }
    }

    #[test]
    fn serialized_engine_survives_poisoned_lock() {
        let engine = Serialized::new(PanicOnce { panicked: false });
        let image = blank();
        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| engine.recognize(&image)));
        assert!(first.is_err());
        assert_eq!(engine.recognize(&image).unwrap(), "recovered");
    }
}
