//! Progress tracking and reporting for install operations

use std::sync::Arc;
use std::time::Duration;

/// Progress callback for install operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Pipeline stages announced through [`ProgressEvent::StageStarted`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Downloading,
    Extracting,
    Composing,
    Lighting,
    Registering,
}

impl std::fmt::Display for InstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallStage::Downloading => write!(f, "downloading"),
            InstallStage::Extracting => write!(f, "extracting"),
            InstallStage::Composing => write!(f, "composing package"),
            InstallStage::Lighting => write!(f, "installing lighting definitions"),
            InstallStage::Registering => write!(f, "registering package"),
        }
    }
}

/// Events emitted during install operations
///
/// Percent values are monotonic by convention only; consumers must tolerate
/// repeats and out-of-order values.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress {
        percent: u8,
    },
    StageStarted {
        stage: InstallStage,
    },
    RetryAttempt {
        url: String,
        attempt: usize,
        max_attempts: usize,
        delay: Duration,
    },
    Warning {
        message: String,
    },
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, _percent: u8) {}
    fn on_stage_started(&self, _stage: InstallStage) {}
    fn on_retry_attempt(&self, _url: &str, _attempt: usize, _max_attempts: usize, _delay: Duration) {}
    fn on_warning(&self, _message: &str) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::Progress { percent } => self.on_progress(percent),
            ProgressEvent::StageStarted { stage } => self.on_stage_started(stage),
            ProgressEvent::RetryAttempt { url, attempt, max_attempts, delay } => {
                self.on_retry_attempt(&url, attempt, max_attempts, delay);
            }
            ProgressEvent::Warning { message } => self.on_warning(&message),
        })
    }
}

/// Simple console progress reporter implementation
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_progress(&self, percent: u8) {
        use std::io::Write;
        print!("\rProgress: {}% ", percent.min(100));
        let _ = std::io::stdout().flush();
    }

    fn on_stage_started(&self, stage: InstallStage) {
        if self.verbose {
            println!("\n==> {}", stage);
        }
    }

    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize, delay: Duration) {
        println!(
            "\nAttempt {}/{} for {} failed, retrying in {:.1}s",
            attempt,
            max_attempts,
            url,
            delay.as_secs_f64()
        );
    }

    fn on_warning(&self, message: &str) {
        eprintln!("\nWarning: {}", message);
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}

/// Composite progress reporter that forwards events to multiple reporters
#[derive(Default)]
pub struct CompositeProgressReporter {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for CompositeProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProgressReporter")
            .field("reporters_count", &self.reporters.len())
            .finish()
    }
}

impl CompositeProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl ProgressReporter for CompositeProgressReporter {
    fn on_progress(&self, percent: u8) {
        for reporter in &self.reporters {
            reporter.on_progress(percent);
        }
    }

    fn on_stage_started(&self, stage: InstallStage) {
        for reporter in &self.reporters {
            reporter.on_stage_started(stage);
        }
    }

    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize, delay: Duration) {
        for reporter in &self.reporters {
            reporter.on_retry_attempt(url, attempt, max_attempts, delay);
        }
    }

    fn on_warning(&self, message: &str) {
        for reporter in &self.reporters {
            reporter.on_warning(message);
        }
    }
}

/// Range of the overall 0-100 scale assigned to one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSpan {
    pub start: u8,
    pub end: u8,
}

impl ProgressSpan {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Map `done / total` linearly onto this span
    pub fn scale(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.start;
        }
        let fraction = (done.min(total) as f64) / (total as f64);
        let width = f64::from(self.end.saturating_sub(self.start));
        self.start.saturating_add((fraction * width) as u8)
    }
}

/// Cheap handle the pipeline stages report through
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

impl ProgressSink {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    pub fn report(&self, percent: u8) {
        self.emit(ProgressEvent::Progress { percent: percent.min(100) });
    }

    pub fn stage(&self, stage: InstallStage) {
        self.emit(ProgressEvent::StageStarted { stage });
    }

    pub fn retry(&self, url: &str, attempt: usize, max_attempts: usize, delay: Duration) {
        self.emit(ProgressEvent::RetryAttempt {
            url: url.to_string(),
            attempt,
            max_attempts,
            delay,
        });
    }

    pub fn warning<S: Into<String>>(&self, message: S) {
        self.emit(ProgressEvent::Warning { message: message.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn span_scales_linearly_and_saturates() {
        let span = ProgressSpan::new(40, 45);
        assert_eq!(span.scale(0, 100), 40);
        assert_eq!(span.scale(50, 100), 42);
        assert_eq!(span.scale(100, 100), 45);
        assert_eq!(span.scale(500, 100), 45);
        assert_eq!(span.scale(10, 0), 40);
    }

    #[test]
    fn sink_clamps_percent_to_hundred() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = ProgressSink::new(Some(Arc::new(move |event| {
            captured.lock().unwrap().push(event);
        })));

        sink.report(110);
        sink.report(55);

        let events = seen.lock().unwrap();
        assert_eq!(events[0], ProgressEvent::Progress { percent: 100 });
        assert_eq!(events[1], ProgressEvent::Progress { percent: 55 });
    }

    #[test]
    fn composite_forwards_to_every_reporter() {
        #[derive(Default)]
        struct Counter(Arc<Mutex<usize>>);
        impl ProgressReporter for Counter {
            fn on_warning(&self, _message: &str) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let hits = Arc::new(Mutex::new(0));
        let callback = CompositeProgressReporter::new()
            .add_reporter(Counter(hits.clone()))
            .add_reporter(Counter(hits.clone()))
            .add_reporter(NullProgressReporter)
            .into_callback();

        callback(ProgressEvent::Warning { message: "lighting skipped".to_string() });
        assert_eq!(*hits.lock().unwrap(), 2);
    }
}
