//! Pipeline progress reporting.
//!
//! Reports observable progress as an upload moves through extraction,
//! summarization, diagram generation, and artifact resolution. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts; the same
//! event payload doubles as the wire format for the server's streaming
//! endpoint.

use std::io::Write;

use serde::Serialize;

/// Stage of the diagram pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineStage {
    Upload,
    Extract,
    Summarize,
    Generate,
    Resolve,
    Mirror,
    Complete,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Upload => "upload",
            PipelineStage::Extract => "extract",
            PipelineStage::Summarize => "summarize",
            PipelineStage::Generate => "generate",
            PipelineStage::Resolve => "resolve",
            PipelineStage::Mirror => "mirror",
            PipelineStage::Complete => "complete",
        }
    }

    /// Approximate fraction of the pipeline completed when this stage begins.
    pub fn fraction(&self) -> f32 {
        match self {
            PipelineStage::Upload => 0.05,
            PipelineStage::Extract => 0.15,
            PipelineStage::Summarize => 0.30,
            PipelineStage::Generate => 0.55,
            PipelineStage::Resolve => 0.85,
            PipelineStage::Mirror => 0.95,
            PipelineStage::Complete => 1.0,
        }
    }
}

/// One progress event. Serialized as-is on the streaming endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    pub status: &'static str,
    pub message: String,
    pub progress: f32,
    pub timestamp: i64,
}

impl ProgressEvent {
    pub fn stage(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            status: stage.as_str(),
            message: message.into(),
            progress: stage.fraction(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Reports pipeline progress. Implementations write to stderr (human or
/// JSON); the server substitutes a channel-backed reporter.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "[summarize  30%] Summarizing document".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = format!(
            "[{:<9} {:>3.0}%] {}\n",
            event.status,
            event.progress * 100.0,
            event.message
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_progress_monotonically() {
        let stages = [
            PipelineStage::Upload,
            PipelineStage::Extract,
            PipelineStage::Summarize,
            PipelineStage::Generate,
            PipelineStage::Resolve,
            PipelineStage::Mirror,
            PipelineStage::Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].fraction() < pair[1].fraction());
        }
        assert_eq!(PipelineStage::Complete.fraction(), 1.0);
    }

    #[test]
    fn event_serializes_expected_fields() {
        let event = ProgressEvent::stage(PipelineStage::Summarize, "Summarizing document");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "summarize");
        assert_eq!(json["message"], "Summarizing document");
        assert!(json["progress"].as_f64().unwrap() > 0.0);
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }
}
