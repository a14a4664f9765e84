pub mod process;
pub mod scanner;

pub use process::{CommandSpec, ExtractionWorker, ProcessRunner};
pub use scanner::{Markers, OutputScanner, ScanEvent};

use serde::Serialize;

/// Notification sent from the extraction worker to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Output(String),
    Progress(u8),
    Finished(ExtractionResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub exit_code: Option<i32>,
    /// False when the tool never ran (spawn or pipe failure).
    pub started: bool,
    /// Captured stdout on success, error text on failure.
    pub output: String,
}

impl ExtractionResult {
    pub fn success(exit_code: Option<i32>, stdout: String) -> Self {
        Self {
            status: ExtractionStatus::Success,
            exit_code,
            started: true,
            output: stdout,
        }
    }

    /// The tool ran and failed. `exit_code` is `None` when it was killed by a signal.
    pub fn failure<S: Into<String>>(exit_code: Option<i32>, message: S) -> Self {
        Self {
            status: ExtractionStatus::Failure,
            exit_code,
            started: true,
            output: message.into(),
        }
    }

    /// The tool could not be driven at all.
    pub fn not_started<S: Into<String>>(message: S) -> Self {
        Self {
            status: ExtractionStatus::Failure,
            exit_code: None,
            started: false,
            output: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Success
    }
}
