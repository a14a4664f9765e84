use crate::request::ExtractionRequest;
use crate::runner::{ExtractionResult, ExtractionStatus};
use crate::staging::StagedLog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub table: String,
    pub qualified_table: String,
    pub source: PathBuf,
    pub staged_path: PathBuf,
    pub replaced_existing: bool,
    pub output_path: PathBuf,
    pub command: String,
    pub status: ExtractionStatus,
    pub exit_code: Option<i32>,
    /// Whether the tool process ran at all.
    pub tool_started: bool,
    pub last_progress: Option<u8>,
    pub output_lines: usize,
    pub duration: Duration,
    pub extraction_time: DateTime<Utc>,
    /// Tool output on success, error text on failure.
    pub output: String,
}

impl ExtractionReport {
    pub fn new(
        request: &ExtractionRequest,
        staged: &StagedLog,
        result: &ExtractionResult,
        last_progress: Option<u8>,
        duration: Duration,
    ) -> Self {
        Self {
            table: request.table.clone(),
            qualified_table: request.qualified_table.clone(),
            source: request.source.clone(),
            staged_path: staged.path.clone(),
            replaced_existing: staged.replaced_existing,
            output_path: request.output_path.clone(),
            command: request.command().display(),
            status: result.status,
            exit_code: result.exit_code,
            tool_started: result.started,
            last_progress,
            output_lines: result.output.lines().count(),
            duration,
            extraction_time: Utc::now(),
            output: result.output.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_report_from_result() {
        let dir = TempDir::new().unwrap();
        let tool = ToolConfig {
            install_dir: dir.path().to_path_buf(),
            ..ToolConfig::default()
        };
        let staged = StagedLog {
            source: PathBuf::from("/logs/backup.log"),
            path: dir.path().join("backup.log"),
            bytes_copied: 10,
            replaced_existing: true,
        };
        let request = ExtractionRequest::new(
            &staged.source,
            &staged.path,
            "orders",
            None,
            dir.path(),
            &tool,
        )
        .unwrap();
        let result = ExtractionResult::success(Some(0), "50% complete\n100% complete\n".to_string());

        let report = ExtractionReport::new(&request, &staged, &result, Some(100), Duration::from_secs(2));

        assert!(report.is_success());
        assert_eq!(report.qualified_table, "dba.orders");
        assert_eq!(report.output_lines, 2);
        assert!(report.replaced_existing);
        assert!(report.command.contains("-it dba.orders"));
        assert_eq!(report.output_path, Path::new(dir.path()).join("orders.txt"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["last_progress"], 100);
        assert_eq!(json["tool_started"], true);
    }
}
