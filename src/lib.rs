pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod request;
pub mod runner;
pub mod staging;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, OutputConfig, StagingConfig, ToolConfig};
pub use error::{Result, TablextractError, UserFriendlyError};

// Core functionality re-exports
pub use report::ExtractionReport;
pub use request::ExtractionRequest;
pub use runner::{CommandSpec, ExtractionResult, ExtractionStatus, ProcessRunner, RunnerEvent};
pub use staging::{LogStager, OverwritePrompt, StagedLog};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use ui::progress::{clear_progress, update_extraction_progress};
use ui::{AssumeYes, TerminalPrompt};

/// What to extract and how to treat an existing staged copy.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub log_file: PathBuf,
    pub table: String,
    pub output: Option<PathBuf>,
    pub force: bool,
    pub no_copy: bool,
}

impl ExtractionOptions {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let log_file = cli.log_file.clone().ok_or_else(|| TablextractError::InvalidPath {
            path: "no log file given".to_string(),
        })?;

        Ok(Self {
            log_file,
            table: cli.table_name().to_string(),
            output: cli.output.clone(),
            force: cli.force,
            no_copy: cli.no_copy,
        })
    }
}

/// Result of driving the tool once, before it is turned into a report.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: ExtractionResult,
    pub last_progress: Option<u8>,
    pub duration: Duration,
}

/// Staged path and command line a run would use, without side effects.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub request: ExtractionRequest,
    pub would_overwrite: bool,
}

/// Main library interface: stage a log, run the tool, report.
pub struct Tablextract {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
    runner: ProcessRunner,
}

impl Tablextract {
    /// Create an instance with Ctrl+C handling installed.
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self::with_shutdown(config, output_mode, verbose, quiet, GracefulShutdown::default())
    }

    pub fn with_shutdown(
        config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
        shutdown: GracefulShutdown,
    ) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        // Bars would interleave with JSON lines on stdout
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let runner = ProcessRunner::from_config(&config.tool);

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            runner,
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(
            config,
            output_mode,
            cli_args.verbose,
            cli_args.quiet,
        ))
    }

    /// Stage the log, run the extraction tool and build the report.
    ///
    /// A tool that runs but fails still yields `Ok` with a failed report;
    /// `Err` covers everything that prevented the run.
    pub async fn extract_table(&self, options: &ExtractionOptions) -> Result<ExtractionReport> {
        self.shutdown.check_shutdown()?;

        // Reject a bad table name before anything is copied
        let table = request::validate_table_name(&options.table)?;

        let staged = self.stage_log(&options.log_file, options.force, options.no_copy)?;
        self.shutdown.check_shutdown()?;

        let request = self.build_request(&options.log_file, &staged, &table, options.output.as_deref())?;

        self.output_formatter
            .start_operation(&format!("Extracting {}", request.qualified_table));
        self.output_formatter
            .info(&format!("Running: {}", request.command().display()));

        let outcome = self.run_extraction(&request).await?;

        Ok(ExtractionReport::new(
            &request,
            &staged,
            &outcome.result,
            outcome.last_progress,
            outcome.duration,
        ))
    }

    /// Copy the log into the tool directory, asking before replacing an existing copy.
    pub fn stage_log(&self, log_file: &Path, force: bool, no_copy: bool) -> Result<StagedLog> {
        let stager = LogStager::from_config(&self.config.tool.install_dir, &self.config.staging);

        if no_copy {
            let staged = stager.existing(log_file)?;
            self.output_formatter
                .info(&format!("Using staged log {}", staged.path.display()));
            return Ok(staged);
        }

        self.output_formatter.start_operation("Copying log file");
        let spinner = self.progress_manager.create_spinner("Copying log file...");

        let staged = if force {
            stager.stage(log_file, &AssumeYes)
        } else {
            let prompt = TerminalPrompt::new();
            self.progress_manager.suspend(|| stager.stage(log_file, &prompt))
        };
        spinner.finish_and_clear();
        let staged = staged?;

        self.output_formatter
            .success(&format!("Log file copied to {}", staged.path.display()));

        Ok(staged)
    }

    pub fn build_request(
        &self,
        log_file: &Path,
        staged: &StagedLog,
        table: &str,
        output: Option<&Path>,
    ) -> Result<ExtractionRequest> {
        ExtractionRequest::new(
            log_file,
            &staged.path,
            table,
            output,
            &self.config.output.directory,
            &self.config.tool,
        )
    }

    /// Run the tool on a background task and render its progress until it finishes.
    pub async fn run_extraction(&self, request: &ExtractionRequest) -> Result<RunOutcome> {
        self.shutdown.check_shutdown()?;

        let start = Instant::now();
        let mut worker = self.runner.spawn(request.command())?;
        let pb = self.progress_manager.create_extraction_progress(&request.table);
        let mut last_progress = None;
        let mut shutdown_tick = tokio::time::interval(Duration::from_millis(100));

        let result = loop {
            let event = tokio::select! {
                event = worker.recv() => Some(event),
                _ = shutdown_tick.tick() => None,
            };

            match event {
                Some(Some(RunnerEvent::Finished(result))) => break result,
                Some(Some(event)) => {
                    match &event {
                        RunnerEvent::Progress(percent) => last_progress = Some(*percent),
                        RunnerEvent::Output(line) => self
                            .progress_manager
                            .suspend(|| self.output_formatter.tool_output(line)),
                        RunnerEvent::Finished(_) => {}
                    }
                    update_extraction_progress(&pb, &event);
                }
                Some(None) => {
                    break ExtractionResult::failure(None, "extraction worker stopped without a result")
                }
                None if !self.shutdown.is_running() => {
                    // Returns only once the child has been killed
                    worker.cancel().await;
                    clear_progress(&pb);
                    return Err(TablextractError::Cancelled);
                }
                None => {}
            }
        };

        clear_progress(&pb);

        let duration = start.elapsed();
        tracing::info!(
            success = result.is_success(),
            exit_code = ?result.exit_code,
            elapsed_ms = duration.as_millis() as u64,
            "extraction finished"
        );

        Ok(RunOutcome {
            result,
            last_progress,
            duration,
        })
    }

    /// Resolve everything a run would use without copying or executing anything.
    pub fn plan_extraction(&self, options: &ExtractionOptions) -> Result<ExtractionPlan> {
        let table = request::validate_table_name(&options.table)?;
        let stager = LogStager::from_config(&self.config.tool.install_dir, &self.config.staging);
        let staged_path = stager.staged_path(&options.log_file)?;

        if !options.no_copy && !options.log_file.is_file() {
            return Err(TablextractError::SourceNotFound {
                path: options.log_file.display().to_string(),
            });
        }

        let staged = StagedLog {
            source: options.log_file.clone(),
            path: staged_path.clone(),
            bytes_copied: 0,
            replaced_existing: false,
        };
        let request = self.build_request(&options.log_file, &staged, &table, options.output.as_deref())?;

        Ok(ExtractionPlan {
            request,
            would_overwrite: !options.no_copy && staged_path.exists(),
        })
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &TablextractError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn app(tool_dir: &Path, output_dir: &Path) -> Tablextract {
        let mut config = Config::default();
        config.tool.install_dir = tool_dir.to_path_buf();
        config.output.directory = output_dir.to_path_buf();
        Tablextract::with_shutdown(config, OutputMode::Plain, 0, true, GracefulShutdown::new_for_test())
    }

    fn options(log_file: PathBuf, table: &str) -> ExtractionOptions {
        ExtractionOptions {
            log_file,
            table: table.to_string(),
            output: None,
            force: false,
            no_copy: false,
        }
    }

    #[test]
    fn test_plan_extraction() {
        let tool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let log = out_dir.path().join("backup.log");
        fs::write(&log, "x").unwrap();
        fs::write(tool_dir.path().join("backup.log"), "old").unwrap();

        let app = app(tool_dir.path(), out_dir.path());
        let plan = app.plan_extraction(&options(log, "orders")).unwrap();

        assert!(plan.would_overwrite);
        assert_eq!(plan.request.staged_path, tool_dir.path().join("backup.log"));
        assert_eq!(plan.request.output_path, out_dir.path().join("orders.txt"));
        assert_eq!(
            fs::read_to_string(tool_dir.path().join("backup.log")).unwrap(),
            "old"
        );
    }

    #[tokio::test]
    async fn test_missing_table_name_copies_nothing() {
        let tool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let log = out_dir.path().join("backup.log");
        fs::write(&log, "x").unwrap();

        let app = app(tool_dir.path(), out_dir.path());
        let result = app.extract_table(&options(log, "  ")).await;

        assert!(matches!(result, Err(TablextractError::MissingTableName)));
        assert!(!tool_dir.path().join("backup.log").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let tool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let app = app(tool_dir.path(), out_dir.path());

        app.request_shutdown();

        let result = app
            .extract_table(&options(out_dir.path().join("backup.log"), "orders"))
            .await;
        assert!(matches!(result, Err(TablextractError::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_end_to_end_with_fake_tool() {
        use std::os::unix::fs::PermissionsExt;

        let tool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let log = out_dir.path().join("backup.log");
        fs::write(&log, "log data").unwrap();

        // Stand-in for dbtran: checks its arguments and working directory, writes the export
        let script = tool_dir.path().join("dbtran");
        fs::write(
            &script,
            "#!/bin/sh\n\
             [ -f \"$3\" ] || { echo \"missing $3\" >&2; exit 2; }\n\
             echo '50% complete'\n\
             echo \"$5\" > \"$7\"\n\
             echo '100% complete'\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let app = app(tool_dir.path(), out_dir.path());
        let report = app.extract_table(&options(log, "orders")).await.unwrap();

        assert!(report.is_success(), "output: {}", report.output);
        assert_eq!(report.last_progress, Some(100));
        assert_eq!(
            fs::read_to_string(out_dir.path().join("orders.txt")).unwrap(),
            "dba.orders\n"
        );
        assert_eq!(
            fs::read_to_string(tool_dir.path().join("backup.log")).unwrap(),
            "log data"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_kills_running_tool() {
        use std::os::unix::fs::PermissionsExt;

        let tool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let log = out_dir.path().join("backup.log");
        fs::write(&log, "log data").unwrap();

        let script = tool_dir.path().join("dbtran");
        fs::write(&script, "#!/bin/sh\necho $$ > child.pid\nexec sleep 30\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let app = app(tool_dir.path(), out_dir.path());
        let pid_file = tool_dir.path().join("child.pid");
        let read_pid = || {
            fs::read_to_string(&pid_file)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        let stop = async {
            for _ in 0..250 {
                if !read_pid().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            app.request_shutdown();
        };
        let opts = options(log, "orders");
        let (result, ()) = tokio::join!(app.extract_table(&opts), stop);

        assert!(matches!(result, Err(TablextractError::Cancelled)));

        let pid = read_pid();
        assert!(!pid.is_empty(), "tool never started");
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid])
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "tool process {} outlived the cancelled run", pid);
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        Tablextract::generate_sample_config(&config_path).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[tool]"));
        assert!(content.contains("[staging]"));
    }
}
