use crate::config::ToolConfig;
use crate::error::{Result, TablextractError};
use crate::runner::scanner::{Markers, OutputScanner, ScanEvent};
use crate::runner::{ExtractionResult, RunnerEvent};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 4096;

/// Program, arguments and working directory of a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Run `command` through the platform shell.
    pub fn shell(command: &str) -> Self {
        #[cfg(windows)]
        {
            Self::new("cmd").arg("/C").arg(command)
        }
        #[cfg(not(windows))]
        {
            Self::new("sh").arg("-c").arg(command)
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Human-readable command line, quoting arguments that contain spaces.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Drives a child process and interprets its stdout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    markers: Markers,
    confirm_response: String,
    in_flight: Arc<AtomicBool>,
}

impl ProcessRunner {
    pub fn new<S: Into<String>>(confirm_prompt: S, confirm_response: S, progress_marker: S) -> Self {
        Self {
            markers: Markers::new(confirm_prompt, progress_marker),
            confirm_response: confirm_response.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(tool: &ToolConfig) -> Self {
        Self::new(
            tool.confirm_prompt.as_str(),
            tool.confirm_response.as_str(),
            tool.progress_marker.as_str(),
        )
    }

    /// Run the command to completion, forwarding output and progress on `events`.
    ///
    /// A nonzero exit is not an error here: it comes back as a failed
    /// [`ExtractionResult`]. `Err` means the process could not be driven at all.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        events: &UnboundedSender<RunnerEvent>,
    ) -> Result<ExtractionResult> {
        self.run_until(spec, events, std::future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), but once `cancel` completes the child is
    /// killed and reaped, and `Cancelled` is returned.
    pub async fn run_until<F>(
        &self,
        spec: &CommandSpec,
        events: &UnboundedSender<RunnerEvent>,
        cancel: F,
    ) -> Result<ExtractionResult>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let program = spec.program.display().to_string();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        tracing::info!(command = %spec.display(), "starting extraction tool");

        let mut child = cmd.spawn().map_err(|e| TablextractError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let mut stdin = child.stdin.take();
        let mut stdout = child.stdout.take().ok_or_else(|| TablextractError::Spawn {
            program: program.clone(),
            message: "stdout was not captured".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| TablextractError::Spawn {
            program: program.clone(),
            message: "stderr was not captured".to_string(),
        })?;

        // Drain stderr concurrently; a full stderr pipe would stall the child
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::warn!("stderr pipe read error: {e}");
            }
            buf
        });

        let mut scanner = OutputScanner::new(self.markers.clone());
        let mut captured = String::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                read = stdout.read(&mut chunk) => Some(read),
                () = &mut cancel => None,
            };
            let Some(read) = read else {
                return Err(kill_child(&mut child, &program).await);
            };
            let read = read?;
            let scanned = if read == 0 {
                scanner.finish()
            } else {
                scanner.feed(&chunk[..read])
            };

            for event in scanned {
                self.handle_event(event, &mut stdin, &mut captured, events)
                    .await;
            }

            if read == 0 {
                break;
            }
        }

        // Closing stdin lets a child still waiting on input terminate
        drop(stdin);

        let status = tokio::select! {
            status = child.wait() => Some(status),
            () = &mut cancel => None,
        };
        let Some(status) = status else {
            return Err(kill_child(&mut child, &program).await);
        };
        let status = status?;
        let stderr_raw = stderr_task.await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr_raw).into_owned();

        Ok(build_result(status, captured, stderr_text))
    }

    async fn handle_event(
        &self,
        event: ScanEvent,
        stdin: &mut Option<ChildStdin>,
        captured: &mut String,
        events: &UnboundedSender<RunnerEvent>,
    ) {
        match event {
            ScanEvent::Line(line) => {
                tracing::debug!(target: "tablextract::tool", "{line}");
                captured.push_str(&line);
                captured.push('\n');
                let _ = events.send(RunnerEvent::Output(line));
            }
            ScanEvent::Confirm => {
                let Some(pipe) = stdin.as_mut() else {
                    return;
                };
                let answer = format!("{}\n", self.confirm_response);
                let written = match pipe.write_all(answer.as_bytes()).await {
                    Ok(()) => pipe.flush().await,
                    Err(e) => Err(e),
                };
                match written {
                    Ok(()) => tracing::info!(response = %self.confirm_response, "answered confirmation prompt"),
                    Err(e) => {
                        tracing::warn!("could not answer confirmation prompt: {e}");
                        *stdin = None;
                    }
                }
            }
            ScanEvent::Progress(percent) => {
                tracing::trace!(percent, "progress");
                let _ = events.send(RunnerEvent::Progress(percent));
            }
        }
    }

    /// Start the command on a background task.
    ///
    /// Only one extraction per runner may be in flight; the slot is released
    /// when the task finishes or the worker is dropped.
    pub fn spawn(&self, spec: CommandSpec) -> Result<ExtractionWorker> {
        let slot = InFlightSlot::acquire(&self.in_flight)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let runner = self.clone();

        let handle = tokio::spawn(async move {
            let _slot = slot;
            // Resolves on an explicit cancel and when the worker handle is dropped
            let cancelled = async {
                let _ = cancel_rx.await;
            };
            let result = match runner.run_until(&spec, &tx, cancelled).await {
                Ok(result) => result,
                Err(TablextractError::Cancelled) => {
                    tracing::info!("extraction cancelled");
                    return;
                }
                Err(e @ TablextractError::Spawn { .. }) => {
                    tracing::error!("extraction worker failed: {e}");
                    ExtractionResult::not_started(e.to_string())
                }
                Err(e) => {
                    tracing::error!("extraction worker failed: {e}");
                    ExtractionResult::failure(None, e.to_string())
                }
            };
            let _ = tx.send(RunnerEvent::Finished(result));
        });

        Ok(ExtractionWorker {
            events: rx,
            cancel: Some(cancel_tx),
            handle,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

fn build_result(status: ExitStatus, stdout: String, stderr: String) -> ExtractionResult {
    let code = status.code();

    if status.success() {
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr, "extraction tool stderr output");
        }
        return ExtractionResult::success(code, stdout);
    }

    tracing::warn!(code = ?code, "extraction tool failed");

    let message = if !stderr.trim().is_empty() {
        stderr
    } else if !stdout.trim().is_empty() {
        stdout
    } else {
        match code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by a signal".to_string(),
        }
    };

    ExtractionResult::failure(code, message)
}

async fn kill_child(child: &mut Child, program: &str) -> TablextractError {
    // kill() also waits, so the process is gone once this returns
    match child.kill().await {
        Ok(()) => tracing::info!(program, "extraction tool killed"),
        Err(e) => tracing::warn!("could not kill {program}: {e}"),
    }
    TablextractError::Cancelled
}

struct InFlightSlot(Arc<AtomicBool>);

impl InFlightSlot {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TablextractError::ExtractionInProgress)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle on a running extraction. Dropping it aborts the run and kills the child.
pub struct ExtractionWorker {
    events: UnboundedReceiver<RunnerEvent>,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ExtractionWorker {
    pub async fn recv(&mut self) -> Option<RunnerEvent> {
        self.events.recv().await
    }

    /// Kill the child and wait until the worker has finished.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                tracing::warn!("extraction worker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for ExtractionWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `<dir>/<name>` if the tool lives there, otherwise the bare name for a `PATH` lookup.
pub fn resolve_executable(dir: &Path, name: &str) -> PathBuf {
    let candidates = [
        dir.join(name),
        dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX)),
    ];

    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}
