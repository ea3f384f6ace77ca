use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use crate::error::{MediaError, MediaResult};

/// Lines kept from stderr when a tool fails while being consumed as events
const STDERR_TAIL_LINES: usize = 20;

/// Raw output of a running tool
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Final event; `None` when the process was terminated by a signal
    Exited(Option<i32>),
}

/// Structured events parsed from ffmpeg's status output
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    DurationDetected(f64),
    Progress(f64),
    Completed(i32),
}

/// Result from running a tool to completion
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns external media tools and streams their output
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }

    /// Spawn `tool` with `args`, piping stdout and stderr line by line
    ///
    /// The child is killed when the returned handle is dropped.
    pub fn spawn(&self, tool: &Path, args: &[String]) -> MediaResult<RunningProcess> {
        let tool_name = tool.display().to_string();
        debug!("Executing: {} {}", tool_name, args.join(" "));

        let mut cmd = Command::new(tool);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                MediaError::ToolUnavailable(format!("{}: {}", tool_name, e))
            }
            _ => MediaError::Io(e),
        })?;

        let stdout = child.stdout.take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Failed to capture tool stdout"))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Failed to capture tool stderr"))?;

        let (tx, rx) = mpsc::channel(1024);
        forward_lines(stdout, tx.clone(), ProcessEvent::Stdout);
        forward_lines(stderr, tx, ProcessEvent::Stderr);

        Ok(RunningProcess {
            tool: tool_name,
            child,
            events: rx,
            exited: false,
        })
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<ProcessEvent>, wrap: fn(String) -> ProcessEvent)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(wrap(line)).await.is_err() {
                break;
            }
        }
    });
}

/// Handle to one spawned tool process
pub struct RunningProcess {
    tool: String,
    child: Child,
    events: mpsc::Receiver<ProcessEvent>,
    exited: bool,
}

impl RunningProcess {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Next output line, then a single `Exited`, then `None`
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.exited {
            return None;
        }
        if let Some(event) = self.events.recv().await {
            return Some(event);
        }

        // Both pipes closed: the process is gone or about to be
        self.exited = true;
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for {}: {}", self.tool, e);
                None
            }
        };
        Some(ProcessEvent::Exited(code))
    }

    /// Kill the process; pending output still drains through `next_event`
    pub fn cancel(&mut self) -> MediaResult<()> {
        if self.exited {
            return Ok(());
        }
        debug!("Cancelling {}", self.tool);
        self.child.start_kill()?;
        Ok(())
    }

    /// Drain all output and wait for exit, killing the process if `limit` elapses
    pub async fn wait_with_output(mut self, limit: Option<Duration>) -> MediaResult<ProcessOutput> {
        let Some(limit) = limit else {
            return self.collect().await;
        };

        let result = tokio::time::timeout(limit, self.collect()).await;
        match result {
            Ok(output) => output,
            Err(_) => {
                let _ = self.child.kill().await;
                Err(MediaError::ToolTimedOut {
                    tool: self.tool.clone(),
                    secs: limit.as_secs(),
                })
            }
        }
    }

    async fn collect(&mut self) -> MediaResult<ProcessOutput> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(event) = self.next_event().await {
            match event {
                ProcessEvent::Stdout(line) => stdout.push(line),
                ProcessEvent::Stderr(line) => stderr.push(line),
                ProcessEvent::Exited(code) => exit_code = code,
            }
        }

        let output = ProcessOutput {
            exit_code: exit_code.unwrap_or(-1),
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
        };

        if output.exit_code != 0 {
            return Err(MediaError::ToolFailed {
                tool: self.tool.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    /// Convert the raw output into a channel of parsed `ToolEvent`s
    ///
    /// The channel ends after `Completed(0)`, or with an `Err(ToolFailed)` item on a
    /// non-zero exit. Dropping the receiver kills the process.
    pub fn tool_events(mut self) -> mpsc::Receiver<MediaResult<ToolEvent>> {
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut parser = ProgressParser::default();
            let mut stderr_tail: Vec<String> = Vec::new();

            loop {
                let event = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Consumer of {} went away, killing process", self.tool);
                        let _ = self.cancel();
                        return;
                    }
                    event = self.next_event() => event,
                };
                let Some(event) = event else { return };

                let parsed = match event {
                    ProcessEvent::Stdout(line) => parser.parse_line(&line),
                    ProcessEvent::Stderr(line) => {
                        let parsed = parser.parse_line(&line);
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.remove(0);
                        }
                        stderr_tail.push(line);
                        parsed
                    }
                    ProcessEvent::Exited(code) => {
                        let code = code.unwrap_or(-1);
                        let last = if code == 0 {
                            Ok(ToolEvent::Completed(0))
                        } else {
                            Err(MediaError::ToolFailed {
                                tool: self.tool.clone(),
                                exit_code: code,
                                stderr: stderr_tail.join("\n"),
                            })
                        };
                        let _ = tx.send(last).await;
                        return;
                    }
                };

                if let Some(event) = parsed {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }
}

/// Parses ffmpeg banner and progress lines into `ToolEvent`s
#[derive(Debug, Default)]
pub struct ProgressParser {
    total_secs: Option<f64>,
}

impl ProgressParser {
    pub fn parse_line(&mut self, line: &str) -> Option<ToolEvent> {
        let line = line.trim();

        // "Duration: 00:01:02.50, start: 0.000000, bitrate: 512 kb/s"
        if let Some(rest) = line.strip_prefix("Duration:") {
            let secs = parse_clock(rest.split(',').next()?)?;
            if secs <= 0.0 {
                return None;
            }
            self.total_secs = Some(secs);
            return Some(ToolEvent::DurationDetected(secs));
        }

        // "-progress" key/value output, or the classic "time=" status line
        let elapsed = if let Some(value) = line.strip_prefix("out_time=") {
            parse_clock(value)?
        } else {
            let idx = line.find("time=")?;
            parse_clock(line[idx + 5..].split_whitespace().next()?)?
        };

        let total = self.total_secs?;
        Some(ToolEvent::Progress((elapsed / total * 100.0).clamp(0.0, 100.0)))
    }
}

/// Parse `HH:MM:SS.ss`, `MM:SS.ss` or a bare number of seconds
pub fn parse_clock(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parts: Vec<&str> = value.split(':').collect();
    let secs = match parts.as_slice() {
        [s] => s.parse::<f64>().ok()?,
        [m, s] => m.parse::<f64>().ok()? * 60.0 + s.parse::<f64>().ok()?,
        [h, m, s] => {
            h.parse::<f64>().ok()? * 3600.0 + m.parse::<f64>().ok()? * 60.0 + s.parse::<f64>().ok()?
        }
        _ => return None,
    };

    secs.is_finite().then_some(secs)
}
