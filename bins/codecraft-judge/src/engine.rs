/// Execution Engine - Abstraction for Sandboxed Execution
///
/// **Core Responsibility:**
/// Run one command against one input inside a private working directory and
/// report what happened: output, exit code, time, memory, limit violations.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (Docker, host process)
/// - Engine does NOT know languages (adapters build the command)
/// - Engine does NOT evaluate correctness (the evaluator does)
///
/// Every invocation is independent. The caller hands in a fresh directory
/// each time and throws it away afterwards.

use async_trait::async_trait;
use codecraft_common::types::{ExecutionOutcome, ResourceLimits};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Name of the file the program's stdin is redirected from.
pub const STDIN_FILE: &str = ".stdin";

#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    /// Container image; ignored by engines that run on the host.
    pub image: &'a str,
    pub argv: &'a [String],
    pub workdir: &'a Path,
    pub stdin: Option<&'a str>,
    pub limits: ResourceLimits,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("execution cancelled")]
    Cancelled,
    /// Infrastructure failure, never the submission's fault.
    #[error("sandbox failure: {0}")]
    Sandbox(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Sandbox(e.to_string())
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        invocation: Invocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError>;
}

/// Write the invocation's input where the run command expects it.
pub async fn write_stdin(workdir: &Path, stdin: Option<&str>) -> Result<(), EngineError> {
    tokio::fs::write(workdir.join(STDIN_FILE), stdin.unwrap_or("")).await?;
    Ok(())
}

/// Output collected up to a byte cap.
#[derive(Debug, Default)]
pub struct CappedOutput {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedOutput {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append bytes; returns false once the cap has been exceeded.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        let room = self.limit.saturating_sub(self.buf.len());
        if bytes.len() > room {
            self.buf.extend_from_slice(&bytes[..room]);
            self.truncated = true;
            return false;
        }
        self.buf.extend_from_slice(bytes);
        true
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> CappedOutput {
    let mut output = CappedOutput::new(limit);
    let Some(mut reader) = reader else {
        return output;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            // Dropping the pipe once over the cap makes further writes fail.
            Ok(n) => {
                if !output.push(&chunk[..n]) {
                    break;
                }
            }
        }
    }
    output
}

// A grandchild that inherited the pipes can keep them open after the direct
// child is killed; stop waiting for it shortly after.
async fn collect_output(
    mut task: tokio::task::JoinHandle<CappedOutput>,
    limit: usize,
) -> Result<CappedOutput, EngineError> {
    match tokio::time::timeout(Duration::from_millis(500), &mut task).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(EngineError::Sandbox(format!("output reader failed: {}", e))),
        Err(_) => {
            task.abort();
            Ok(CappedOutput::new(limit))
        }
    }
}

/// Host-process engine for development machines without Docker.
///
/// Enforces the wall clock and output cap only: no memory ceiling, no
/// filesystem or network isolation. CPU time is reported as wall time and
/// peak memory as zero.
#[derive(Debug, Default)]
pub struct LocalEngine;

enum Ending {
    Exited(std::io::Result<std::process::ExitStatus>),
    WallClock,
    Cancelled,
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(
        &self,
        invocation: Invocation<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| EngineError::Sandbox("empty command".to_string()))?;

        write_stdin(invocation.workdir, invocation.stdin).await?;
        let stdin = std::fs::File::open(invocation.workdir.join(STDIN_FILE))?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(invocation.workdir)
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("HOME", invocation.workdir)
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| EngineError::Sandbox(format!("failed to spawn {}: {}", program, e)))?;

        let limit = invocation.limits.max_output_bytes;
        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), limit));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), limit));

        let wall = Duration::from_millis(invocation.limits.wall_time_ms);
        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(wall) => Ending::WallClock,
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        let (exit_code, timed_out) = match ending {
            Ending::Exited(status) => {
                let status = status?;
                let code = status.code().map(i64::from).or_else(|| {
                    use std::os::unix::process::ExitStatusExt;
                    status.signal().map(|s| 128 + i64::from(s))
                });
                (code, false)
            }
            Ending::WallClock => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill local process");
                }
                (None, true)
            }
            Ending::Cancelled => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill local process");
                }
                return Err(EngineError::Cancelled);
            }
        };
        let wall_time_ms = start.elapsed().as_millis() as u64;

        let stdout = collect_output(stdout_task, limit).await?;
        let stderr = collect_output(stderr_task, limit).await?;

        let output_truncated = stdout.truncated() || stderr.truncated();
        debug!(
            program = %program,
            exit_code = ?exit_code,
            wall_time_ms,
            timed_out,
            output_truncated,
            "Local execution finished"
        );

        Ok(ExecutionOutcome {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code,
            wall_time_ms,
            cpu_time_ms: wall_time_ms,
            peak_memory_kb: 0,
            timed_out,
            oom: false,
            output_truncated,
        })
    }
}
