//! Process runner: spawn a CLI, stream its output, enforce a deadline.
//!
//! One call to [`run`] drives exactly one OS process from spawn to exit.
//! Output is consumed in small chunks and handed to per-stream sinks as it
//! arrives, never buffered whole before delivery, so memory stays bounded
//! for arbitrarily long runs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::options::DEFAULT_TIMEOUT;

const CHUNK_SIZE: usize = 4096;
/// How long a timed-out process gets between SIGTERM and SIGKILL.
#[cfg(unix)]
const GRACE_WINDOW: Duration = Duration::from_millis(2000);

/// Sink receiving raw output chunks from one stream.
pub type ChunkSink = Box<dyn FnMut(&str) + Send>;

/// Options for one process run.
pub struct SpawnOptions {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment entries layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Inherited environment keys to withhold from the child.
    pub env_remove: Vec<String>,
    /// Payload written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
    pub on_stdout: Option<ChunkSink>,
    pub on_stderr: Option<ChunkSink>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            env_remove: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
            on_stdout: None,
            on_stderr: None,
        }
    }
}

/// Captured outcome of a completed process.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, defaulted to 1 when the process died without one.
    pub exit_code: i32,
    pub duration: Duration,
}

enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    StdoutClosed,
    StderrClosed,
}

/// Decode every complete UTF-8 sequence in `carry`, leaving an incomplete
/// trailing sequence in place for the next read. Genuinely invalid bytes
/// become U+FFFD instead of stalling the stream.
fn drain_utf8(carry: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(carry) {
            Ok(text) => {
                out.push_str(text);
                carry.clear();
                return out;
            }
            Err(error) => {
                let valid = error.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&carry[..valid]));
                match error.error_len() {
                    Some(bad) => {
                        out.push('\u{FFFD}');
                        carry.drain(..valid + bad);
                    }
                    None => {
                        // incomplete multibyte tail, completed by the next read
                        carry.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

fn spawn_reader<R>(mut reader: R, tx: mpsc::Sender<ProcessEvent>, is_stdout: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut carry: Vec<u8> = Vec::new();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    carry.extend_from_slice(&buf[..n]);
                    let text = drain_utf8(&mut carry);
                    if text.is_empty() {
                        continue;
                    }
                    let event = if is_stdout {
                        ProcessEvent::Stdout(text)
                    } else {
                        ProcessEvent::Stderr(text)
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
        // whatever is left at EOF can never complete
        if !carry.is_empty() {
            let text = String::from_utf8_lossy(&carry).into_owned();
            let event = if is_stdout {
                ProcessEvent::Stdout(text)
            } else {
                ProcessEvent::Stderr(text)
            };
            let _ = tx.send(event).await;
        }
        let closed = if is_stdout {
            ProcessEvent::StdoutClosed
        } else {
            ProcessEvent::StderrClosed
        };
        let _ = tx.send(closed).await;
    });
}

/// Run `command` to completion under the configured deadline.
///
/// Resolves only after the process has exited and both streams are drained.
/// On deadline expiry the process is terminated gracefully, then killed, and
/// the call fails with a timeout error; no partial result is produced and
/// the sinks are never invoked again.
pub async fn run(command: &str, mut options: SpawnOptions) -> Result<SpawnResult> {
    let start = Instant::now();
    let limit = options.timeout;

    let mut cmd = Command::new(command);
    cmd.args(&options.args)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &options.cwd {
        cmd.current_dir(dir);
    }
    for key in &options.env_remove {
        cmd.env_remove(key);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|error| Error::Execution {
        message: format!("failed to spawn {command}: {error}"),
        stderr: None,
    })?;
    log::debug!("spawned {command} (pid {:?})", child.id());

    if let Some(payload) = options.stdin.take() {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(payload.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }
    }

    let (tx, mut rx) = mpsc::channel(64);
    let mut stdout_closed = match child.stdout.take() {
        Some(stdout) => {
            spawn_reader(stdout, tx.clone(), true);
            false
        }
        None => true,
    };
    let mut stderr_closed = match child.stderr.take() {
        Some(stderr) => {
            spawn_reader(stderr, tx.clone(), false);
            false
        }
        None => true,
    };
    drop(tx);

    let deadline = tokio::time::Instant::now() + limit;
    let mut stdout_acc = String::new();
    let mut stderr_acc = String::new();

    // both streams close when the process exits, so this loop ends then too
    while !(stdout_closed && stderr_closed) {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ProcessEvent::Stdout(chunk)) => {
                    stdout_acc.push_str(&chunk);
                    if let Some(sink) = options.on_stdout.as_mut() {
                        sink(&chunk);
                    }
                }
                Some(ProcessEvent::Stderr(chunk)) => {
                    stderr_acc.push_str(&chunk);
                    if let Some(sink) = options.on_stderr.as_mut() {
                        sink(&chunk);
                    }
                }
                Some(ProcessEvent::StdoutClosed) => stdout_closed = true,
                Some(ProcessEvent::StderrClosed) => stderr_closed = true,
                None => {
                    stdout_closed = true;
                    stderr_closed = true;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                log::warn!("{command} exceeded {} ms, terminating", limit.as_millis());
                terminate(&mut child).await;
                return Err(Error::Timeout {
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }
    }

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(status) => status.map_err(|error| Error::Execution {
            message: format!("failed to wait on {command}: {error}"),
            stderr: Some(stderr_acc.clone()),
        })?,
        Err(_) => {
            log::warn!("{command} exceeded {} ms, terminating", limit.as_millis());
            terminate(&mut child).await;
            return Err(Error::Timeout {
                limit_ms: limit.as_millis() as u64,
            });
        }
    };

    Ok(SpawnResult {
        stdout: stdout_acc,
        stderr: stderr_acc,
        exit_code: status.code().unwrap_or(1),
        duration: start.elapsed(),
    })
}

/// Ask the process to stop, escalating to a kill after the grace window.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(GRACE_WINDOW, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
