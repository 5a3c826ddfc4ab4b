//! Child process helpers: live-streamed shell commands for plan steps, and
//! bounded, timed capture for the planner process.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Verdict of a streamed command. Output is delivered through the sink, not
/// returned here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Runs one shell command for a `command` step.
pub trait CommandRunner {
    /// Run `command` through a shell in `cwd`, feeding stdout and stderr text
    /// to `on_data` as it arrives.
    ///
    /// A non-zero exit is a normal `Ok` result with `success = false`. `Err`
    /// is reserved for commands that could not be started at all; the reason
    /// is also written to `on_data` before returning.
    fn run(
        &self,
        command: &str,
        cwd: &Path,
        on_data: &mut dyn FnMut(&str),
    ) -> Result<CommandResult>;
}

/// Runs commands through the host shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    #[instrument(skip_all, fields(cwd = %cwd.display()))]
    fn run(
        &self,
        command: &str,
        cwd: &Path,
        on_data: &mut dyn FnMut(&str),
    ) -> Result<CommandResult> {
        let mut cmd = shell_command(command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        run_streaming(cmd, on_data)
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Spawn `cmd` (with piped stdout/stderr) and forward its output to `on_data`
/// until both pipes close.
///
/// Each pipe is drained on its own thread and forwarded over a channel, so the
/// sink always runs on the calling thread.
pub fn run_streaming(mut cmd: Command, on_data: &mut dyn FnMut(&str)) -> Result<CommandResult> {
    debug!("spawning streamed child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            on_data(&format!("[failed to start command: {e}]\n"));
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel::<String>();
    let stderr_tx = tx.clone();
    let stdout_handle = thread::spawn(move || forward_stream(stdout, tx));
    let stderr_handle = thread::spawn(move || forward_stream(stderr, stderr_tx));

    // Ends once both reader threads have dropped their senders.
    for chunk in rx {
        on_data(&chunk);
    }

    let status = child.wait().context("wait for command")?;
    for (label, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(stream = label, err = %err, "output reader failed"),
            Err(_) => warn!(stream = label, "output reader thread panicked"),
        }
    }

    let result = CommandResult {
        success: status.success(),
        exit_code: status.code(),
    };
    if !result.success {
        on_data(&exit_trailer(&status));
    }
    debug!(exit_code = ?result.exit_code, "command finished");
    Ok(result)
}

fn exit_trailer(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("\n[process exited with code {code}]\n"),
        None => "\n[process terminated by signal]\n".to_string(),
    }
}

/// Read `reader` to EOF, sending decoded text chunks to `tx`.
///
/// Multi-byte characters split across reads are held back until complete.
fn forward_stream<R: Read>(mut reader: R, tx: mpsc::Sender<String>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);
        let text = take_utf8_prefix(&mut pending);
        // A closed receiver means the caller stopped listening; keep draining
        // so the child never blocks on a full pipe.
        if !text.is_empty() {
            let _ = tx.send(text);
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
    Ok(())
}

/// Remove and return the longest decodable prefix of `pending`.
///
/// An incomplete sequence at the very end stays in `pending`; invalid bytes
/// elsewhere are replaced with U+FFFD.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut consumed = 0;
    loop {
        let rest = &pending[consumed..];
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                consumed = pending.len();
                break;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&rest[..valid]));
                consumed += valid;
                match err.error_len() {
                    Some(bad) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        consumed += bad;
                    }
                    None => break,
                }
            }
        }
    }
    pending.drain(..consumed);
    text
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        match child_stdin.write_all(input) {
            Ok(()) => {}
            // The child exited without reading; its status tells the story.
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                warn!("child closed stdin before reading all input");
            }
            Err(err) => return Err(err).context("write stdin"),
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
