//! Shell command execution with a bounded, cancellable wait.
//!
//! Every command runs in its own process group (on Unix) with captured
//! output. When a timeout expires the group first receives `SIGTERM`; if it
//! is still alive after the grace period it receives `SIGKILL`.

use crate::error::{ProvisorError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a running child is polled while a deadline is pending.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of executing a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0, not timed out).
    pub success: bool,

    /// Whether the timeout expired and the command was cancelled.
    pub timed_out: bool,
}

impl CommandResult {
    /// Create a success result.
    pub fn success(stdout: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            duration,
            success: true,
            ..Default::default()
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: Option<i32>, stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            duration,
            ..Default::default()
        }
    }

    /// Create a result for a command cancelled after its timeout.
    pub fn timed_out(stdout: impl Into<String>, stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
            timed_out: true,
            ..Default::default()
        }
    }

    /// Stdout and stderr joined, for pattern matching and diagnostics.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with system env).
    pub env: HashMap<String, String>,

    /// Shell executable; `/bin/sh` (or `cmd.exe`) when unset.
    pub shell: Option<String>,

    /// Wall-clock limit (None = wait indefinitely).
    pub timeout: Option<Duration>,

    /// Time between cooperative cancel and forced kill.
    pub grace: Duration,
}

/// Execute a shell command, capturing its output.
///
/// # Errors
///
/// Returns `CommandSpawn` if the shell could not be started. A command that
/// starts and then fails is an `Ok` result with `success == false`.
pub fn execute(command: &str, options: &CommandOptions) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = shell_command(options.shell.as_deref(), command);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&options.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| ProvisorError::CommandSpawn {
        command: command.to_string(),
        message: e.to_string(),
    })?;

    let stdout_rx = child.stdout.take().map(spawn_reader);
    let stderr_rx = child.stderr.take().map(spawn_reader);

    let (status, timed_out) = wait_with_deadline(&mut child, options.timeout, options.grace)?;

    // A timed-out command may have left descendants holding the pipes open;
    // don't block on them forever.
    let collect_limit = timed_out.then_some(options.grace.max(POLL_INTERVAL));
    let stdout = collect(stdout_rx, collect_limit);
    let stderr = collect(stderr_rx, collect_limit);
    let duration = start.elapsed();

    tracing::debug!(
        "Command finished in {:?} (exit={:?}, timed_out={}): {}",
        duration,
        status.code(),
        timed_out,
        command
    );

    if timed_out {
        return Ok(CommandResult::timed_out(stdout, stderr, duration));
    }

    Ok(CommandResult {
        exit_code: status.code(),
        stdout,
        stderr,
        duration,
        success: status.success(),
        timed_out: false,
    })
}

fn shell_command(shell: Option<&str>, command: &str) -> Command {
    let (program, flag) = if cfg!(target_os = "windows") {
        (shell.unwrap_or("cmd.exe"), "/C")
    } else {
        (shell.unwrap_or("/bin/sh"), "-c")
    };
    let mut cmd = Command::new(program);
    cmd.arg(flag).arg(command);
    cmd
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(rx: Option<mpsc::Receiver<String>>, limit: Option<Duration>) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match limit {
        Some(limit) => rx.recv_timeout(limit).unwrap_or_default(),
        None => rx.recv().unwrap_or_default(),
    }
}

/// Wait for `child`, enforcing `timeout` with a cancel-then-kill sequence.
///
/// Returns the exit status and whether the timeout fired.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
    grace: Duration,
) -> Result<(ExitStatus, bool)> {
    // A deadline past what Instant can represent is no deadline at all.
    let Some((timeout, deadline)) =
        timeout.and_then(|t| Instant::now().checked_add(t).map(|d| (t, d)))
    else {
        return Ok((child.wait()?, false));
    };

    if let Some(status) = poll_until(child, deadline)? {
        return Ok((status, false));
    }

    tracing::debug!("Timeout after {:?}, requesting cancellation", timeout);
    request_cancel(child);

    let Some(grace_deadline) = Instant::now().checked_add(grace) else {
        return Ok((child.wait()?, true));
    };
    if let Some(status) = poll_until(child, grace_deadline)? {
        return Ok((status, true));
    }

    tracing::debug!("Still running after {:?} grace period, killing", grace);
    force_kill(child);
    Ok((child.wait()?, true))
}

fn poll_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) with a negative pid signals the process group the
        // child leads (it was spawned with process_group(0)).
        unsafe {
            libc::kill(-pid, signal);
        }
    }
}

#[cfg(unix)]
fn request_cancel(child: &mut Child) {
    signal_group(child, libc::SIGTERM);
}

#[cfg(not(unix))]
fn request_cancel(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    signal_group(child, libc::SIGKILL);
    let _ = child.kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.kill();
}
