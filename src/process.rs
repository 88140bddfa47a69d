//! Cancellable external tool invocation
//!
//! Extraction and rpmbuild are the two stages that block on an external
//! process. Both go through [`ToolCommand`], which drains stdout/stderr on
//! helper threads, polls for cancellation and an optional deadline, and
//! terminates the whole process group when either fires.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured output of a finished tool
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => {
                let mut combined = self.stdout.clone();
                if !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&self.stderr);
                combined
            }
        }
    }
}

/// How a tool invocation ended
#[derive(Debug)]
pub enum ToolRun {
    /// The process exited on its own
    Finished(ToolOutput),
    /// Cancellation was requested and the process was terminated
    Cancelled(ToolOutput),
    /// The deadline passed and the process was terminated
    TimedOut(ToolOutput),
}

/// Builder for an external command
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    env_remove: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a command for the given program
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            env_remove: Vec::new(),
            timeout: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Working directory
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Remove an environment variable
    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Self {
        self.env_remove.push(key.as_ref().to_os_string());
        self
    }

    /// Terminate the process if it runs longer than this
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human readable command line, for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, honoring cancellation and the timeout
    pub fn run(&self, cancel: &CancellationToken) -> std::io::Result<ToolRun> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }
        for key in &self.env_remove {
            command.env_remove(key);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!("Running: {}", self.display());
        let mut child = command.spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let (status, ending) = loop {
            if let Some(status) = child.try_wait()? {
                break (status, Ending::Finished);
            }
            if cancel.is_cancelled() {
                warn!("Cancellation requested, terminating {}", self.program.display());
                break (terminate(&mut child)?, Ending::Cancelled);
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!(
                        "{} exceeded {}s, terminating",
                        self.program.display(),
                        timeout.as_secs()
                    );
                    break (terminate(&mut child)?, Ending::TimedOut);
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Leftover group members keep the pipes open
        if matches!(ending, Ending::Finished) {
            signal_group(&child, Signal::SIGKILL);
        }

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        let output = ToolOutput {
            code: status.code(),
            stdout: join(stdout, drain_deadline),
            stderr: join(stderr, drain_deadline),
        };

        Ok(match ending {
            Ending::Finished => ToolRun::Finished(output),
            Ending::Cancelled => ToolRun::Cancelled(output),
            Ending::TimedOut => ToolRun::TimedOut(output),
        })
    }
}

enum Ending {
    Finished,
    Cancelled,
    TimedOut,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

/// Join a drain thread, giving up at `deadline`
///
/// A descendant outside the process group can still hold the pipe; its
/// thread is then left behind and the output collected so far is lost.
fn join(handle: Option<JoinHandle<String>>, deadline: Instant) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("Output pipe still open after the tool exited, not waiting for it");
            return String::new();
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.join().unwrap_or_default()
}

/// SIGTERM the process group, then SIGKILL after a grace period
fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    signal_group(child, Signal::SIGTERM);

    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            signal_group(child, Signal::SIGKILL);
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    signal_group(child, Signal::SIGKILL);
    let _ = child.kill();
    child.wait()
}

/// Signal the child's process group; ESRCH once everything is gone
fn signal_group(child: &Child, signal: Signal) {
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(err) = killpg(Pid::from_raw(pid), signal) {
            if err != Errno::ESRCH {
                debug!("Failed to send {} to group {}: {}", signal, pid, err);
            }
        }
    }
}
