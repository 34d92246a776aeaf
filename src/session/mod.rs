//! One scripted conversation with the subject binary.
//!
//! The runner turns a list of commands into a newline-joined script ending in
//! `exit`, hands it to a [`SessionTransport`] and classifies what comes back.
//! [`ProcessTransport`] is the real transport; tests substitute their own.

use crate::error::{ExitState, HarnessError, Result};
use log::debug;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Directive that makes the subject binary terminate.
pub const EXIT_DIRECTIVE: &str = "exit";

/// Upper bound on a single session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// How long output pipes may stay open once the subject itself is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Raw outcome of one transport exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Combined stdout and stderr text.
    pub output: String,
    /// Wall-clock seconds from launch to exit.
    pub elapsed: f64,
    pub status: ExitState,
}

/// Moves a script into the subject binary and collects what it printed.
pub trait SessionTransport {
    /// Runs one session fed with `script`. Implementations must not block
    /// much longer than `timeout`; on expiry they report [`ExitState::TimedOut`].
    fn send(&mut self, script: &str, timeout: Duration) -> Result<Exchange>;
}

impl<T: SessionTransport + ?Sized> SessionTransport for &mut T {
    fn send(&mut self, script: &str, timeout: Duration) -> Result<Exchange> {
        (**self).send(script, timeout)
    }
}

/// Output of a successful session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub output: String,
    /// Elapsed seconds, never negative.
    pub elapsed: f64,
    pub status: ExitState,
}

/// Joins `commands` with newlines and terminates the script with `exit`.
pub fn build_script<S: AsRef<str>>(commands: &[S]) -> String {
    let mut script = String::new();
    for command in commands {
        script.push_str(command.as_ref());
        script.push('\n');
    }
    script.push_str(EXIT_DIRECTIVE);
    script.push('\n');
    script
}

pub struct SessionRunner<T> {
    transport: T,
    timeout: Duration,
}

impl<T: SessionTransport> SessionRunner<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one session. Exactly one transport exchange, no retry.
    pub fn run<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<SessionResult> {
        let script = build_script(commands);
        let exchange = self.transport.send(&script, self.timeout)?;
        let limit = self.timeout.as_secs_f64();

        debug!(
            "session finished: {} after {:.3}s, {} bytes of output",
            exchange.status,
            exchange.elapsed,
            exchange.output.len()
        );

        if exchange.status == ExitState::TimedOut || exchange.elapsed > limit {
            return Err(HarnessError::SessionTimeout { elapsed: exchange.elapsed, limit });
        }
        if !exchange.status.success() {
            return Err(HarnessError::SessionFailed { status: exchange.status, output: exchange.output });
        }

        Ok(SessionResult {
            output: exchange.output,
            elapsed: exchange.elapsed.max(0.0),
            status: exchange.status,
        })
    }
}

/// Launches the subject binary as a child process per session.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    core: Option<usize>,
}

impl ProcessTransport {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self { program: program.into(), args: Vec::new(), working_dir: None, core: None }
    }

    /// Arguments passed on the command line, before any script is fed.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Pins every launched child to one CPU core.
    pub fn with_core(mut self, core: Option<usize>) -> Self {
        self.core = core;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SessionTransport for ProcessTransport {
    fn send(&mut self, script: &str, timeout: Duration) -> Result<Exchange> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        if let Some(core) = self.core {
            pin_to_core(&mut command, core);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let start = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|source| HarnessError::Spawn { program: self.program.clone(), source })?;

        let writer = spawn_feeder(child.stdin.take(), script.to_owned());
        let stdout = spawn_reader(child.stdout.take(), "stdout");
        let stderr = spawn_reader(child.stderr.take(), "stderr");

        let status = wait_with_timeout(&mut child, timeout)?;
        let elapsed = start.elapsed().as_secs_f64();
        // Helpers the subject left behind would keep the pipes open.
        kill_group(&child);

        let deadline = Instant::now() + DRAIN_GRACE;
        let mut output = collect(&stdout, deadline, &self.program);
        output.push('\n');
        output.push_str(&collect(&stderr, deadline, &self.program));
        if writer.is_finished() {
            if let Ok(Err(err)) = writer.join() {
                debug!("failed to feed script to {}: {}", self.program.display(), err);
            }
        }

        Ok(Exchange { output, elapsed, status })
    }
}

/// Polls the child until it exits or `timeout` passes, killing its group in the
/// latter case.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitState> {
    let started_at = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.into());
        }
        if started_at.elapsed() >= timeout {
            kill_group(child);
            let _ = child.kill();
            child.wait()?;
            return Ok(ExitState::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_feeder(stdin: Option<ChildStdin>, script: String) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        // A subject that exits without reading its input closes the pipe early.
        match stdin.write_all(script.as_bytes()) {
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    })
}

/// SIGKILLs the child's whole process group. The child leads its own group,
/// so the group id is its pid.
#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>, stream: &'static str) -> Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            if let Err(err) = source.read_to_end(&mut buffer) {
                debug!("reading {} stopped after {} bytes: {}", stream, buffer.len(), err);
            }
        }
        let _ = sender.send(buffer);
    });
    receiver
}

/// Waits for a reader until `deadline`; a pipe still held open after that
/// is abandoned with empty output.
fn collect(receiver: &Receiver<Vec<u8>>, deadline: Instant, program: &Path) -> String {
    let wait = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(wait) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(RecvTimeoutError::Timeout) => {
            debug!("output of {} still open after exit; dropping it", program.display());
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => {
            debug!("output reader for {} died", program.display());
            String::new()
        }
    }
}

#[cfg(target_os = "linux")]
fn pin_to_core(command: &mut Command, core: usize) {
    use std::os::unix::process::CommandExt;

    unsafe {
        command.pre_exec(move || {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core, &mut set);
            if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_core(_command: &mut Command, core: usize) {
    log::warn!("CPU pinning to core {} is only supported on Linux; ignoring", core);
}

/// Fails unless `path` is an existing file the current user may execute.
pub fn validate_binary(path: &Path) -> Result<()> {
    let not_executable = || HarnessError::BinaryNotExecutable(path.to_path_buf());
    if !path.is_file() {
        return Err(not_executable());
    }

    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| not_executable())?;
        if unsafe { libc::access(c_path.as_ptr(), libc::X_OK) } != 0 {
            return Err(not_executable());
        }
    }

    Ok(())
}

/// Validates `path` and makes it absolute, so launching it never falls back
/// to a `PATH` lookup.
pub fn resolve_binary(path: &Path) -> Result<PathBuf> {
    validate_binary(path)?;
    Ok(path.canonicalize()?)
}
