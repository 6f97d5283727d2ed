// src/recipe/kitchen/process.rs

//! Running external build tools
//!
//! Every tool the kitchen drives (patch, configure, make, msbuild, git)
//! goes through [`run`]. The child gets its own process group, a null
//! stdin and piped output. The environment overlay of a [`ToolCommand`]
//! is applied to the child only; the parent environment is never touched.
//!
//! Cancellation and timeouts terminate the whole process group: `SIGTERM`
//! first, then `SIGKILL` after [`KILL_GRACE`].

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Time a terminated tool gets to exit before it is killed
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// How often a running tool is checked for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long output readers get to drain after their tool was terminated
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Shared cancellation flag
///
/// Cloning shares the flag. The binary sets it from a Ctrl-C handler;
/// batch workers all watch the same token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been set
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One external tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables added to the inherited environment of the child
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
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

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Command line for logs and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Locate the program, honoring a `PATH` from the overlay
fn resolve_program(cmd: &ToolCommand) -> Result<PathBuf> {
    let not_found = |message: String| Error::ExternalTool {
        program: cmd.program.clone(),
        status: message,
        stdout: String::new(),
        stderr: String::new(),
    };

    if cmd.program.contains('/') || cmd.program.contains('\\') {
        let path = Path::new(&cmd.program);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cmd.cwd.join(path)
        };
        return if path.is_file() {
            Ok(path)
        } else {
            Err(not_found(format!("{} does not exist", path.display())))
        };
    }

    let search_path = cmd
        .env
        .get("PATH")
        .map(std::ffi::OsString::from)
        .or_else(|| std::env::var_os("PATH"));

    which::which_in(&cmd.program, search_path, &cmd.cwd)
        .map_err(|e| not_found(format!("not found on PATH: {}", e)))
}

/// Collect a pipe line by line, logging each line at debug level
fn spawn_reader<R: Read + Send + 'static>(pipe: R, program: String) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            debug!("[{}] {}", program, line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

/// Terminate the child's process group, escalating to a kill
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let group = Pid::from_raw(child.id() as i32);
        if killpg(group, Signal::SIGTERM).is_ok()
            && let Ok(Some(_)) = child.wait_timeout(KILL_GRACE)
        {
            let _ = killpg(group, Signal::SIGKILL);
            return;
        }
        let _ = killpg(group, Signal::SIGKILL);
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Output collected so far by the reader threads
///
/// A grandchild that inherited the pipes can keep them open after the
/// tool is gone; readers still running at `deadline` are abandoned.
fn collect(handle: Option<JoinHandle<String>>, deadline: Option<Instant>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                debug!("Output reader still running, dropping its output");
                return String::new();
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
    handle.join().unwrap_or_default()
}

/// Run a tool to completion
///
/// Returns `ExternalTool` when the program is missing or exits
/// unsuccessfully, `ToolTimeout` after `timeout`, and `Cancelled` when the
/// token is set while the tool runs.
pub fn run(cmd: &ToolCommand, cancel: &CancelToken, timeout: Duration) -> Result<ToolOutput> {
    cancel.check()?;

    let program = resolve_program(cmd)?;
    debug!("Running: {} (in {})", cmd.display(), cmd.cwd.display());

    let mut command = Command::new(&program);
    command
        .args(&cmd.args)
        .current_dir(&cmd.cwd)
        .envs(&cmd.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|e| Error::ExternalTool {
        program: cmd.display(),
        status: format!("failed to start: {}", e),
        stdout: String::new(),
        stderr: String::new(),
    })?;

    let stdout = child
        .stdout
        .take()
        .map(|pipe| spawn_reader(pipe, cmd.program.clone()));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| spawn_reader(pipe, cmd.program.clone()));

    let started = Instant::now();
    let status: ExitStatus = loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            break status;
        }
        if cancel.is_cancelled() {
            warn!("Cancelling {}", cmd.program);
            terminate(&mut child);
            let deadline = Some(Instant::now() + DRAIN_GRACE);
            let stderr = collect(stderr, deadline);
            if !stderr.is_empty() {
                debug!("{} stderr before cancellation:\n{}", cmd.program, stderr);
            }
            return Err(Error::Cancelled);
        }
        if started.elapsed() >= timeout {
            warn!("{} exceeded {:?}, terminating", cmd.program, timeout);
            terminate(&mut child);
            let deadline = Some(Instant::now() + DRAIN_GRACE);
            return Err(Error::ToolTimeout {
                program: cmd.display(),
                seconds: timeout.as_secs(),
                stdout: collect(stdout, deadline),
                stderr: collect(stderr, deadline),
            });
        }
    };

    let output = ToolOutput {
        stdout: collect(stdout, None),
        stderr: collect(stderr, None),
    };

    if status.success() {
        Ok(output)
    } else {
        Err(Error::ExternalTool {
            program: cmd.display(),
            status: status.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", std::env::temp_dir()).arg("-c").arg(script)
    }

    #[test]
    fn test_captures_output() {
        let out = run(
            &sh("echo hello; echo oops >&2"),
            &CancelToken::new(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn test_failure_carries_output() {
        let err = run(
            &sh("echo building; echo broken >&2; exit 3"),
            &CancelToken::new(),
            Duration::from_secs(30),
        )
        .unwrap_err();
        match err {
            Error::ExternalTool { stdout, stderr, status, .. } => {
                assert!(stdout.contains("building"));
                assert!(stderr.contains("broken"));
                assert!(status.contains('3'));
            }
            other => panic!("expected ExternalTool, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_program() {
        let cmd = ToolCommand::new("pantry-no-such-tool", std::env::temp_dir());
        assert!(matches!(
            run(&cmd, &CancelToken::new(), Duration::from_secs(5)),
            Err(Error::ExternalTool { .. })
        ));
    }

    #[test]
    fn test_env_overlay_is_scoped_to_child() {
        let mut env = BTreeMap::new();
        env.insert("PANTRY_OVERLAY_PROBE".to_string(), "from-overlay".to_string());

        let out = run(
            &sh("echo $PANTRY_OVERLAY_PROBE").envs(&env),
            &CancelToken::new(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(out.stdout.trim(), "from-overlay");
        assert!(std::env::var_os("PANTRY_OVERLAY_PROBE").is_none());
    }

    #[test]
    fn test_timeout_terminates() {
        let started = Instant::now();
        let err = run(&sh("sleep 30"), &CancelToken::new(), Duration::from_millis(300))
            .unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_carries_output() {
        let err = run(
            &sh("echo configuring; echo checking >&2; sleep 30"),
            &CancelToken::new(),
            Duration::from_millis(500),
        )
        .unwrap_err();
        match err {
            Error::ToolTimeout { stdout, stderr, .. } => {
                assert_eq!(stdout, "configuring\n");
                assert_eq!(stderr, "checking\n");
            }
            other => panic!("expected ToolTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_with_escaped_grandchild_returns() {
        if which::which("setsid").is_err() {
            eprintln!("Skipping test: setsid not installed");
            return;
        }
        // The background sleep leaves its own group and keeps stdout open
        let started = Instant::now();
        let err = run(
            &sh("echo started; setsid sleep 30 & sleep 30"),
            &CancelToken::new(),
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { .. }));
        assert!(started.elapsed() < KILL_GRACE + DRAIN_GRACE + Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_terminates() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run(&sh("sleep 30"), &cancel, Duration::from_secs(60)).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < KILL_GRACE + Duration::from_secs(5));
    }

    #[test]
    fn test_already_cancelled_does_not_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            run(&sh("exit 0"), &cancel, Duration::from_secs(5)),
            Err(Error::Cancelled)
        ));
    }
}
