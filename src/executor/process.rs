// Process executor: spawn, stream capture, timeout escalation
//
// Every invocation owns its child, its capture buffers and its timers.
// Nothing here is shared across executions.

use crate::executor::capture::OutputCapture;
use crate::executor::error::ExecutionError;
use crate::executor::types::{ExecutionResult, ProcessSpawnSpec};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// Wait between the graceful terminate signal and the forceful kill
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to keep reading pipes after the child has exited
pub const DRAIN_WINDOW: Duration = Duration::from_millis(250);

const READ_CHUNK_BYTES: usize = 8192;

/// Seam between the tool handlers and the OS process layer
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Run one child to completion. Never fails: every outcome is a result.
    async fn execute(&self, spec: ProcessSpawnSpec) -> ExecutionResult;
}

/// Spawns real child processes via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl ProcessSpawner for ProcessExecutor {
    async fn execute(&self, spec: ProcessSpawnSpec) -> ExecutionResult {
        run_process(&spec).await
    }
}

/// Timeout escalation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillState {
    Running,
    TimedOut,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    Terminate,
    Kill,
}

impl KillState {
    /// Advance one step; a fire in the terminal state is a no-op
    fn escalate(&mut self) -> Option<Escalation> {
        match *self {
            KillState::Running => {
                *self = KillState::TimedOut;
                Some(Escalation::Terminate)
            }
            KillState::TimedOut => {
                *self = KillState::Killed;
                Some(Escalation::Kill)
            }
            KillState::Killed => None,
        }
    }

    fn timed_out(self) -> bool {
        self != KillState::Running
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!(pid = pid, signal = %signal, error = %e, "failed to signal process group");
    }
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

// No graceful signal here, terminate is already forceful
#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to terminate child");
    }
}

fn send_kill(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to kill child");
    }
}

/// Read one chunk; `None` on EOF or read error
async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> Option<usize>
where
    R: AsyncRead + Unpin,
{
    let reader = pipe.as_mut()?;
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

/// Spawn the process described by `spec` and drive it to a terminal result
pub async fn run_process(spec: &ProcessSpawnSpec) -> ExecutionResult {
    let started = Instant::now();

    let mut command = Command::new(&spec.executable);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Lead a fresh process group so signals also reach descendants
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(
                executable = %spec.executable,
                cwd = %spec.cwd.display(),
                error = %e,
                "failed to spawn process"
            );
            return ExecutionResult::spawn_failure(&spec.executable, &e, started.elapsed());
        }
    };
    let pid = child.id();

    debug!(
        pid = ?pid,
        executable = %spec.executable,
        args = ?spec.args,
        timeout_ms = spec.timeout.as_millis() as u64,
        "process spawned"
    );

    if let (Some(payload), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        // Written off the main loop so a child that never reads cannot stall output capture
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!(error = %e, "stdin closed before payload was written");
            }
        });
    }

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = OutputCapture::new(spec.max_output_bytes);
    let mut stderr = OutputCapture::new(spec.max_output_bytes);
    let mut stdout_buf = vec![0u8; READ_CHUNK_BYTES];
    let mut stderr_buf = vec![0u8; READ_CHUNK_BYTES];

    let mut kill_state = KillState::Running;
    let mut exit: Option<std::io::Result<ExitStatus>> = None;
    let mut exited_after = Duration::ZERO;

    let escalation = sleep(spec.timeout);
    tokio::pin!(escalation);
    let drain = sleep(DRAIN_WINDOW);
    tokio::pin!(drain);

    loop {
        if exit.is_some() && stdout_pipe.is_none() && stderr_pipe.is_none() {
            break;
        }

        tokio::select! {
            read = read_chunk(&mut stdout_pipe, &mut stdout_buf), if stdout_pipe.is_some() => {
                match read {
                    Some(n) => stdout.append(&stdout_buf[..n]),
                    None => stdout_pipe = None,
                }
            }
            read = read_chunk(&mut stderr_pipe, &mut stderr_buf), if stderr_pipe.is_some() => {
                match read {
                    Some(n) => stderr.append(&stderr_buf[..n]),
                    None => stderr_pipe = None,
                }
            }
            status = child.wait(), if exit.is_none() => {
                exited_after = started.elapsed();
                exit = Some(status);
                drain.as_mut().reset(Instant::now() + DRAIN_WINDOW);

                // Nothing in the group may outlive the leader
                #[cfg(unix)]
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            _ = &mut escalation, if exit.is_none() && kill_state != KillState::Killed => {
                match kill_state.escalate() {
                    Some(Escalation::Terminate) => {
                        warn!(
                            pid = ?pid,
                            timeout_ms = spec.timeout.as_millis() as u64,
                            "process timed out, sending terminate signal"
                        );
                        send_terminate(&mut child, pid);
                        escalation.as_mut().reset(Instant::now() + KILL_GRACE_PERIOD);
                    }
                    Some(Escalation::Kill) => {
                        warn!(pid = ?pid, "process ignored terminate signal, killing");
                        send_kill(&mut child, pid);
                    }
                    None => {}
                }
            }
            _ = &mut drain, if exit.is_some() => {
                debug!(pid = ?pid, "output pipes still open after exit, abandoning drain");
                break;
            }
        }
    }

    // Catches descendants started after the exit-time kill
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);

    let timed_out = kill_state.timed_out();
    let stdout_observed = stdout.observed_bytes();
    let stderr_observed = stderr.observed_bytes();
    let out = stdout.finalize();
    let err = stderr.finalize();
    let truncated = out.truncated || err.truncated;
    let mut stderr_text = err.text;

    let (exit_code, error) = match exit {
        Some(Ok(status)) => {
            let code = if timed_out {
                -1
            } else {
                status.code().unwrap_or(-1)
            };
            (code, None)
        }
        Some(Err(e)) => {
            let message = format!("Failed to wait for process: {}", e);
            if !stderr_text.is_empty() && !stderr_text.ends_with('\n') {
                stderr_text.push('\n');
            }
            stderr_text.push_str(&message);
            (-1, Some(ExecutionError::failed(message)))
        }
        None => (-1, Some(ExecutionError::failed("Process exit was not observed"))),
    };

    let duration_ms = exited_after.as_millis() as u64;
    let success = exit_code == 0 && !timed_out && error.is_none();

    info!(
        pid = ?pid,
        executable = %spec.executable,
        exit_code = exit_code,
        duration_ms = duration_ms,
        timed_out = timed_out,
        truncated = truncated,
        stdout_bytes = stdout_observed,
        stderr_bytes = stderr_observed,
        "process finished"
    );

    ExecutionResult {
        success,
        stdout: out.text,
        stderr: stderr_text,
        exit_code,
        duration_ms,
        timed_out,
        truncated,
        error,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::capture::TRUNCATION_MARKER;

    fn sh(script: &str) -> ProcessSpawnSpec {
        ProcessSpawnSpec::new(
            "/bin/sh",
            std::env::temp_dir(),
            Duration::from_secs(10),
            1024 * 1024,
        )
        .with_args(["-c", script])
    }

    #[test]
    fn test_kill_state_transitions_are_idempotent() {
        let mut state = KillState::Running;
        assert!(!state.timed_out());
        assert_eq!(state.escalate(), Some(Escalation::Terminate));
        assert!(state.timed_out());
        assert_eq!(state.escalate(), Some(Escalation::Kill));
        assert_eq!(state, KillState::Killed);
        assert_eq!(state.escalate(), None);
        assert_eq!(state.escalate(), None);
        assert_eq!(state, KillState::Killed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_exit() {
        let result = run_process(&sh("echo hello")).await;

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert!(!result.timed_out);
        assert!(!result.truncated);
        assert!(result.error.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let result = run_process(&sh("echo oops >&2; exit 3")).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr, "oops\n");
        assert!(result.error.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_escalates_and_keeps_partial_output() {
        let mut spec = sh("echo started; sleep 30");
        spec.timeout = Duration::from_millis(300);

        let result = run_process(&spec).await;

        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout, "started\n");
        assert!(result.duration_ms >= 300);
        assert!(
            result.duration_ms < 300 + KILL_GRACE_PERIOD.as_millis() as u64 + 1000,
            "took {}ms",
            result.duration_ms
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_ignoring_process_is_killed() {
        let mut spec = sh("trap '' TERM; while true; do sleep 0.1; done");
        spec.timeout = Duration::from_millis(200);

        let result = run_process(&spec).await;

        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
        assert!(result.duration_ms >= 200 + KILL_GRACE_PERIOD.as_millis() as u64 - 50);
        assert!(result.duration_ms < 200 + KILL_GRACE_PERIOD.as_millis() as u64 + 1500);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_truncation() {
        let mut spec = sh("head -c 100000 /dev/zero | tr '\\0' 'a'");
        spec.max_output_bytes = 2048;

        let result = run_process(&spec).await;

        assert!(result.truncated);
        assert!(result.success);
        assert_eq!(result.stdout.len(), 2048 + TRUNCATION_MARKER.len());
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_payload_is_delivered_and_closed() {
        let spec = sh("cat").with_stdin("from stdin\n");

        let result = run_process(&spec).await;

        assert!(result.success);
        assert_eq!(result.stdout, "from stdin\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overrides_are_merged() {
        let spec = sh("echo \"$SANDEXEC_TEST_VALUE:${PATH:+has-path}\"")
            .with_env("SANDEXEC_TEST_VALUE", "42");

        let result = run_process(&spec).await;

        assert_eq!(result.stdout, "42:has-path\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_folded_into_result() {
        let spec = ProcessSpawnSpec::new(
            "/definitely/not/a/real/binary",
            std::env::temp_dir(),
            Duration::from_secs(1),
            1024,
        );

        let result = run_process(&spec).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(!result.timed_out);
        assert!(result.stderr.contains("/definitely/not/a/real/binary"));
        assert!(matches!(
            result.error,
            Some(ExecutionError::ExecutionFailed { .. })
        ));
    }

    /// Alive and not a zombie waiting for its new parent to reap it
    #[cfg(unix)]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat.contains(") Z "),
            Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok(),
        }
    }

    #[cfg(unix)]
    async fn wait_until_gone(pid: i32) -> bool {
        for _ in 0..40 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_descendant_does_not_hang() {
        let mut spec = sh("sleep 30 & echo $!; echo parent-done");
        spec.timeout = Duration::from_secs(10);

        let started = std::time::Instant::now();
        let result = run_process(&spec).await;

        assert!(result.success);
        assert!(started.elapsed() < Duration::from_secs(5));

        let mut lines = result.stdout.lines();
        let background: i32 = lines.next().unwrap().trim().parse().unwrap();
        assert_eq!(lines.next(), Some("parent-done"));
        assert!(
            wait_until_gone(background).await,
            "background child {} outlived the run",
            background
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_descendants_are_reaped() {
        let mut spec = sh("sleep 30 & echo $!; wait");
        spec.timeout = Duration::from_millis(300);

        let result = run_process(&spec).await;

        assert!(result.timed_out);
        let background: i32 = result.stdout.trim().parse().unwrap();
        assert!(wait_until_gone(background).await);
    }
}
