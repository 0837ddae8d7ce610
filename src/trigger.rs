//! User command run after each chunk file is finalized
//!
//! The command goes through the platform shell, so it may contain pipes and
//! redirections. The finished file and its row count reach the command as
//! environment variables.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Environment variable holding the path of the finished chunk
pub const ENV_PAYLOAD_VAR: &str = "CSV_PAYLOAD_FILE";
/// Environment variable holding the number of rows in the finished chunk
pub const ENV_ROWCOUNT_VAR: &str = "CSV_ROWCOUNT";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Success,
    Failed { code: Option<i32> },
    TimedOut,
    SpawnFailed(String),
}

impl TriggerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TriggerOutcome::Success)
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    command: String,
    timeout: Option<Duration>,
}

impl Trigger {
    pub fn new(command: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the command for a finished chunk and wait for it
    pub fn run(&self, payload: &Path, rows: u64) -> TriggerOutcome {
        self.run_with_env(&payload.to_string_lossy(), rows)
    }

    /// Run the command once after the last chunk, with an empty payload path
    /// and a zero row count
    pub fn run_final(&self) -> TriggerOutcome {
        self.run_with_env("", 0)
    }

    fn run_with_env(&self, payload: &str, rows: u64) -> TriggerOutcome {
        let child = shell_command(&self.command)
            .env(ENV_PAYLOAD_VAR, payload)
            .env(ENV_ROWCOUNT_VAR, rows.to_string())
            .stdin(Stdio::null())
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                log::warn!("Couldn't execute trigger command \"{}\": {}", self.command, e);
                return TriggerOutcome::SpawnFailed(e.to_string());
            }
        };

        let outcome = match self.wait(child) {
            Ok(Some(status)) if status.success() => TriggerOutcome::Success,
            Ok(Some(status)) => TriggerOutcome::Failed {
                code: status.code(),
            },
            Ok(None) => TriggerOutcome::TimedOut,
            Err(e) => TriggerOutcome::SpawnFailed(e.to_string()),
        };

        match &outcome {
            TriggerOutcome::Success => {
                log::debug!("Trigger \"{}\" finished for '{}'", self.command, payload)
            }
            TriggerOutcome::Failed { code } => log::warn!(
                "Trigger \"{}\" failed for '{}' (exit code {})",
                self.command,
                payload,
                code.map_or_else(|| "none".to_string(), |c| c.to_string())
            ),
            TriggerOutcome::TimedOut => log::warn!(
                "Trigger \"{}\" killed after {:?} for '{}'",
                self.command,
                self.timeout.unwrap_or_default(),
                payload
            ),
            TriggerOutcome::SpawnFailed(e) => {
                log::warn!("Trigger \"{}\" could not be awaited: {}", self.command, e)
            }
        }

        outcome
    }

    /// Wait for the child; `Ok(None)` means it was killed after the timeout
    fn wait(&self, mut child: Child) -> io::Result<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(Some);
        };

        // A deadline past what Instant can represent never arrives
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return child.wait().map(Some);
        };
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                // The child may exit between try_wait and kill
                let _ = child.kill();
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_trigger_receives_environment() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("trigger.log");
        let trigger = Trigger::new(
            format!(
                "echo \"${}:${}\" >> {}",
                ENV_PAYLOAD_VAR,
                ENV_ROWCOUNT_VAR,
                log_path.display()
            ),
            None,
        );

        let outcome = trigger.run(Path::new("/data/out_00001.csv"), 42);
        assert_eq!(outcome, TriggerOutcome::Success);

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(logged.trim(), "/data/out_00001.csv:42");
    }

    #[test]
    fn test_final_trigger_has_empty_payload() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("final.log");
        let trigger = Trigger::new(
            format!(
                "echo \"[${}]${}\" > {}",
                ENV_PAYLOAD_VAR,
                ENV_ROWCOUNT_VAR,
                log_path.display()
            ),
            None,
        );

        assert!(trigger.run_final().is_success());
        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(logged.trim(), "[]0");
    }

    #[test]
    fn test_nonzero_exit_is_reported() {
        let trigger = Trigger::new("exit 3", None);
        assert_eq!(
            trigger.run(Path::new("x.csv"), 1),
            TriggerOutcome::Failed { code: Some(3) }
        );
    }

    #[test]
    fn test_timeout_kills_child() {
        let trigger = Trigger::new("sleep 5", Some(Duration::from_millis(100)));
        let started = Instant::now();
        assert_eq!(trigger.run(Path::new("x.csv"), 1), TriggerOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_for_child() {
        let trigger = Trigger::new("true", Some(Duration::MAX));
        assert!(trigger.run(Path::new("x.csv"), 1).is_success());
    }

    #[test]
    fn test_fast_command_within_timeout() {
        let trigger = Trigger::new("true", Some(Duration::from_secs(5)));
        assert!(trigger.run(Path::new("x.csv"), 1).is_success());
    }
}
