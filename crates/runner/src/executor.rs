//! Command execution with timeout and output capture

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use docproof_common::CommandPolicy;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Timed out after {seconds} seconds.")]
    Timeout { seconds: u64 },

    #[error("Unable to parse command '{command}': {reason}")]
    Parse { command: String, reason: String },

    #[error("Unable to start command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Command is empty.")]
    EmptyCommand,
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Negative signal number when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs approved commands, one at a time.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell_meta_chars: Vec<String>,
    shell: Vec<String>,
    timeout_secs: u64,
    env: Vec<(String, OsString)>,
}

impl CommandExecutor {
    pub fn new(policy: &CommandPolicy, timeout_secs: u64) -> Self {
        Self {
            shell_meta_chars: policy.shell_meta_chars.clone(),
            shell: policy.shell.clone(),
            timeout_secs,
            env: Vec::new(),
        }
    }

    /// Add a variable on top of the inherited environment.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether the command uses shell syntax and must go through the shell.
    pub fn needs_shell(&self, command: &str) -> bool {
        self.shell_meta_chars
            .iter()
            .any(|meta| command.contains(meta.as_str()))
    }

    /// Argument vector for the command: the shell plus the whole string, or
    /// the command split into words.
    pub fn argv(&self, command: &str) -> Result<Vec<String>, ExecutionError> {
        let argv = if self.needs_shell(command) {
            let mut argv = self.shell.clone();
            argv.push(command.to_string());
            argv
        } else {
            shell_words::split(command).map_err(|e| ExecutionError::Parse {
                command: command.to_string(),
                reason: e.to_string(),
            })?
        };

        if argv.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        Ok(argv)
    }

    /// Run `command` in `cwd`, waiting at most the configured timeout.
    ///
    /// A non-zero exit is an `Ok` outcome; only parse, spawn and timeout
    /// failures are errors. On timeout the whole process group is killed.
    pub async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutcome, ExecutionError> {
        let argv = self.argv(command)?;
        debug!("Executing {:?} in {}", argv, cwd.display());

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(cwd)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        let pid = child.id();

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                kill_group(pid);
                return Err(ExecutionError::Timeout {
                    seconds: self.timeout_secs,
                });
            }
        };

        Ok(CommandOutcome {
            exit_code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}
