use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::duration_ms;

/// How a runner invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Program exited on its own (any exit status)
    Completed,
    /// Deadline reached; process was killed
    TimedOut,
    /// Binary could not be located or executed; nothing was spawned
    ProgramNotFound,
    /// Killed because the run was cancelled
    Killed,
}

/// Program plus arguments of an external diagnostic command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Everything captured from one external program invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExecution {
    pub command: CommandSpec,
    /// Exit status; None when killed by a signal or never spawned
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub completion: Completion,
}

impl RawExecution {
    pub fn new(
        command: CommandSpec,
        completion: Completion,
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            command,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
            completion,
        }
    }

    /// A normally completed execution with the given exit code and stdout
    pub fn completed(command: CommandSpec, exit_code: i32, stdout: impl Into<String>) -> Self {
        Self::new(
            command,
            Completion::Completed,
            Some(exit_code),
            stdout,
            String::new(),
            Duration::ZERO,
        )
    }

    /// An invocation refused before spawning because the binary is missing
    pub fn program_not_found(command: CommandSpec) -> Self {
        Self::new(
            command,
            Completion::ProgramNotFound,
            None,
            String::new(),
            String::new(),
            Duration::ZERO,
        )
    }

    /// Whether the process ran to completion with exit status 0
    pub fn success(&self) -> bool {
        self.completion == Completion::Completed && self.exit_code == Some(0)
    }

    /// Whether the process was stopped before exiting on its own
    pub fn interrupted(&self) -> bool {
        matches!(self.completion, Completion::TimedOut | Completion::Killed)
    }

    /// First non-blank stderr line, for failure messages
    pub fn stderr_summary(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(crate::lookup::sanitize_display)
            .unwrap_or_default()
    }
}
