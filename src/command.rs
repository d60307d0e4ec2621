use crate::error::CommandError;
use anyhow::{Context, Result};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::{fmt, process::Stdio};
use tokio::process::Command;
use trait_variant::make;

const REDACTED: &str = "***";

#[derive(Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    secret: bool,
}

/// A program and its arguments, executed without a shell
///
/// Arguments marked secret are rendered as `***` by `Display` and `Debug`,
/// so command lines can be logged and embedded in errors as they are.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: false,
        });
        self
    }

    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: true,
        });
        self
    }

    /// Split a configured command string on whitespace
    ///
    /// Quoting is not interpreted; commands that need arguments with
    /// embedded spaces have to be built with [`CommandLine::arg`].
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let program = words.next().context("failed to parse command: empty")?;

        Ok(words.fold(Self::new(program), |command, word| command.arg(word)))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|arg| arg.value.as_str())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let value = if arg.secret { REDACTED } else { &arg.value };
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandLine({self})")
    }
}

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait CommandRunner {
    /// Run one command to completion and return its standard output
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError>;
}

/// Runs commands as child processes of this one
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError> {
        info!("run: {command}");

        let output = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::Execution {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let reason = match stderr.trim() {
                "" => output.status.to_string(),
                stderr => format!("{}: {stderr}", output.status),
            };
            return Err(CommandError::Execution {
                command: command.to_string(),
                reason,
            });
        }

        // some tools report diagnostics on stderr and still exit 0;
        // those runs are not trusted either
        if !stderr.is_empty() {
            return Err(CommandError::UnexpectedOutput {
                command: command.to_string(),
                stderr,
            });
        }

        debug!("`{command}` returned: {}", stdout.trim_end());

        Ok(stdout)
    }
}
