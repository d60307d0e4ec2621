use std::fmt;

/// Failure of a single external command or of interpreting its output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The process could not be spawned or exited with a nonzero status
    Execution { command: String, reason: String },
    /// The process wrote to its error stream
    UnexpectedOutput { command: String, stderr: String },
    /// The process succeeded but its output lacks what the caller needs
    Parse { command: String, detail: String },
}

impl CommandError {
    /// Stable label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Execution { .. } => "execution",
            CommandError::UnexpectedOutput { .. } => "unexpected-output",
            CommandError::Parse { .. } => "parse",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Execution { command, reason } => {
                write!(f, "failed to execute `{command}`: {reason}")
            }
            CommandError::UnexpectedOutput { command, stderr } => {
                write!(f, "`{command}` wrote to stderr: {}", stderr.trim_end())
            }
            CommandError::Parse { command, detail } => {
                write!(f, "failed to parse output of `{command}`: {detail}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Returned by waits that were interrupted by a shutdown request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown requested")
    }
}

impl std::error::Error for Cancelled {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let execution = CommandError::Execution {
            command: "false".to_string(),
            reason: "exit status: 1".to_string(),
        };
        let unexpected = CommandError::UnexpectedOutput {
            command: "iwlist wlan0 scan".to_string(),
            stderr: "wlan0 Interface doesn't support scanning\n".to_string(),
        };
        let parse = CommandError::Parse {
            command: "wpa_cli -iwlan0 status".to_string(),
            detail: "missing wpa_state".to_string(),
        };

        assert_eq!(execution.kind(), "execution");
        assert_eq!(unexpected.kind(), "unexpected-output");
        assert_eq!(parse.kind(), "parse");
    }

    #[test]
    fn display_trims_trailing_stderr_newline() {
        let err = CommandError::UnexpectedOutput {
            command: "iwlist wlan0 scan".to_string(),
            stderr: "busy\n".to_string(),
        };

        assert_eq!(err.to_string(), "`iwlist wlan0 scan` wrote to stderr: busy");
    }
}
