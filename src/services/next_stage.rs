//! Hand-off once the device is online

use crate::command::{CommandLine, CommandRunner};
use anyhow::{Context, Result};
use log::info;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use trait_variant::make;

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NextStage {
    /// Start whatever runs after connectivity is established
    async fn launch(&self) -> Result<()>;
}

/// Runs the configured next-stage command, or nothing
#[derive(Clone, Debug)]
pub struct CommandNextStage<R> {
    runner: R,
    command: Option<CommandLine>,
}

impl<R: CommandRunner + Sync> CommandNextStage<R> {
    pub fn new(runner: R, command: Option<CommandLine>) -> Self {
        Self { runner, command }
    }
}

impl<R: CommandRunner + Sync> NextStage for CommandNextStage<R> {
    async fn launch(&self) -> Result<()> {
        let Some(command) = &self.command else {
            info!("no next stage configured");
            return Ok(());
        };

        let output = self
            .runner
            .run(command)
            .await
            .context("failed to start next stage")?;

        info!("next stage started: {}", output.trim_end());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::MockCommandRunner, error::CommandError};

    #[tokio::test]
    async fn runs_configured_command() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|command| command.to_string() == "systemctl start git-auto-updater")
            .times(1)
            .returning(|_| Box::pin(async { Ok(String::new()) }));

        let next_stage = CommandNextStage::new(
            runner,
            Some(CommandLine::parse("systemctl start git-auto-updater").unwrap()),
        );

        next_stage.launch().await.unwrap();
    }

    #[tokio::test]
    async fn without_command_does_nothing() {
        let runner = MockCommandRunner::new();
        let next_stage = CommandNextStage::new(runner, None);

        next_stage.launch().await.unwrap();
    }

    #[tokio::test]
    async fn reports_command_failure() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|command| {
            let command = command.to_string();
            Box::pin(async move {
                Err(CommandError::Execution {
                    command,
                    reason: "exit status: 5".to_string(),
                })
            })
        });

        let next_stage =
            CommandNextStage::new(runner, Some(CommandLine::new("systemctl").arg("start")));
        let err = next_stage.launch().await.unwrap_err();

        assert!(format!("{err:#}").contains("failed to start next stage"));
    }
}
