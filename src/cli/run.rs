//! Run subcommand

use super::{Cli, CliError};
use crate::config::Config;
use crate::poller::{PollOrchestrator, PollSettings, RunMode, SessionOutcome};
use crate::provider::http::ApiClient;
use crate::suspend::FileSuspensionStore;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Try to launch an instance
#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Keep polling until an instance exists instead of one sweep per run
    #[arg(long, default_value_t = false)]
    pub daemon: bool,
}

impl RunCommand {
    /// Execute the run command
    pub async fn execute(&self, cli: &Cli) -> Result<SessionOutcome, CliError> {
        let config = Config::load(&cli.envfile)?;
        config.validate()?;

        let mode = if self.daemon {
            RunMode::Daemon
        } else {
            RunMode::Single
        };
        info!(
            region = %config.region,
            shape = %config.shape,
            mode = ?mode,
            backoff = ?config.backoff_kind,
            rate_limit = ?config.rate_limit_mode,
            "Starting session"
        );

        let client = ApiClient::from_config(&config)?;
        let suspension = Arc::new(FileSuspensionStore::new(config.waiter_file.clone()));
        let mut orchestrator = PollOrchestrator::new(
            Arc::new(client),
            config.backoff_policy(),
            suspension,
            PollSettings::from_config(&config, mode),
        );
        if let Some(notifier) = config.notifier() {
            orchestrator = orchestrator.with_notifier(notifier);
        }

        let outcome = orchestrator.run().await?;
        println!("{outcome}");
        Ok(outcome)
    }
}
