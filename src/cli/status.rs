//! Status subcommand

use super::{Cli, CliError};
use crate::config::Config;
use crate::suspend::{FileSuspensionStore, SuspendError, SuspensionStore};
use chrono::Utc;

/// Print the suspension marker state without changing it
#[derive(clap::Parser, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Execute the status command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = Config::load(&cli.envfile)?;
        let store = FileSuspensionStore::new(config.waiter_file.clone());
        let now = Utc::now();

        match store.deadline() {
            Ok(Some(until)) if until > now => {
                let remaining = (until - now).num_seconds();
                println!("Suspended until {} ({remaining}s remaining)", until.to_rfc3339());
            }
            Ok(Some(until)) => {
                println!("Marker expired at {}, next run proceeds", until.to_rfc3339());
            }
            Ok(None) => println!("No suspension marker at {}", store.path().display()),
            Err(SuspendError::Corrupt { content, .. }) => {
                println!("Corrupt marker {content:?}, next run removes it");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
