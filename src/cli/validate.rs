//! Validate subcommand

use super::{Cli, CliError};
use crate::config::Config;

/// Check the configuration and the signing key
#[derive(clap::Parser, Debug)]
pub struct ValidateCommand {}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = Config::load(&cli.envfile)?;
        config.validate()?;
        let signer = config.signer()?;

        println!("Configuration is valid");
        println!("  Region: {}", config.region);
        println!("  Key ID: {}", signer.key_id());
        println!(
            "  Shape: {} ({} OCPUs, {} GB)",
            config.shape, config.ocpus, config.memory_in_gbs
        );
        println!("  Max instances: {}", config.max_instances);
        match &config.availability_domains {
            Some(domains) => println!("  Availability domains: {}", domains.join(", ")),
            None => println!("  Availability domains: listed from the API"),
        }
        println!("  Backoff: {:?}", config.backoff_kind);
        println!("  Rate limit: {:?}", config.rate_limit_mode);
        println!(
            "  Notifications: {}",
            if config.notifier().is_some() {
                "telegram"
            } else {
                "disabled"
            }
        );
        println!("  Suspension marker: {}", config.waiter_file.display());
        Ok(())
    }
}
