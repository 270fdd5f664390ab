pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use clap::Parser;

use crate::cli::Cli;
use crate::core::{config::Settings, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tracing::debug!(
        provider = settings.provider().as_str(),
        model = settings.model(),
        "Settings loaded"
    );
    commands::dispatch(cli.command, settings).await
}
