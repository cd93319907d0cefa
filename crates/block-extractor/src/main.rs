// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use block_extractor::cli::{run, Cli};
use clap::Parser;
use tracing::{error, level_filters::LevelFilter, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if let Err(e) = run(cli).await {
        error!("Extraction error: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(quiet: bool) {
    let level = match quiet {
        true => LevelFilter::ERROR,
        false => LevelFilter::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = set_global_default(subscriber) {
        eprintln!("Failed to set up the global default subscriber for logging: {e}");
    }
}
