// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use clap::Parser;
use firehose_client::FirehoseEndpoint;
use firehose_protos::Any;
use prost::Message;
use tracing::{info, warn};

use crate::{
    config::ExtractorConfig, error::ExtractError, extractor::Extractor,
    firehose::FirehoseConnector,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// first block of the period
    pub start: u64,
    /// last block of the period, inclusive
    pub end: u64,
    /// JSON file with extractor settings; the flags below override it
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// number of blocks per range
    #[clap(short, long)]
    pub workload: Option<u64>,
    /// number of workers the period is sized for
    #[clap(long)]
    pub initial_tasks: Option<usize>,
    /// initial period between worker spawns, in seconds
    #[clap(long)]
    pub spawn_frequency: Option<f64>,
    /// adapt the spawn period to observed task runtimes
    #[clap(long)]
    pub auto_adjust_frequency: bool,
    #[clap(long)]
    pub include_filter: Option<String>,
    #[clap(long)]
    pub exclude_filter: Option<String>,
    /// also stream blocks that are not final yet
    #[clap(long)]
    pub all_blocks: bool,
    /// give up on a range after this many failed attempts
    #[clap(long)]
    pub max_retries: Option<u32>,
    /// open up to this many connections as concurrency limits are discovered
    #[clap(long)]
    pub max_connections: Option<usize>,
    /// file receiving the length-prefixed blocks, stdout when unset
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// only log errors
    #[clap(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// The configuration file, if any, with command-line overrides applied.
    pub fn extractor_config(&self) -> Result<ExtractorConfig, ExtractError> {
        let mut config = match &self.config {
            Some(path) => ExtractorConfig::from_file(path)?,
            None => ExtractorConfig::default(),
        };

        if let Some(workload) = self.workload {
            config.workload = workload;
        }
        if let Some(initial_tasks) = self.initial_tasks {
            config.initial_tasks = initial_tasks;
        }
        if let Some(spawn_frequency) = self.spawn_frequency {
            config.spawn_frequency = spawn_frequency;
        }
        if self.auto_adjust_frequency {
            config.auto_adjust_frequency = true;
        }
        if let Some(include_filter) = &self.include_filter {
            config.include_filter = include_filter.clone();
        }
        if let Some(exclude_filter) = &self.exclude_filter {
            config.exclude_filter = exclude_filter.clone();
        }
        if self.all_blocks {
            config.final_blocks_only = false;
        }
        if self.max_retries.is_some() {
            config.max_failed_block_retries = self.max_retries;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run(cli: Cli) -> Result<(), ExtractError> {
    let config = cli.extractor_config()?;
    let endpoint = FirehoseEndpoint::from_env()?;

    let extractor = Extractor::new(FirehoseConnector::new(endpoint), config);

    let cancel = extractor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting running workers finish...");
            cancel.cancel();
        }
    });

    let extraction = extractor.run(cli.start, cli.end).await?;

    match &cli.output {
        Some(path) => write_blocks(&extraction.blocks, BufWriter::new(File::create(path)?))?,
        None => write_blocks(&extraction.blocks, BufWriter::new(io::stdout().lock()))?,
    }

    info!(
        blocks = extraction.blocks.len(),
        failures = extraction.stats.failures,
        connections = extraction.stats.connections,
        "Extraction complete"
    );

    Ok(())
}

/// Write each block as a 4-byte big-endian length followed by its encoded `Any` message.
pub fn write_blocks<W: Write>(blocks: &[Any], mut writer: W) -> io::Result<()> {
    for block in blocks {
        let bytes = block.encode_to_vec();
        let len = u32::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "block larger than 4 GiB"))?;

        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&bytes)?;
    }
    writer.flush()
}
