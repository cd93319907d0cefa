// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use firehose_client::ClientError;
use thiserror::Error;
use tonic::Status;

use crate::range::BlockRange;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid block period: start #{start} is after end #{end}")]
    InvalidPeriod { start: u64, end: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Firehose client error: {0}")]
    Client(#[from] ClientError),

    #[error("Server rejected the stream for range {range}: {status}")]
    Rejected { range: BlockRange, status: Status },

    #[error("Gave up on range {range} after {attempts} failed attempts")]
    ExhaustedRetries { range: BlockRange, attempts: u32 },

    #[error("Extraction interrupted with {} ranges missing ({extracted} blocks extracted)", .missing.len())]
    Interrupted {
        missing: Vec<BlockRange>,
        extracted: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error parsing configuration file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
