// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Block Extractor
//!
//! Adaptive, concurrent extraction of large block periods from a Firehose endpoint.
//!
//! A period is split into ranges that are streamed by many concurrent workers over one
//! connection. The first stream failure teaches the connection's concurrency ceiling;
//! failed streams resume from the first block not received. With
//! [`ExtractorConfig::max_connections`] above one, further connections are opened as
//! ceilings are discovered and the remaining ranges are shared between them.
//!
//! The engine is generic over [`Connector`] and [`BlockSource`]; [`FirehoseConnector`]
//! streams from Firehose v2.

mod backpressure;
pub mod cli;
mod config;
mod coordinator;
mod error;
mod extractor;
mod firehose;
mod manager;
mod range;
mod source;
mod spawner;
mod worker;

pub use backpressure::{ConcurrencyCeiling, SpawnCadence, MIN_SPAWN_PERIOD, SPAWN_PERIOD_FACTOR};
pub use config::ExtractorConfig;
pub use coordinator::GroupToken;
pub use error::ExtractError;
pub use extractor::{CancelHandle, Extraction, ExtractionStats, Extractor};
pub use firehose::{FirehoseConnector, FirehoseSource};
pub use range::{partition, plan_workload, BlockRange, RangePool};
pub use source::{BlockSource, BlockStream, Connector, RangeRequest};
pub use spawner::{Spawner, SpawnerState, Termination, Tick};
pub use worker::{FailureKind, StreamFailure, TaskId};
