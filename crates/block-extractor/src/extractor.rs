// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    config::ExtractorConfig,
    error::ExtractError,
    manager::ConnectionManager,
    range::BlockRange,
    source::{BlockSource, Connector},
};

/// Counters describing how an extraction went.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Effective blocks per range after sizing for the initial tasks.
    pub workload: u64,
    pub ranges_planned: usize,
    /// Ranges, including resumed remainders, streamed to the end.
    pub ranges_completed: usize,
    pub failures: usize,
    pub reinsertions: usize,
    /// Blocks kept from streams that broke part-way.
    pub salvaged_blocks: usize,
    pub connections: usize,
    pub reshapes: usize,
    /// Spawner ticks handled across all connections.
    pub ticks: usize,
    /// Learned ceiling per connection, in opening order.
    pub ceilings: Vec<Option<usize>>,
    /// Final spawn period per connection, in opening order.
    pub spawn_periods: Vec<Duration>,
}

/// Blocks of a completed extraction, in completion order.
#[derive(Debug)]
pub struct Extraction<B> {
    pub blocks: Vec<B>,
    pub stats: ExtractionStats,
}

impl<B> Extraction<B> {
    pub fn into_blocks(self) -> Vec<B> {
        self.blocks
    }
}

/// Requests cancellation of an extraction in progress.
///
/// No new workers start once cancelled; running workers are left to finish and their
/// results are kept.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Adaptive concurrent extraction of a block period.
///
/// ```no_run
/// # use block_extractor::{Extractor, ExtractorConfig, FirehoseConnector};
/// # use firehose_client::FirehoseEndpoint;
/// # #[tokio::main]
/// # async fn main() -> Result<(), block_extractor::ExtractError> {
/// let connector = FirehoseConnector::new(FirehoseEndpoint::from_env()?);
/// let extractor = Extractor::new(connector, ExtractorConfig::default());
///
/// let extraction = extractor.run(19_581_798, 19_581_897).await?;
/// assert_eq!(extraction.blocks.len(), 100);
/// # Ok(())
/// # }
/// ```
pub struct Extractor<C> {
    connector: C,
    config: ExtractorConfig,
    cancel: Arc<watch::Sender<bool>>,
}

impl<C: Connector> Extractor<C> {
    pub fn new(connector: C, config: ExtractorConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            connector,
            config,
            cancel: Arc::new(cancel),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Extract every block of the inclusive period `[start, end]`.
    ///
    /// Returns [`ExtractError::Interrupted`] with the ranges never fetched if cancelled
    /// before completion.
    pub async fn run(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Extraction<<C::Source as BlockSource>::Block>, ExtractError> {
        self.config.validate()?;
        let period = BlockRange::new(start, end).ok_or(ExtractError::InvalidPeriod { start, end })?;

        ConnectionManager::new(&self.connector, &self.config, self.cancel.subscribe())
            .run(period)
            .await
    }
}
