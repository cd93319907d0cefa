// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The extraction loop: spawner ticks, worker completions and cancellation, handled one at a
//! time on a single task across every connection group.

use tokio::{
    sync::{mpsc, watch},
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::ExtractorConfig,
    coordinator::{Coordinator, GroupToken, RequestTemplate, RetryLedger},
    error::ExtractError,
    extractor::{Extraction, ExtractionStats},
    range::{plan_workload, BlockRange, RangePool},
    source::{BlockSource, Connector},
    spawner::{Termination, Tick},
    worker::{Completion, TaskId},
};

type Block<C> = <<C as Connector>::Source as BlockSource>::Block;

enum Event<B> {
    Completion(Option<Completion<B>>),
    Cancel(bool),
    Tick,
}

pub(crate) struct ConnectionManager<'a, C: Connector> {
    connector: &'a C,
    config: &'a ExtractorConfig,
    template: RequestTemplate,
    groups: Vec<Coordinator<C::Source>>,
    completions_tx: mpsc::UnboundedSender<Completion<Block<C>>>,
    completions_rx: mpsc::UnboundedReceiver<Completion<Block<C>>>,
    cancel: watch::Receiver<bool>,
    listening_for_cancel: bool,
    cancelled: bool,
    scaling_stopped: bool,
    next_task: u64,
    ledger: RetryLedger,
    blocks: Vec<Block<C>>,
    stats: ExtractionStats,
}

impl<'a, C: Connector> ConnectionManager<'a, C> {
    pub(crate) fn new(
        connector: &'a C,
        config: &'a ExtractorConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            config,
            template: RequestTemplate::new(config),
            groups: Vec::new(),
            completions_tx,
            completions_rx,
            cancel,
            listening_for_cancel: true,
            cancelled: false,
            scaling_stopped: false,
            next_task: 0,
            ledger: RetryLedger::new(config.max_failed_block_retries),
            blocks: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub(crate) async fn run(
        mut self,
        period: BlockRange,
    ) -> Result<Extraction<Block<C>>, ExtractError> {
        let workload = plan_workload(period, self.config.initial_tasks, self.config.workload);
        let pool = RangePool::partition(period, workload);

        self.stats.workload = workload;
        self.stats.ranges_planned = pool.len();
        info!(
            "Streaming {} blocks from #{} to #{} in {} ranges of up to {} blocks...",
            period.len(),
            period.start(),
            period.end(),
            pool.len(),
            workload
        );

        let source = self.connector.connect().await?;
        self.groups
            .push(Coordinator::new(GroupToken(0), source, pool, self.config));

        if *self.cancel.borrow() {
            self.cancel_all();
        }

        match self.event_loop().await {
            Ok(()) => self.finish(),
            Err(error) => {
                let aborted = self.abort_all();
                error!(aborted, "Extraction failed: {error}");
                Err(error)
            }
        }
    }

    async fn event_loop(&mut self) -> Result<(), ExtractError> {
        while !self.is_finished() {
            let deadline = self.next_deadline();

            let event = tokio::select! {
                biased;
                completion = self.completions_rx.recv() => Event::Completion(completion),
                changed = self.cancel.changed(), if self.listening_for_cancel => {
                    Event::Cancel(changed.is_ok())
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Event::Tick
                }
            };

            match event {
                Event::Completion(Some(completion)) => self.on_completion(completion).await?,
                // The manager holds a sender, so the channel never closes while it runs.
                Event::Completion(None) => {}
                Event::Cancel(true) => {
                    if *self.cancel.borrow_and_update() {
                        self.cancel_all();
                    }
                }
                Event::Cancel(false) => self.listening_for_cancel = false,
                Event::Tick => self.on_tick(),
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.groups.iter().all(Coordinator::is_idle)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.groups.iter().filter_map(Coordinator::next_tick).min()
    }

    fn on_tick(&mut self) {
        let now = Instant::now();
        let mut exhausted = false;

        for group in self.groups.iter_mut() {
            match group.next_tick() {
                Some(due) if due <= now => {}
                _ => continue,
            }

            let next_task = &mut self.next_task;
            let tick = group.tick(
                now,
                || {
                    *next_task += 1;
                    TaskId(*next_task)
                },
                &self.template,
                &self.completions_tx,
            );
            self.stats.ticks += 1;

            if tick == Tick::Terminated(Termination::Exhausted) {
                debug!(group = %group.token(), running = group.running(), "Range pool exhausted");
                exhausted = true;
            }
        }

        if exhausted && self.groups.len() > 1 {
            self.reshape();
        }
    }

    async fn on_completion(&mut self, completion: Completion<Block<C>>) -> Result<(), ExtractError> {
        let Some(group) = self.groups.get_mut(completion.group.0) else {
            warn!(group = %completion.group, "Completion for unknown connection group");
            return Ok(());
        };

        let learned = group.on_completion(
            completion,
            &mut self.blocks,
            &mut self.ledger,
            &mut self.stats,
        )?;

        if learned.is_some() {
            self.scale_out().await;
        }
        Ok(())
    }

    /// Open one more connection if the cap allows it and work remains to share.
    async fn scale_out(&mut self) {
        if self.cancelled
            || self.scaling_stopped
            || self.groups.len() >= self.config.max_connections
            || self.groups.iter().all(|group| group.pool().is_empty())
        {
            return;
        }

        match self.connector.connect().await {
            Ok(source) => {
                let token = GroupToken(self.groups.len());
                info!(
                    group = %token,
                    "Opening connection {} of at most {}",
                    self.groups.len() + 1,
                    self.config.max_connections
                );
                self.groups
                    .push(Coordinator::new(token, source, RangePool::new(), self.config));
                self.reshape();
            }
            Err(error) => {
                warn!(
                    "Could not open another connection, continuing with {}: {error}",
                    self.groups.len()
                );
                self.scaling_stopped = true;
            }
        }
    }

    /// Redistribute every pooled range evenly across the groups.
    fn reshape(&mut self) {
        if self.cancelled {
            return;
        }

        let mut ranges: Vec<BlockRange> = self
            .groups
            .iter_mut()
            .flat_map(Coordinator::take_pool)
            .collect();
        if ranges.is_empty() {
            return;
        }
        ranges.sort_unstable();

        let pools = RangePool::split_even(ranges, self.groups.len());
        for (group, pool) in self.groups.iter_mut().zip(pools) {
            debug!(group = %group.token(), ranges = pool.len(), "Reshaped range pool");
            group.assign(pool);
        }
        self.stats.reshapes += 1;
    }

    fn cancel_all(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;

        let running: usize = self.groups.iter().map(Coordinator::running).sum();
        warn!(running, "Extraction cancelled, waiting for running workers to finish");
        for group in self.groups.iter_mut() {
            group.cancel();
        }
    }

    fn abort_all(&mut self) -> usize {
        self.groups
            .iter_mut()
            .map(|group| group.abort_all().len())
            .sum()
    }

    fn finish(mut self) -> Result<Extraction<Block<C>>, ExtractError> {
        self.stats.connections = self.groups.len();
        self.stats.ceilings = self
            .groups
            .iter()
            .map(|group| group.ceiling().get())
            .collect();
        self.stats.spawn_periods = self.groups.iter().map(Coordinator::spawn_period).collect();

        let mut missing: Vec<BlockRange> = self
            .groups
            .iter()
            .flat_map(|group| group.pool().to_sorted_vec())
            .collect();

        if !missing.is_empty() {
            missing.sort_unstable();
            warn!(
                ranges = missing.len(),
                extracted = self.blocks.len(),
                "Finished block streaming with missing ranges"
            );
            return Err(ExtractError::Interrupted {
                missing,
                extracted: self.blocks.len(),
            });
        }

        info!(
            "Finished block streaming, got {} blocks [SUCCESS]",
            self.blocks.len()
        );
        Ok(Extraction {
            blocks: self.blocks,
            stats: self.stats,
        })
    }
}
