// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! State owned by one connection group: its pool, running workers, ceiling and spawner.
//!
//! Every mutation happens on the extraction task, so none of this is shared.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    backpressure::{ConcurrencyCeiling, SpawnCadence},
    config::ExtractorConfig,
    error::ExtractError,
    extractor::ExtractionStats,
    range::{BlockRange, RangePool},
    source::{BlockSource, RangeRequest},
    spawner::{Spawner, Tick},
    worker::{spawn_worker, Completion, FailureKind, TaskId, WorkerOutcome},
};

/// Identifies the connection group a worker belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupToken(pub usize);

impl fmt::Display for GroupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Failed attempts per range lineage.
///
/// A resumed range keeps the end block of the range it was cut from, so the end block
/// identifies the lineage across any number of resumptions and reshapes.
#[derive(Debug, Default)]
pub struct RetryLedger {
    attempts: HashMap<u64, u32>,
    limit: Option<u32>,
}

impl RetryLedger {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            attempts: HashMap::new(),
            limit,
        }
    }

    /// Count a failed attempt on the lineage of `remainder`.
    pub fn record_failure(&mut self, remainder: BlockRange) -> Result<u32, ExtractError> {
        let attempts = self.attempts.entry(remainder.end()).or_default();
        *attempts += 1;

        match self.limit {
            Some(limit) if *attempts > limit => Err(ExtractError::ExhaustedRetries {
                range: remainder,
                attempts: *attempts,
            }),
            _ => Ok(*attempts),
        }
    }
}

/// Settings shared by every request a group issues.
#[derive(Clone, Debug)]
pub struct RequestTemplate {
    final_blocks_only: bool,
    include_filter: Arc<str>,
    exclude_filter: Arc<str>,
}

impl RequestTemplate {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            final_blocks_only: config.final_blocks_only,
            include_filter: config.include_filter.as_str().into(),
            exclude_filter: config.exclude_filter.as_str().into(),
        }
    }

    pub fn for_range(&self, range: BlockRange) -> RangeRequest {
        RangeRequest {
            range,
            final_blocks_only: self.final_blocks_only,
            include_filter: self.include_filter.clone(),
            exclude_filter: self.exclude_filter.clone(),
        }
    }
}

#[derive(Debug)]
struct RunningTask {
    range: BlockRange,
    handle: JoinHandle<()>,
}

/// One connection and the work scheduled on it.
pub struct Coordinator<S: BlockSource> {
    token: GroupToken,
    source: S,
    pool: RangePool,
    running: HashMap<TaskId, RunningTask>,
    ceiling: ConcurrencyCeiling,
    spawner: Spawner,
    cadence: Option<SpawnCadence>,
    next_tick: Instant,
}

impl<S: BlockSource> Coordinator<S> {
    pub fn new(token: GroupToken, source: S, pool: RangePool, config: &ExtractorConfig) -> Self {
        Self {
            token,
            source,
            pool,
            running: HashMap::new(),
            ceiling: ConcurrencyCeiling::default(),
            spawner: Spawner::new(config.spawn_period()),
            cadence: config
                .auto_adjust_frequency
                .then(|| SpawnCadence::new(config.runtime_history_len)),
            next_tick: Instant::now(),
        }
    }

    pub fn token(&self) -> GroupToken {
        self.token
    }

    pub fn pool(&self) -> &RangePool {
        &self.pool
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn ceiling(&self) -> ConcurrencyCeiling {
        self.ceiling
    }

    pub fn spawn_period(&self) -> Duration {
        self.spawner.period()
    }

    /// When the spawner wants its next tick, if it still wants any.
    pub fn next_tick(&self) -> Option<Instant> {
        self.spawner.is_active().then_some(self.next_tick)
    }

    /// Whether this group can still make progress without outside help.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && (self.pool.is_empty() || self.spawner.is_cancelled())
    }

    /// Run one spawner tick, starting a worker if the spawner hands out a range.
    pub fn tick(
        &mut self,
        now: Instant,
        task: impl FnOnce() -> TaskId,
        template: &RequestTemplate,
        completions: &mpsc::UnboundedSender<Completion<S::Block>>,
    ) -> Tick {
        debug!(
            group = %self.token,
            running = self.running.len(),
            period_ms = self.spawner.period().as_millis() as u64,
            remaining_blocks = self.pool.block_count(),
            "Spawner tick"
        );

        let tick = self
            .spawner
            .tick(&mut self.pool, self.running.len(), &self.ceiling);

        if let Tick::Spawn(range) = tick {
            let task = task();
            debug!(%task, group = %self.token, "Spawning worker for {}", range);
            let handle = spawn_worker(
                task,
                self.token,
                self.source.clone(),
                template.for_range(range),
                completions.clone(),
            );
            self.running.insert(task, RunningTask { range, handle });
        }

        self.next_tick = now + self.spawner.period();
        tick
    }

    /// Fold a worker's completion into the group state.
    ///
    /// Received blocks are appended to `blocks`. Returns the ceiling if this completion
    /// taught it.
    pub fn on_completion(
        &mut self,
        completion: Completion<S::Block>,
        blocks: &mut Vec<S::Block>,
        ledger: &mut RetryLedger,
        stats: &mut ExtractionStats,
    ) -> Result<Option<usize>, ExtractError> {
        let Completion {
            task,
            range,
            elapsed,
            outcome,
            ..
        } = completion;

        if self.running.remove(&task).is_none() {
            warn!(%task, group = %self.token, "Completion for unknown worker on {}", range);
        }

        match outcome {
            WorkerOutcome::Success(received) => {
                stats.ranges_completed += 1;
                blocks.extend(received);

                if let Some(cadence) = self.cadence.as_mut() {
                    let period = cadence.record(elapsed);
                    self.spawner.set_period(period);
                    debug!(
                        group = %self.token,
                        "Spawn period adjusted to {:.3}s",
                        period.as_secs_f64()
                    );
                }
                Ok(None)
            }
            WorkerOutcome::Failure { failure, received } => {
                stats.failures += 1;

                if failure.kind() == FailureKind::Rejected {
                    return Err(ExtractError::Rejected {
                        range: failure.range,
                        status: failure.status,
                    });
                }

                if let Some(prefix) = failure.received() {
                    debug!(
                        %task,
                        blocks = received.len(),
                        "Keeping {} received before the failure",
                        prefix
                    );
                    stats.salvaged_blocks += received.len();
                    blocks.extend(received);
                }

                let learned = match self.spawner.is_polling() && !self.pool.is_empty() {
                    true => self.ceiling.learn(self.running.len()),
                    false => None,
                };
                if let Some(ceiling) = learned {
                    warn!(
                        group = %self.token,
                        "Maximum number of tasks reached: {} tasks before exception",
                        ceiling
                    );
                }

                if let Some(remainder) = failure.resumption() {
                    let attempts = ledger.record_failure(remainder)?;
                    self.pool.reinsert(remainder);
                    stats.reinsertions += 1;
                    debug!(
                        group = %self.token,
                        attempts,
                        "Resuming {} after failure",
                        remainder
                    );
                    if self.spawner.revive() {
                        info!(group = %self.token, "Spawner resumed for reinserted ranges");
                    }
                }

                Ok(learned)
            }
        }
    }

    /// Stop issuing workers. Running workers finish on their own.
    pub fn cancel(&mut self) {
        self.spawner.cancel();
    }

    /// Abort every running worker. Their ranges are returned.
    pub fn abort_all(&mut self) -> Vec<BlockRange> {
        self.running
            .drain()
            .map(|(_, task)| {
                task.handle.abort();
                task.range
            })
            .collect()
    }

    pub fn take_pool(&mut self) -> Vec<BlockRange> {
        self.pool.drain()
    }

    /// Replace the pool, reviving an exhausted spawner if there is work again.
    pub fn assign(&mut self, pool: RangePool) {
        self.pool = pool;
        if !self.pool.is_empty() && self.spawner.revive() {
            debug!(group = %self.token, ranges = self.pool.len(), "Spawner resumed after reshape");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
    use tonic::Status;

    use super::*;
    use crate::{
        source::BlockStream,
        spawner::{SpawnerState, Termination},
        worker::StreamFailure,
    };

    /// Never called: completions are fed to the coordinator by hand.
    #[derive(Clone)]
    struct Unused;

    impl BlockSource for Unused {
        type Block = u64;

        fn blocks(
            &self,
            _request: RangeRequest,
        ) -> BoxFuture<'static, Result<BlockStream<u64>, Status>> {
            async { Ok(stream::pending().boxed()) }.boxed()
        }
    }

    struct Harness {
        coordinator: Coordinator<Unused>,
        template: RequestTemplate,
        tx: mpsc::UnboundedSender<Completion<u64>>,
        _rx: mpsc::UnboundedReceiver<Completion<u64>>,
        next_task: u64,
        blocks: Vec<u64>,
        ledger: RetryLedger,
        stats: ExtractionStats,
    }

    impl Harness {
        fn new(period: (u64, u64), workload: u64, config: ExtractorConfig) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let pool = RangePool::partition(range(period.0, period.1), workload);
            Self {
                coordinator: Coordinator::new(GroupToken(0), Unused, pool, &config),
                template: RequestTemplate::new(&config),
                tx,
                _rx: rx,
                next_task: 0,
                blocks: Vec::new(),
                ledger: RetryLedger::new(config.max_failed_block_retries),
                stats: ExtractionStats::default(),
            }
        }

        fn tick(&mut self) -> Tick {
            let next_task = &mut self.next_task;
            self.coordinator.tick(
                Instant::now(),
                || {
                    *next_task += 1;
                    TaskId(*next_task)
                },
                &self.template,
                &self.tx,
            )
        }

        fn spawned(&self) -> Vec<(TaskId, BlockRange)> {
            let mut spawned: Vec<_> = self
                .coordinator
                .running
                .iter()
                .map(|(task, running)| (*task, running.range))
                .collect();
            spawned.sort();
            spawned
        }

        fn complete(
            &mut self,
            task: TaskId,
            range: BlockRange,
            outcome: WorkerOutcome<u64>,
        ) -> Result<Option<usize>, ExtractError> {
            let completion = Completion {
                task,
                group: GroupToken(0),
                range,
                elapsed: Duration::from_millis(500),
                outcome,
            };
            self.coordinator.on_completion(
                completion,
                &mut self.blocks,
                &mut self.ledger,
                &mut self.stats,
            )
        }
    }

    fn range(start: u64, end: u64) -> BlockRange {
        BlockRange::new(start, end).unwrap()
    }

    fn failure(range: BlockRange, next_block: u64, status: Status) -> WorkerOutcome<u64> {
        WorkerOutcome::Failure {
            failure: StreamFailure {
                range,
                next_block,
                status,
            },
            received: (range.start()..next_block).collect(),
        }
    }

    #[tokio::test]
    async fn test_failure_reinserts_exact_remainder() {
        let mut harness = Harness::new((0, 999), 100, ExtractorConfig::default());
        for _ in 0..10 {
            harness.tick();
        }
        let (task, failed) = harness.spawned()[0];

        let learned = harness
            .complete(task, failed, failure(failed, failed.start() + 40, Status::unavailable("")))
            .unwrap();

        // The pool was exhausted: the ceiling stays unset.
        assert_eq!(learned, None);
        assert_eq!(
            harness.coordinator.pool().to_sorted_vec(),
            vec![range(failed.start() + 40, failed.end())]
        );
        assert_eq!(harness.blocks.len(), 40);
        assert_eq!(harness.stats.salvaged_blocks, 40);
    }

    #[tokio::test]
    async fn test_ceiling_learned_from_running_count() {
        let mut harness = Harness::new((0, 999), 100, ExtractorConfig::default());
        for _ in 0..6 {
            harness.tick();
        }
        let (task, failed) = harness.spawned()[5];

        let learned = harness
            .complete(task, failed, failure(failed, failed.start(), Status::resource_exhausted("")))
            .unwrap();

        assert_eq!(learned, Some(5));
        assert_eq!(harness.coordinator.ceiling().get(), Some(5));
        assert_eq!(harness.coordinator.running(), 5);
        assert_eq!(harness.coordinator.pool().len(), 5);

        // Saturated: the next tick pops nothing.
        assert_eq!(harness.tick(), Tick::Throttled);
        assert_eq!(harness.coordinator.pool().len(), 5);

        // A second failure never changes the ceiling.
        let (task, failed) = harness.spawned()[0];
        let learned = harness
            .complete(task, failed, failure(failed, failed.start(), Status::unavailable("")))
            .unwrap();
        assert_eq!(learned, None);
        assert_eq!(harness.coordinator.ceiling().get(), Some(5));
    }

    #[tokio::test]
    async fn test_failure_after_exhaustion_revives_spawner() {
        let mut harness = Harness::new((0, 99), 100, ExtractorConfig::default());
        harness.tick();
        assert_eq!(harness.tick(), Tick::Terminated(Termination::Exhausted));

        let (task, failed) = harness.spawned()[0];
        harness
            .complete(task, failed, failure(failed, 70, Status::unavailable("")))
            .unwrap();

        assert_eq!(harness.coordinator.spawner.state(), SpawnerState::Polling);
        assert_eq!(harness.tick(), Tick::Spawn(range(70, 99)));
        assert!(harness.coordinator.ceiling().get().is_none());
    }

    #[tokio::test]
    async fn test_rejected_stream_is_fatal() {
        let mut harness = Harness::new((0, 999), 100, ExtractorConfig::default());
        harness.tick();
        let (task, failed) = harness.spawned()[0];

        let result = harness.complete(
            task,
            failed,
            failure(failed, failed.start(), Status::unauthenticated("bad key")),
        );

        assert!(matches!(result, Err(ExtractError::Rejected { range, .. }) if range == failed));
    }

    #[tokio::test]
    async fn test_retries_are_bounded_per_lineage() {
        let config = ExtractorConfig {
            max_failed_block_retries: Some(1),
            ..Default::default()
        };
        let mut harness = Harness::new((0, 99), 100, config);
        harness.tick();

        let (task, failed) = harness.spawned()[0];
        harness
            .complete(task, failed, failure(failed, 10, Status::unavailable("")))
            .unwrap();

        harness.tick();
        let (task, resumed) = harness.spawned()[0];
        assert_eq!(resumed, range(10, 99));
        let result = harness.complete(task, resumed, failure(resumed, 20, Status::unavailable("")));

        assert!(matches!(
            result,
            Err(ExtractError::ExhaustedRetries { range: r, attempts: 2 }) if r == range(20, 99)
        ));
    }

    #[tokio::test]
    async fn test_success_adapts_spawn_period() {
        let config = ExtractorConfig {
            auto_adjust_frequency: true,
            ..Default::default()
        };
        let mut harness = Harness::new((0, 99), 100, config);
        harness.tick();
        let (task, done) = harness.spawned()[0];

        harness
            .complete(task, done, WorkerOutcome::Success((0..100).collect()))
            .unwrap();

        assert_eq!(harness.coordinator.spawn_period(), Duration::from_millis(400));
        assert_eq!(harness.blocks.len(), 100);
        assert_eq!(harness.stats.ranges_completed, 1);
        assert!(harness.coordinator.is_idle());
    }

    #[tokio::test]
    async fn test_fixed_period_without_auto_adjust() {
        let mut harness = Harness::new((0, 99), 100, ExtractorConfig::default());
        harness.tick();
        let (task, done) = harness.spawned()[0];

        harness
            .complete(task, done, WorkerOutcome::Success((0..100).collect()))
            .unwrap();

        assert_eq!(harness.coordinator.spawn_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_ledger_follows_lineage() {
        let mut ledger = RetryLedger::new(Some(2));

        assert_eq!(ledger.record_failure(range(0, 99)).unwrap(), 1);
        assert_eq!(ledger.record_failure(range(40, 99)).unwrap(), 2);
        assert_eq!(ledger.record_failure(range(100, 199)).unwrap(), 1);
        assert!(ledger.record_failure(range(60, 99)).is_err());
    }
}
