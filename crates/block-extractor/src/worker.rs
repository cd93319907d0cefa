// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stream workers: each one streams a single range and reports back exactly once.

use std::{fmt, time::Duration};

use futures::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tonic::{Code, Status};
use tracing::{debug, error, trace, warn};

use crate::{
    coordinator::GroupToken,
    range::BlockRange,
    source::{BlockSource, RangeRequest},
};

/// Cap on the per-worker buffer reserved up front.
const MAX_PREALLOCATED_BLOCKS: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{:02}", self.0)
    }
}

/// How the coordinator should react to a failed stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Resume the rest of the range later.
    Transient,
    /// Retrying cannot help; the extraction fails.
    Rejected,
}

impl From<Code> for FailureKind {
    fn from(code: Code) -> Self {
        match code {
            Code::Unauthenticated | Code::PermissionDenied | Code::InvalidArgument => {
                FailureKind::Rejected
            }
            _ => FailureKind::Transient,
        }
    }
}

/// A stream that broke before delivering its whole range.
#[derive(Debug)]
pub struct StreamFailure {
    /// The range the worker was asked to stream.
    pub range: BlockRange,
    /// First block of `range` not received.
    pub next_block: u64,
    pub status: Status,
}

impl StreamFailure {
    pub fn kind(&self) -> FailureKind {
        self.status.code().into()
    }

    /// What is left to fetch: exactly `[next_block, range.end]`.
    pub fn resumption(&self) -> Option<BlockRange> {
        self.range.resume_from(self.next_block)
    }

    /// What was received before the stream broke.
    pub fn received(&self) -> Option<BlockRange> {
        self.range.received_before(self.next_block)
    }

    pub fn remaining(&self) -> u64 {
        self.resumption().map_or(0, |range| range.len())
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block streaming failed for block #{} in range {} ({} blocks remaining): {}",
            self.next_block,
            self.range,
            self.remaining(),
            self.status.message()
        )
    }
}

impl std::error::Error for StreamFailure {}

/// What a worker hands back to its coordinator.
#[derive(Debug)]
pub enum WorkerOutcome<B> {
    /// Every block of the range, in stream order.
    Success(Vec<B>),
    /// The stream broke; `received` holds what arrived before, in stream order.
    Failure {
        failure: StreamFailure,
        received: Vec<B>,
    },
}

/// Completion notice sent over the coordinator's channel.
#[derive(Debug)]
pub struct Completion<B> {
    pub task: TaskId,
    pub group: GroupToken,
    pub range: BlockRange,
    pub elapsed: Duration,
    pub outcome: WorkerOutcome<B>,
}

/// Stream `request.range` to the end, collecting every block.
///
/// The next expected block is tracked from the block numbers the transport reports, or by
/// counting items when it reports none.
pub async fn stream_range<S: BlockSource>(
    source: &S,
    request: RangeRequest,
    task: TaskId,
) -> WorkerOutcome<S::Block> {
    let range = request.range;
    let mut received = Vec::with_capacity(range.len().min(MAX_PREALLOCATED_BLOCKS) as usize);
    let mut next_block = range.start();

    debug!(%task, "Starting streaming blocks from #{} to #{}...", range.start(), range.end());

    let mut stream = match source.blocks(request).await {
        Ok(stream) => stream,
        Err(status) => return failed(task, range, next_block, status, received),
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(block) => {
                let number = S::block_number(&block).unwrap_or(next_block);
                trace!(
                    %task,
                    "Getting block number #{} ({} remaining)",
                    number,
                    range.end().saturating_sub(number)
                );
                next_block = next_block.max(number.saturating_add(1));
                received.push(block);
            }
            Err(status) => {
                drop(stream);
                return failed(task, range, next_block, status, received);
            }
        }
    }

    debug!(%task, blocks = received.len(), "Done streaming range {}", range);

    WorkerOutcome::Success(received)
}

fn failed<B>(
    task: TaskId,
    range: BlockRange,
    next_block: u64,
    status: Status,
    received: Vec<B>,
) -> WorkerOutcome<B> {
    if next_block > range.end() {
        warn!(%task, %status, "Stream for {} broke after its last block", range);
        return WorkerOutcome::Success(received);
    }

    let failure = StreamFailure {
        range,
        next_block,
        status,
    };
    error!(%task, "{failure}");

    WorkerOutcome::Failure { failure, received }
}

/// Start a worker on its own task. Its completion is always sent, except when the
/// receiving coordinator is already gone.
pub fn spawn_worker<S: BlockSource>(
    task: TaskId,
    group: GroupToken,
    source: S,
    request: RangeRequest,
    completions: mpsc::UnboundedSender<Completion<S::Block>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let range = request.range;

        let outcome = stream_range(&source, request, task).await;

        let completion = Completion {
            task,
            group,
            range,
            elapsed: started.elapsed(),
            outcome,
        };
        if completions.send(completion).is_err() {
            debug!(%task, "Coordinator is gone, dropping completion for {}", range);
        }
    })
}
