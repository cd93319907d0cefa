// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block ranges and the pool of ranges still waiting for a worker.

use std::{collections::HashSet, fmt};

/// An inclusive, non-empty interval of block numbers.
///
/// Ranges are values: a partially streamed range is replaced by its remainder,
/// never shrunk in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(block: u64) -> Self {
        Self {
            start: block,
            end: block,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block <= self.end
    }

    /// The part of the range still to fetch when `next` is the first block not yet received.
    pub fn resume_from(&self, next: u64) -> Option<BlockRange> {
        BlockRange::new(next.max(self.start), self.end)
    }

    /// The part of the range already received when `next` is the first block not yet received.
    pub fn received_before(&self, next: u64) -> Option<BlockRange> {
        if next <= self.start {
            return None;
        }
        BlockRange::new(self.start, (next - 1).min(self.end))
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Split `period` into `workload`-sized ranges, the last range absorbing the remainder.
///
/// A period shorter than `workload` yields a single range. A zero workload is treated as one.
pub fn partition(period: BlockRange, workload: u64) -> Vec<BlockRange> {
    let workload = workload.max(1);
    let chunks = (period.len() / workload).max(1);

    (0..chunks)
        .map(|index| {
            let start = period.start + index * workload;
            let end = match index == chunks - 1 {
                true => period.end,
                false => start + workload - 1,
            };
            BlockRange { start, end }
        })
        .collect()
}

/// Pick the effective workload so the initial tasks all get some work, without ever
/// planning more ranges than there are blocks.
///
/// Fewer blocks than `initial_tasks` collapse the whole period into a single range.
pub fn plan_workload(period: BlockRange, initial_tasks: usize, workload: u64) -> u64 {
    let total = period.len();
    let tasks = initial_tasks.max(1) as u64;

    if total < tasks {
        total
    } else if total < tasks.saturating_mul(workload) {
        (total / tasks).max(1)
    } else {
        workload.max(1)
    }
}

/// Disjoint ranges still to be fetched. Iteration and [`RangePool::pop`] order is unspecified.
#[derive(Clone, Debug, Default)]
pub struct RangePool {
    ranges: HashSet<BlockRange>,
}

impl RangePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(period: BlockRange, workload: u64) -> Self {
        partition(period, workload).into_iter().collect()
    }

    /// Remove and return an arbitrary range.
    pub fn pop(&mut self) -> Option<BlockRange> {
        let range = *self.ranges.iter().next()?;
        self.ranges.remove(&range);
        Some(range)
    }

    /// Put back a range recovered from a failed worker. Returns `false` if it was already pooled.
    pub fn reinsert(&mut self, range: BlockRange) -> bool {
        self.ranges.insert(range)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of blocks across all pooled ranges.
    pub fn block_count(&self) -> u64 {
        self.ranges.iter().map(BlockRange::len).sum()
    }

    /// Take every range out of the pool.
    pub fn drain(&mut self) -> Vec<BlockRange> {
        self.ranges.drain().collect()
    }

    /// The pooled ranges in ascending order.
    pub fn to_sorted_vec(&self) -> Vec<BlockRange> {
        let mut ranges: Vec<_> = self.ranges.iter().copied().collect();
        ranges.sort_unstable();
        ranges
    }

    /// Deal `ranges` round-robin into `parts` pools whose sizes differ by at most one.
    pub fn split_even(ranges: Vec<BlockRange>, parts: usize) -> Vec<RangePool> {
        let mut pools = vec![RangePool::new(); parts.max(1)];
        let count = pools.len();
        for (index, range) in ranges.into_iter().enumerate() {
            pools[index % count].reinsert(range);
        }
        pools
    }
}

impl FromIterator<BlockRange> for RangePool {
    fn from_iter<I: IntoIterator<Item = BlockRange>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}
