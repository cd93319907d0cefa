// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Feedback from completed workers: the learned concurrency ceiling and the adaptive
//! spawn period.

use std::{collections::VecDeque, time::Duration};

/// Spawn slightly faster than the observed mean task runtime.
pub const SPAWN_PERIOD_FACTOR: f64 = 0.8;

/// Floor for the adaptive spawn period.
pub const MIN_SPAWN_PERIOD: Duration = Duration::from_millis(1);

/// Maximum number of concurrently running workers on one connection.
///
/// Unset until the first failure observed while work is still being handed out. It is
/// set exactly once and never changes afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConcurrencyCeiling(Option<usize>);

impl ConcurrencyCeiling {
    pub fn get(&self) -> Option<usize> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Whether one more worker may start while `running` workers are in flight.
    pub fn admits(&self, running: usize) -> bool {
        self.0.map_or(true, |ceiling| running < ceiling)
    }

    /// Learn the ceiling from the number of workers still running once the failed one
    /// has been removed.
    ///
    /// Returns the new ceiling the first time, `None` afterwards. The ceiling is at least
    /// one, so a connection that failed its only stream can still make progress.
    pub fn learn(&mut self, running: usize) -> Option<usize> {
        if self.0.is_some() {
            return None;
        }
        let ceiling = running.max(1);
        self.0 = Some(ceiling);
        Some(ceiling)
    }
}

/// Rolling history of successful task runtimes driving the spawn period.
#[derive(Clone, Debug)]
pub struct SpawnCadence {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl SpawnCadence {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a successful task runtime and return the spawn period to use from now on.
    pub fn record(&mut self, runtime: Duration) -> Duration {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(runtime);

        self.mean()
            .mul_f64(SPAWN_PERIOD_FACTOR)
            .max(MIN_SPAWN_PERIOD)
    }

    pub fn mean(&self) -> Duration {
        match self.history.len() {
            0 => Duration::ZERO,
            len => self.history.iter().sum::<Duration>() / len as u32,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
