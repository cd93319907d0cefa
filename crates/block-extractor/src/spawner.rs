// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic, throttled issuance of new stream workers.

use std::time::Duration;

use crate::{
    backpressure::ConcurrencyCeiling,
    range::{BlockRange, RangePool},
};

/// Why a spawner stopped issuing workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The pool was empty on a tick. Reinsertion or a reshape revives the spawner.
    Exhausted,
    /// Extraction was cancelled. Final.
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnerState {
    Idle,
    Polling,
    Terminated(Termination),
}

/// Result of one spawner tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Start a worker for this range; it has already been popped from the pool.
    Spawn(BlockRange),
    /// The ceiling is reached; nothing was popped.
    Throttled,
    Terminated(Termination),
}

/// The spawner's state machine: `Idle → Polling → Terminated`.
///
/// It owns no shared state. Each tick borrows the pool and reads the running count and
/// ceiling from the coordinator that drives it.
#[derive(Clone, Debug)]
pub struct Spawner {
    state: SpawnerState,
    period: Duration,
}

impl Spawner {
    pub fn new(period: Duration) -> Self {
        Self {
            state: SpawnerState::Idle,
            period,
        }
    }

    pub fn state(&self) -> SpawnerState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == SpawnerState::Polling
    }

    /// Whether the spawner still expects ticks.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SpawnerState::Idle | SpawnerState::Polling)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == SpawnerState::Terminated(Termination::Cancelled)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// Stop issuing workers. Running workers are not affected.
    pub fn cancel(&mut self) {
        self.state = SpawnerState::Terminated(Termination::Cancelled);
    }

    /// Resume polling after the pool was refilled. Only an exhausted spawner revives.
    pub fn revive(&mut self) -> bool {
        if self.state == SpawnerState::Terminated(Termination::Exhausted) {
            self.state = SpawnerState::Polling;
            return true;
        }
        false
    }

    pub fn tick(
        &mut self,
        pool: &mut RangePool,
        running: usize,
        ceiling: &ConcurrencyCeiling,
    ) -> Tick {
        match self.state {
            SpawnerState::Terminated(termination) => return Tick::Terminated(termination),
            SpawnerState::Idle => self.state = SpawnerState::Polling,
            SpawnerState::Polling => {}
        }

        if pool.is_empty() {
            self.state = SpawnerState::Terminated(Termination::Exhausted);
            return Tick::Terminated(Termination::Exhausted);
        }

        if !ceiling.admits(running) {
            return Tick::Throttled;
        }

        match pool.pop() {
            Some(range) => Tick::Spawn(range),
            None => Tick::Throttled,
        }
    }
}
