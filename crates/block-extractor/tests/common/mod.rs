// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An in-memory block service with per-connection stream limits and injected faults.

#![allow(dead_code)]

use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use block_extractor::{
    BlockRange, BlockSource, BlockStream, Connector, ExtractError, ExtractorConfig, RangeRequest,
};
use futures::{future::BoxFuture, stream, FutureExt, StreamExt};
use tonic::{Code, Status};

/// Fail a stream when it is about to deliver `block`.
#[derive(Clone, Copy, Debug)]
pub struct Fault {
    pub block: u64,
    pub code: Code,
    /// Fire on every stream reaching `block`, not just the first.
    pub persistent: bool,
}

impl Fault {
    pub fn once(block: u64) -> Self {
        Self {
            block,
            code: Code::Unavailable,
            persistent: false,
        }
    }

    pub fn always(block: u64) -> Self {
        Self {
            block,
            code: Code::Unavailable,
            persistent: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockSettings {
    /// Streams beyond this many open on one connection are refused.
    pub stream_limit: Option<usize>,
    pub block_delay: Duration,
    pub faults: Vec<Fault>,
    /// Refuse every stream with this code.
    pub reject_with: Option<Code>,
    /// Refuse connections beyond this many.
    pub connection_limit: Option<usize>,
}

/// State shared by every connection of one mock service.
#[derive(Debug, Default)]
pub struct Shared {
    faults: Mutex<Vec<Fault>>,
    requests: Mutex<Vec<RangeRequest>>,
    connections: Mutex<Vec<Arc<ConnectionState>>>,
}

impl Shared {
    fn take_fault(&self, block: u64) -> Option<Code> {
        let mut faults = self.faults.lock().unwrap();
        let index = faults.iter().position(|fault| fault.block == block)?;
        let fault = faults[index];
        if !fault.persistent {
            faults.remove(index);
        }
        Some(fault.code)
    }
}

#[derive(Debug, Default)]
pub struct ConnectionState {
    active: AtomicUsize,
    peak: AtomicUsize,
    refused: AtomicUsize,
}

impl ConnectionState {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }
}

/// Counts a stream as open until dropped.
struct OpenStream(Arc<ConnectionState>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct MockSource {
    settings: Arc<MockSettings>,
    shared: Arc<Shared>,
    connection: Arc<ConnectionState>,
}

impl BlockSource for MockSource {
    type Block = u64;

    fn blocks(&self, request: RangeRequest) -> BoxFuture<'static, Result<BlockStream<u64>, Status>> {
        let source = self.clone();

        async move {
            source.shared.requests.lock().unwrap().push(request.clone());

            if let Some(code) = source.settings.reject_with {
                return Err(Status::new(code, "rejected by mock"));
            }

            let open = source.connection.active.fetch_add(1, Ordering::SeqCst) + 1;
            let guard = OpenStream(Arc::clone(&source.connection));
            if source.settings.stream_limit.is_some_and(|limit| open > limit) {
                source.connection.refused.fetch_add(1, Ordering::SeqCst);
                return Err(Status::resource_exhausted("too many open streams"));
            }
            source.connection.peak.fetch_max(open, Ordering::SeqCst);

            let state = (request.range.start(), request.range.end(), false, guard);
            let blocks = stream::unfold(state, move |(next, end, failed, guard)| {
                let source = source.clone();
                async move {
                    if failed || next > end {
                        return None;
                    }
                    tokio::time::sleep(source.settings.block_delay).await;
                    match source.shared.take_fault(next) {
                        Some(code) => Some((
                            Err(Status::new(code, "injected fault")),
                            (next, end, true, guard),
                        )),
                        None => Some((Ok(next), (next + 1, end, false, guard))),
                    }
                }
            });

            Ok(blocks.boxed())
        }
        .boxed()
    }

    fn block_number(block: &u64) -> Option<u64> {
        Some(*block)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    settings: Arc<MockSettings>,
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new(settings: MockSettings) -> Self {
        let shared = Shared {
            faults: Mutex::new(settings.faults.clone()),
            ..Default::default()
        };
        Self {
            settings: Arc::new(settings),
            shared: Arc::new(shared),
        }
    }

    /// Every stream request issued so far, in order.
    pub fn requests(&self) -> Vec<RangeRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn requested_ranges(&self) -> Vec<BlockRange> {
        self.requests().iter().map(|request| request.range).collect()
    }

    pub fn connections(&self) -> Vec<Arc<ConnectionState>> {
        self.shared.connections.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Source = MockSource;

    fn connect(&self) -> BoxFuture<'_, Result<MockSource, ExtractError>> {
        async move {
            let mut connections = self.shared.connections.lock().unwrap();
            if self
                .settings
                .connection_limit
                .is_some_and(|limit| connections.len() >= limit)
            {
                return Err(ExtractError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection limit reached",
                )));
            }

            let connection = Arc::new(ConnectionState::default());
            connections.push(Arc::clone(&connection));

            Ok(MockSource {
                settings: Arc::clone(&self.settings),
                shared: Arc::clone(&self.shared),
                connection,
            })
        }
        .boxed()
    }
}

pub fn config(initial_tasks: usize, workload: u64) -> ExtractorConfig {
    ExtractorConfig {
        initial_tasks,
        workload,
        ..Default::default()
    }
}

/// Assert `blocks` holds every block of `[start, end]` exactly once.
pub fn assert_exactly_once(mut blocks: Vec<u64>, start: u64, end: u64) {
    blocks.sort_unstable();
    let expected: Vec<u64> = (start..=end).collect();
    assert_eq!(blocks.len(), expected.len(), "wrong block count");
    assert_eq!(blocks, expected);
}
