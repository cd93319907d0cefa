// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The transport seam between the engine and a streaming block service.

use std::sync::Arc;

use futures::{future::BoxFuture, stream::BoxStream};
use tonic::Status;

use crate::{error::ExtractError, range::BlockRange};

/// Items of one open stream, in the order the server sent them.
pub type BlockStream<B> = BoxStream<'static, Result<B, Status>>;

/// One stream request: a range plus the settings forwarded verbatim to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    pub range: BlockRange,
    pub final_blocks_only: bool,
    /// Opaque include filter expression, empty when unset.
    pub include_filter: Arc<str>,
    /// Opaque exclude filter expression, empty when unset.
    pub exclude_filter: Arc<str>,
}

/// A connection able to serve many concurrent range streams.
///
/// Cloning must be cheap and clones must share the underlying connection: every worker
/// of a group streams through its own clone.
pub trait BlockSource: Clone + Send + Sync + 'static {
    type Block: Send + 'static;

    /// Open a stream for the inclusive range of `request`.
    fn blocks(
        &self,
        request: RangeRequest,
    ) -> BoxFuture<'static, Result<BlockStream<Self::Block>, Status>>;

    /// The block number carried by a streamed item, when the transport can tell.
    ///
    /// Without it, workers assume the stream delivers every block of the range in order.
    fn block_number(_block: &Self::Block) -> Option<u64> {
        None
    }
}

/// Opens connections. The engine opens one per connection group.
pub trait Connector: Send + Sync {
    type Source: BlockSource;

    fn connect(&self) -> BoxFuture<'_, Result<Self::Source, ExtractError>>;
}
