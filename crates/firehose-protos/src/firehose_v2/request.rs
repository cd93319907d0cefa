// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::Request;
use crate::error::ProtosError;

/// Which blocks the server should send back for a streamed range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlocksRequested {
    /// Every block, including reversible ones that may later be undone.
    All,
    /// Only final (irreversible) blocks.
    #[default]
    FinalOnly,
}

impl From<BlocksRequested> for bool {
    fn from(blocks_requested: BlocksRequested) -> bool {
        match blocks_requested {
            BlocksRequested::All => false,
            BlocksRequested::FinalOnly => true,
        }
    }
}

impl Request {
    /// Create a Firehose [`Request`] streaming the inclusive range `start..=stop`.
    ///
    /// The wire start block is signed, negative values counting back from the chain head, so
    /// starts above `i64::MAX` are refused.
    pub fn range(
        start: u64,
        stop: u64,
        blocks_requested: BlocksRequested,
    ) -> Result<Request, ProtosError> {
        let start_block_num =
            i64::try_from(start).map_err(|_| ProtosError::StartBlockOutOfRange(start))?;
        Ok(Request {
            start_block_num,
            stop_block_num: stop,
            final_blocks_only: blocks_requested.into(),
            ..Default::default()
        })
    }
}
