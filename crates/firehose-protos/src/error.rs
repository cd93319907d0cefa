// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtosError {
    #[error("Start block #{0} is beyond the largest block number a request can carry")]
    StartBlockOutOfRange(u64),

    #[error("Null block field in block response")]
    NullBlock,
}
