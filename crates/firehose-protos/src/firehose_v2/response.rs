// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use prost_wkt_types::Any;

use super::{ForkStep, Response};
use crate::error::ProtosError;

impl Response {
    /// Take the chain-specific block payload out of the response.
    pub fn into_block(self) -> Result<Any, ProtosError> {
        self.block.ok_or(ProtosError::NullBlock)
    }

    /// The fork step of this response, falling back to [`ForkStep::StepUnset`]
    /// for values this client does not know.
    pub fn fork_step(&self) -> ForkStep {
        ForkStep::try_from(self.step).unwrap_or(ForkStep::StepUnset)
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_null_block_is_an_error() {
        let response = Response::default();
        assert!(matches!(response.into_block(), Err(ProtosError::NullBlock)));
    }

    #[test]
    fn test_decode_streamed_response() {
        let response = Response {
            block: Some(Any {
                type_url: "type.googleapis.com/sf.ethereum.type.v2.Block".to_string(),
                value: vec![0x18, 0x2a],
            }),
            step: ForkStep::StepFinal as i32,
            cursor: "c1".to_string(),
        };

        let decoded = Response::decode(response.encode_to_vec().as_slice()).unwrap();

        assert_eq!(decoded.fork_step(), ForkStep::StepFinal);
        assert_eq!(decoded.cursor, "c1");
        let block = decoded.into_block().unwrap();
        assert_eq!(block.value, vec![0x18, 0x2a]);
    }

    #[test]
    fn test_unknown_fork_step_is_unset() {
        let response = Response {
            step: 42,
            ..Default::default()
        };
        assert_eq!(response.fork_step(), ForkStep::StepUnset);
    }
}
