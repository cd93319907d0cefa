// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! [`BlockSource`] over the Firehose v2 `Stream/Blocks` RPC.

use std::{pin::pin, sync::Arc};

use firehose_client::{
    create_blocks_request, stream_client, FirehoseEndpoint, FirehoseRequest, StreamFilters,
};
use firehose_protos::{Any, BlocksRequested, ForkStep, Response, StreamClient};
use futures::{future::BoxFuture, stream, FutureExt, Stream, StreamExt};
use tonic::{transport::Channel, Status};
use tracing::{info, warn};

use crate::{
    error::ExtractError,
    source::{BlockSource, BlockStream, Connector, RangeRequest},
};

/// One Firehose connection. Clones share it.
#[derive(Clone, Debug)]
pub struct FirehoseSource {
    client: StreamClient<Channel>,
    endpoint: Arc<FirehoseEndpoint>,
}

impl BlockSource for FirehoseSource {
    type Block = Any;

    fn blocks(&self, request: RangeRequest) -> BoxFuture<'static, Result<BlockStream<Any>, Status>> {
        let mut client = self.client.clone();
        let endpoint = Arc::clone(&self.endpoint);

        async move {
            let filters = StreamFilters::new(&request.include_filter, &request.exclude_filter)
                .map_err(|error| Status::invalid_argument(error.to_string()))?;
            let blocks_requested = match request.final_blocks_only {
                true => BlocksRequested::FinalOnly,
                false => BlocksRequested::All,
            };

            let mut grpc_request = create_blocks_request(
                request.range.start(),
                request.range.end(),
                blocks_requested,
            )
            .map_err(|error| Status::invalid_argument(error.to_string()))?;
            grpc_request.insert_credentials_if_provided(&endpoint);
            grpc_request.insert_filters(&filters);

            let responses = client.blocks(grpc_request).await?.into_inner();

            Ok(match blocks_requested {
                BlocksRequested::FinalOnly => responses
                    .map(|message| message.and_then(block_of))
                    .boxed(),
                BlocksRequested::All => settle_fork_steps(responses),
            })
        }
        .boxed()
    }
}

fn block_of(response: Response) -> Result<Any, Status> {
    response
        .into_block()
        .map_err(|error| Status::data_loss(error.to_string()))
}

/// Apply every `StepUndo` to the blocks received before it, so only blocks still on the
/// canonical chain are yielded.
///
/// Undos can reach back arbitrarily far, so the whole stream is settled before anything is
/// yielded. If the stream breaks, the blocks settled so far come first, then the error.
fn settle_fork_steps<S>(responses: S) -> BlockStream<Any>
where
    S: Stream<Item = Result<Response, Status>> + Send + 'static,
{
    async move {
        let mut responses = pin!(responses);
        let mut settled = Vec::new();
        let mut failure = None;

        while let Some(message) = responses.next().await {
            let response = match message {
                Ok(response) => response,
                Err(status) => {
                    failure = Some(status);
                    break;
                }
            };
            if response.fork_step() == ForkStep::StepUndo {
                if settled.pop().is_none() {
                    warn!(cursor = %response.cursor, "Undo step for a block before the range");
                }
                continue;
            }
            match block_of(response) {
                Ok(block) => settled.push(block),
                Err(status) => {
                    failure = Some(status);
                    break;
                }
            }
        }

        stream::iter(settled.into_iter().map(Ok).chain(failure.map(Err)))
    }
    .flatten_stream()
    .boxed()
}

/// Opens a fresh HTTP/2 connection to the endpoint for each connection group.
#[derive(Clone, Debug)]
pub struct FirehoseConnector {
    endpoint: Arc<FirehoseEndpoint>,
}

impl FirehoseConnector {
    pub fn new(endpoint: FirehoseEndpoint) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
        }
    }

    pub fn endpoint(&self) -> &FirehoseEndpoint {
        &self.endpoint
    }
}

impl Connector for FirehoseConnector {
    type Source = FirehoseSource;

    fn connect(&self) -> BoxFuture<'_, Result<FirehoseSource, ExtractError>> {
        async move {
            let client = stream_client(&self.endpoint).await?;
            info!(uri = %self.endpoint.uri(), "Connected to Firehose");
            Ok(FirehoseSource {
                client,
                endpoint: Arc::clone(&self.endpoint),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(step: ForkStep, number: u8) -> Result<Response, Status> {
        Ok(Response {
            block: Some(Any {
                type_url: "type.googleapis.com/sf.ethereum.type.v2.Block".to_string(),
                value: vec![number],
            }),
            step: step as i32,
            cursor: format!("c{number}"),
        })
    }

    async fn settled_numbers(
        responses: Vec<Result<Response, Status>>,
    ) -> Vec<Result<u8, tonic::Code>> {
        settle_fork_steps(stream::iter(responses))
            .map(|item| item.map(|block| block.value[0]).map_err(|status| status.code()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_undone_blocks_are_dropped() {
        let responses = vec![
            response(ForkStep::StepNew, 1),
            response(ForkStep::StepNew, 2),
            response(ForkStep::StepNew, 3),
            response(ForkStep::StepUndo, 3),
            response(ForkStep::StepUndo, 2),
            response(ForkStep::StepNew, 12),
            response(ForkStep::StepNew, 13),
            response(ForkStep::StepFinal, 14),
        ];

        assert_eq!(
            settled_numbers(responses).await,
            vec![Ok(1), Ok(12), Ok(13), Ok(14)]
        );
    }

    #[tokio::test]
    async fn test_broken_stream_keeps_settled_prefix() {
        let mut responses: Vec<_> = (0..20).map(|n| response(ForkStep::StepNew, n)).collect();
        responses.push(response(ForkStep::StepUndo, 19));
        responses.push(Err(Status::unavailable("connection reset")));
        responses.push(response(ForkStep::StepNew, 99));

        let settled = settled_numbers(responses).await;

        // One block per canonical block received, so the resumption point stays exact.
        assert_eq!(settled.len(), 20);
        let prefix: Vec<_> = (0..19).map(Ok).collect();
        assert_eq!(&settled[..19], &prefix[..]);
        assert_eq!(settled[19], Err(tonic::Code::Unavailable));
    }

    #[tokio::test]
    async fn test_undo_before_range_is_ignored() {
        let responses = vec![
            response(ForkStep::StepUndo, 7),
            response(ForkStep::StepNew, 8),
        ];

        assert_eq!(settled_numbers(responses).await, vec![Ok(8)]);
    }
}
