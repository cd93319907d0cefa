// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Example: Stream a Range of Blocks
//!
//! This example streams a small range of blocks over a single Firehose stream, using the
//! endpoint configured in the environment (`FIREHOSE_URL`, `FIREHOSE_PORT`, ...).
use firehose_client::{create_blocks_request, stream_client, FirehoseEndpoint, FirehoseRequest};
use firehose_protos::BlocksRequested;

#[tokio::main]
async fn main() -> Result<(), firehose_client::ClientError> {
    const TOTAL_BLOCKS: u64 = 100;
    const START_BLOCK: u64 = 19581798;

    let endpoint = FirehoseEndpoint::from_env()?;
    let mut client = stream_client(&endpoint).await?;

    let mut request = create_blocks_request(
        START_BLOCK,
        START_BLOCK + TOTAL_BLOCKS - 1,
        BlocksRequested::FinalOnly,
    )?;
    request.insert_credentials_if_provided(&endpoint);

    let mut stream = client.blocks(request).await?.into_inner();

    let mut blocks = Vec::with_capacity(TOTAL_BLOCKS as usize);
    while let Some(response) = stream.message().await? {
        blocks.push(response);
    }

    assert_eq!(blocks.len(), TOTAL_BLOCKS as usize);

    println!("stream_range ran successfully");
    Ok(())
}
