// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Rust Firehose Client
//!
//! Connection plumbing for the [StreamingFast Firehose](https://firehose.streamingfast.io/)
//! gRPC Stream `Block`s API: endpoint settings read from the environment, TLS,
//! channel construction and request building.
//!
//! ## Streaming a range of blocks
//!
//! ```no_run
//! # use firehose_client::{create_blocks_request, stream_client, FirehoseEndpoint, FirehoseRequest};
//! # use firehose_protos::BlocksRequested;
//! # #[tokio::main]
//! # async fn main() -> Result<(), firehose_client::ClientError> {
//! let endpoint = FirehoseEndpoint::from_env()?;
//! let mut client = stream_client(&endpoint).await?;
//!
//! let mut request = create_blocks_request(19581798, 19581807, BlocksRequested::FinalOnly)?;
//! request.insert_credentials_if_provided(&endpoint);
//!
//! let mut stream = client.blocks(request).await?.into_inner();
//! while let Some(response) = stream.message().await? {
//!     // Do something with the raw block in `response.block`.
//! }
//! # Ok(())
//! # }
//! ```

mod channel;
mod endpoint;
mod error;
mod request;
mod tls;

pub use channel::{build_and_connect_channel, stream_client};
pub use endpoint::{Compression, Credentials, FirehoseEndpoint, DEFAULT_MAX_BLOCK_SIZE};
pub use error::ClientError;
pub use request::{
    create_blocks_request, FirehoseRequest, StreamFilters, EXCLUDE_FILTER_HEADER,
    INCLUDE_FILTER_HEADER,
};
