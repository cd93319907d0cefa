// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use firehose_protos::StreamClient;
use tonic::{
    codec::CompressionEncoding,
    transport::{Channel, Uri},
};
use tracing::debug;

use crate::{
    endpoint::{Compression, FirehoseEndpoint},
    error::ClientError,
    tls,
};

pub async fn build_and_connect_channel(uri: Uri) -> Result<Channel, tonic::transport::Error> {
    if uri.scheme_str() != Some("https") {
        return Channel::builder(uri).connect().await;
    }

    let config = tls::config().clone();

    Channel::builder(uri).tls_config(config)?.connect().await
}

/// Open a new connection to the endpoint and wrap it in a streaming client.
///
/// Every call opens a distinct HTTP/2 connection; clones of the returned client
/// multiplex their streams over that one connection.
pub async fn stream_client(
    endpoint: &FirehoseEndpoint,
) -> Result<StreamClient<Channel>, ClientError> {
    debug!(uri = %endpoint.uri(), "Connecting to Firehose endpoint");

    let channel = build_and_connect_channel(endpoint.uri().clone()).await?;

    let client =
        StreamClient::new(channel).max_decoding_message_size(endpoint.max_block_size());

    Ok(match endpoint.compression() {
        Compression::Gzip => client
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip),
        Compression::None => client,
    })
}
