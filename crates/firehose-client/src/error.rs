// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use http::uri::InvalidUri;
use thiserror::Error;
use tonic::metadata::errors::InvalidMetadataValue;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid credentials or filter header value: {0}")]
    CredentialsInvalid(#[from] InvalidMetadataValue),

    #[error("Missing environment variable: {0}")]
    EnvVarMissing(#[from] dotenvy::Error),

    #[error("gRPC error: {0}")]
    GRpc(#[from] tonic::transport::Error),

    #[error("Invalid request: {0}")]
    Protos(#[from] firehose_protos::ProtosError),

    #[error("Invalid setting {name}: {value:?}")]
    SettingInvalid { name: &'static str, value: String },

    /// A stream failed to open or broke mid-stream.
    #[error("{0}")]
    TonicStatus(#[from] tonic::Status),

    #[error("Invalid URI: {0}")]
    UriInvalid(#[from] InvalidUri),
}
