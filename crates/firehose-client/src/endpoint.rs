// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use tonic::{
    metadata::{Ascii, MetadataValue},
    transport::Uri,
};

use crate::error::ClientError;

/// Largest decoded block accepted by default, in bytes.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 10 * 1024 * 1024;

/// Compression negotiated with the Firehose server for streamed responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    #[default]
    None,
}

impl FromStr for Compression {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "" | "none" => Ok(Compression::None),
            _ => Err(ClientError::SettingInvalid {
                name: "compression",
                value: value.to_string(),
            }),
        }
    }
}

/// How requests authenticate against the endpoint.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// Sent as the `x-api-key` header.
    ApiKey(MetadataValue<Ascii>),
    /// Sent as `authorization: Bearer <token>`.
    Bearer(MetadataValue<Ascii>),
}

/// Connection settings for a Firehose endpoint.
///
/// Header values are validated once, when the endpoint is built, so that a malformed
/// key surfaces as a setup failure rather than on every streamed request.
#[derive(Clone, Debug)]
pub struct FirehoseEndpoint {
    uri: Uri,
    credentials: Option<Credentials>,
    max_block_size: usize,
    compression: Compression,
}

impl FirehoseEndpoint {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            credentials: None,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            compression: Compression::None,
        }
    }

    /// Read the endpoint from the environment, loading a `.env` file first if one exists.
    ///
    /// `FIREHOSE_URL` and `FIREHOSE_PORT` are required. `FIREHOSE_API_KEY`, `FIREHOSE_JWT`,
    /// `FIREHOSE_MAX_BLOCK_SIZE` and `FIREHOSE_COMPRESSION` are optional.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let url = dotenvy::var("FIREHOSE_URL")?;
        let port = dotenvy::var("FIREHOSE_PORT")?;

        let mut endpoint = Self::new(format!("{}:{}", url, port).parse::<Uri>()?);

        if let Ok(api_key) = dotenvy::var("FIREHOSE_API_KEY") {
            endpoint = endpoint.with_api_key(&api_key)?;
        } else if let Ok(jwt) = dotenvy::var("FIREHOSE_JWT") {
            endpoint = endpoint.with_bearer_token(&jwt)?;
        }

        if let Ok(size) = dotenvy::var("FIREHOSE_MAX_BLOCK_SIZE") {
            let size = size
                .parse::<usize>()
                .map_err(|_| ClientError::SettingInvalid {
                    name: "FIREHOSE_MAX_BLOCK_SIZE",
                    value: size.clone(),
                })?;
            endpoint = endpoint.with_max_block_size(size);
        }

        if let Ok(compression) = dotenvy::var("FIREHOSE_COMPRESSION") {
            endpoint = endpoint.with_compression(compression.parse()?);
        }

        Ok(endpoint)
    }

    pub fn with_api_key(mut self, api_key: &str) -> Result<Self, ClientError> {
        self.credentials = Some(Credentials::ApiKey(MetadataValue::from_str(api_key)?));
        Ok(self)
    }

    pub fn with_bearer_token(mut self, jwt: &str) -> Result<Self, ClientError> {
        let value = MetadataValue::from_str(&format!("Bearer {jwt}"))?;
        self.credentials = Some(Credentials::Bearer(value));
        Ok(self)
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}
