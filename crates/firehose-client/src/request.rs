// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use firehose_protos::{BlocksRequested, Request};
use tonic::metadata::{Ascii, MetadataValue};

use crate::{
    endpoint::{Credentials, FirehoseEndpoint},
    error::ClientError,
};

pub const INCLUDE_FILTER_HEADER: &str = "x-include-filter-expr";
pub const EXCLUDE_FILTER_HEADER: &str = "x-exclude-filter-expr";

/// Create a streaming request for the inclusive range `start_block_num..=stop_block_num`.
pub fn create_blocks_request(
    start_block_num: u64,
    stop_block_num: u64,
    blocks_requested: BlocksRequested,
) -> Result<tonic::Request<Request>, ClientError> {
    Ok(tonic::Request::new(Request::range(
        start_block_num,
        stop_block_num,
        blocks_requested,
    )?))
}

/// Include/exclude filter expressions forwarded verbatim with every request.
///
/// Empty expressions are not sent.
#[derive(Clone, Debug, Default)]
pub struct StreamFilters {
    include: Option<MetadataValue<Ascii>>,
    exclude: Option<MetadataValue<Ascii>>,
}

impl StreamFilters {
    pub fn new(include: &str, exclude: &str) -> Result<Self, ClientError> {
        Ok(Self {
            include: header_value(include)?,
            exclude: header_value(exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

fn header_value(expr: &str) -> Result<Option<MetadataValue<Ascii>>, ClientError> {
    match expr.is_empty() {
        true => Ok(None),
        false => Ok(Some(MetadataValue::from_str(expr)?)),
    }
}

pub trait FirehoseRequest {
    fn insert_credentials_if_provided(&mut self, endpoint: &FirehoseEndpoint);

    fn insert_filters(&mut self, filters: &StreamFilters);
}

impl FirehoseRequest for tonic::Request<Request> {
    fn insert_credentials_if_provided(&mut self, endpoint: &FirehoseEndpoint) {
        insert_credentials_if_provided(self, endpoint);
    }

    fn insert_filters(&mut self, filters: &StreamFilters) {
        let metadata = self.metadata_mut();
        if let Some(include) = &filters.include {
            metadata.insert(INCLUDE_FILTER_HEADER, include.clone());
        }
        if let Some(exclude) = &filters.exclude {
            metadata.insert(EXCLUDE_FILTER_HEADER, exclude.clone());
        }
    }
}

fn insert_credentials_if_provided<T>(request: &mut tonic::Request<T>, endpoint: &FirehoseEndpoint) {
    use Credentials::*;
    match endpoint.credentials() {
        Some(ApiKey(api_key)) => {
            request.metadata_mut().insert("x-api-key", api_key.clone());
        }
        Some(Bearer(token)) => {
            request.metadata_mut().insert("authorization", token.clone());
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> FirehoseEndpoint {
        FirehoseEndpoint::new("http://localhost:9000".parse().unwrap())
    }

    #[test]
    fn test_create_blocks_request() {
        let request =
            create_blocks_request(19581798, 19581807, BlocksRequested::FinalOnly).unwrap();
        let inner = request.get_ref();

        assert_eq!(inner.start_block_num, 19581798);
        assert_eq!(inner.stop_block_num, 19581807);
        assert!(inner.final_blocks_only);
    }

    #[test]
    fn test_unrepresentable_start_block() {
        let result = create_blocks_request(u64::MAX, u64::MAX, BlocksRequested::FinalOnly);
        assert!(matches!(result, Err(ClientError::Protos(_))));
    }

    #[test]
    fn test_api_key_header() {
        let endpoint = endpoint().with_api_key("secret").unwrap();
        let mut request = create_blocks_request(0, 9, BlocksRequested::All).unwrap();

        request.insert_credentials_if_provided(&endpoint);

        assert_eq!(
            request.metadata().get("x-api-key").unwrap().to_str().unwrap(),
            "secret"
        );
        assert!(request.metadata().get("authorization").is_none());
    }

    #[test]
    fn test_no_credentials_no_headers() {
        let mut request = create_blocks_request(0, 9, BlocksRequested::All).unwrap();
        request.insert_credentials_if_provided(&endpoint());
        assert!(request.metadata().is_empty());
    }

    #[test]
    fn test_filters_forwarded_verbatim() {
        let filters = StreamFilters::new("receiver == 'eosio.token'", "").unwrap();
        let mut request = create_blocks_request(0, 9, BlocksRequested::FinalOnly).unwrap();

        request.insert_filters(&filters);

        assert_eq!(
            request
                .metadata()
                .get(INCLUDE_FILTER_HEADER)
                .unwrap()
                .to_str()
                .unwrap(),
            "receiver == 'eosio.token'"
        );
        assert!(request.metadata().get(EXCLUDE_FILTER_HEADER).is_none());
    }

    #[test]
    fn test_empty_filters() {
        assert!(StreamFilters::new("", "").unwrap().is_empty());
        assert!(StreamFilters::default().is_empty());
    }
}
