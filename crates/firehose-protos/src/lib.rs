// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Firehose Streaming Protocol Buffers in Rust
//!
//! This crate provides the Rust messages and gRPC client for the
//! [StreamingFast Firehose](https://firehose.streamingfast.io/) `sf.firehose.v2.Stream`
//! service, which answers one request with a server-side stream of blocks.
//!
//! ## Usage
//!
//! Check out `block-extractor` for an engine that splits large block ranges into many
//! concurrent [`Request`]s and recovers from broken streams.

mod error;
mod firehose_v2;
mod pb;

pub use error::ProtosError;
pub use firehose_v2::request::BlocksRequested;
/// Work with the Firehose v2 streaming API.
pub use firehose_v2::{stream_client::StreamClient, ForkStep, Request, Response};
pub use prost_wkt_types::Any;
