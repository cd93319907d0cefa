// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Firehose v2 streaming API.

pub mod request;
pub mod response;

pub use crate::pb::sf::firehose::v2::*;
