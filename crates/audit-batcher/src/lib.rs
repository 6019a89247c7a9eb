// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batches a newline-delimited log stream into named objects and streams each
//! one to an object store.
//!
//! - **[`batch`]**: fixed-capacity line buffer readable as a byte stream
//! - **[`namer`]**: time-derived object keys
//! - **[`producer`]**: input lines into full batches, with backpressure
//! - **[`consumer`]**: ordered upload of completed batches
//! - **[`pipeline`]**: wiring, cancellation and graceful drain
//! - **[`sinks`]**: S3, HTTP and local-directory object stores

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod body;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod logger;
pub mod namer;
pub mod pipeline;
pub mod producer;
pub mod sinks;
