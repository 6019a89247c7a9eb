// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object store adapters that finished batches are uploaded to.
//!
//! A sink has a single operation: upload a named byte stream. The consumer
//! hands over ownership of the [`LineBatch`], and the sink drains it as a
//! sequential byte source while transmitting.
//!
//! - **[`s3`]**: `PutObject` to an S3 (or S3-compatible) bucket
//! - **[`http`]**: `PUT {base_url}/{key}` to any HTTP object endpoint
//! - **[`directory`]**: one file per batch under a local directory
//!
//! No adapter retries. A failed upload is reported to the consumer, which
//! stops the pipeline.

use async_trait::async_trait;

use crate::batch::LineBatch;
use crate::errors::SinkError;

pub mod directory;
pub mod http;
pub mod s3;

/// Result of a successful upload, used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Where the object ended up (URL, `s3://` URI or file path).
    pub location: String,
    pub bytes: u64,
    /// Entity tag or version reported by the store, when there is one.
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Streams `batch` to the store under `key`.
    async fn upload(&self, key: &str, batch: LineBatch) -> Result<UploadReceipt, SinkError>;
}
