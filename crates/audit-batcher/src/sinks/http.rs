// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http_body_util::BodyExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use tracing::debug;

use crate::batch::LineBatch;
use crate::body::BatchBody;
use crate::errors::SinkError;
use crate::sinks::{ObjectSink, UploadReceipt};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Uploads each batch with `PUT {base_url}/{key}`.
///
/// Works against any store that accepts plain object PUTs (pre-authorized
/// S3-compatible gateways, WebDAV, internal blob services).
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SinkError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        HttpSink {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectSink for HttpSink {
    async fn upload(&self, key: &str, batch: LineBatch) -> Result<UploadReceipt, SinkError> {
        let url = self.object_url(key);
        let body = BatchBody::new(batch);
        let bytes = body.content_length();

        let time = Instant::now();
        let resp = self
            .client
            .put(&url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_LENGTH, bytes)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(|e| SinkError::Transport(format!("PUT {url}: {e}")))?;
        let elapsed = time.elapsed();

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            "PUT {} returned {} after {} ms",
            url,
            status,
            elapsed.as_millis()
        );

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        Ok(UploadReceipt {
            location: url,
            bytes,
            etag,
        })
    }
}
