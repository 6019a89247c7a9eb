// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::batch::LineBatch;
use crate::body::BatchBody;
use crate::errors::SinkError;
use crate::sinks::{ObjectSink, UploadReceipt};

pub const DEFAULT_REGION: &str = "us-west-2";

/// Settings for [`S3Sink::from_settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Shared credentials file; its `default` profile is used. When unset the
    /// standard AWS resolution chain applies (env, config files, instance role).
    pub credentials_file: Option<PathBuf>,
    /// Endpoint override for S3-compatible stores such as MinIO.
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Settings {
    #[must_use]
    pub fn new(bucket: &str) -> Self {
        S3Settings {
            bucket: bucket.to_string(),
            region: DEFAULT_REGION.to_string(),
            credentials_file: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Sink {
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        S3Sink {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Builds the S3 client from `settings` and the ambient AWS environment.
    pub async fn from_settings(settings: &S3Settings) -> Result<Self, SinkError> {
        if settings.bucket.trim().is_empty() {
            return Err(SinkError::InvalidConfig("bucket cannot be empty".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(path) = &settings.credentials_file {
            if !path.is_file() {
                return Err(SinkError::InvalidConfig(format!(
                    "credentials file {} does not exist",
                    path.display()
                )));
            }
            let files = ProfileFiles::builder()
                .with_file(ProfileFileKind::Credentials, path)
                .build();
            loader = loader.profile_files(files).profile_name("default");
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(url) = &settings.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self::new(
            aws_sdk_s3::Client::from_conf(builder.build()),
            &settings.bucket,
        ))
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn upload(&self, key: &str, batch: LineBatch) -> Result<UploadReceipt, SinkError> {
        let body = BatchBody::new(batch);
        let bytes = body.content_length();
        let content_length = i64::try_from(bytes)
            .map_err(|_| SinkError::InvalidConfig(format!("batch of {bytes} bytes is too large")))?;

        debug!("PutObject s3://{}/{} ({} bytes)", self.bucket, key, bytes);
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/plain")
            .content_length(content_length)
            .body(ByteStream::from_body_1_x(body))
            .send()
            .await
            .map_err(|e| SinkError::Transport(format!("{}", DisplayErrorContext(&e))))?;

        Ok(UploadReceipt {
            location: format!("s3://{}/{}", self.bucket, key),
            bytes,
            etag: output.e_tag().map(|t| t.trim_matches('"').to_string()),
        })
    }
}
