// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while transmitting one batch to an object store.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("object store rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: SinkError,
    },

    #[error("batch consumer is gone, dropped batch {0}")]
    ConsumerGone(String),

    #[error("{worker} task failed: {reason}")]
    Worker { worker: &'static str, reason: String },

    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
