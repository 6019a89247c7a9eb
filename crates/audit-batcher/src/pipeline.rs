// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires a [`BatchProducer`] to a [`BatchConsumer`] through a bounded channel.
//!
//! ```text
//!   input ──> BatchProducer ──mpsc(queue_depth)──> BatchConsumer ──> ObjectSink
//!                  ^                                     ^
//!                  └──────── CancellationToken ──────────┘
//! ```
//!
//! A run ends when the shutdown future resolves, when input ends and every
//! batch is uploaded, or when an upload fails. Both workers observe the same
//! cancellation token; the producer flushes its open batch and closes the
//! channel, and the consumer drains what is queued (unless draining is off).

use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::consumer::{BatchConsumer, ConsumerStats};
use crate::errors::{ConfigError, PipelineError};
use crate::namer::{BatchNamer, Clock};
use crate::producer::{BatchLimits, BatchProducer, ProducerStats};
use crate::sinks::ObjectSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub producer: ProducerStats,
    pub consumer: ConsumerStats,
}

pub struct Pipeline {
    config: PipelineConfig,
    sink: Arc<dyn ObjectSink>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn ObjectSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Pipeline { config, sink })
    }

    /// Runs until `shutdown` resolves, input ends, or an upload fails.
    pub async fn run<R, F>(self, input: R, shutdown: F) -> Result<PipelineReport, PipelineError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let namer = BatchNamer::new(&self.config.key_root);
        self.run_with_namer(input, namer, shutdown).await
    }

    pub async fn run_with_namer<R, C, F>(
        self,
        input: R,
        namer: BatchNamer<C>,
        shutdown: F,
    ) -> Result<PipelineReport, PipelineError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        C: Clock + 'static,
        F: Future<Output = ()>,
    {
        let Pipeline { config, sink } = self;

        let (tx, rx) = mpsc::channel(config.queue_depth);
        let cancel_token = CancellationToken::new();

        let producer = BatchProducer::new(
            input,
            namer,
            BatchLimits {
                lines: config.batch_lines,
                max_bytes: config.max_batch_bytes,
            },
            tx,
            cancel_token.clone(),
        )
        .with_flush_interval(config.flush_interval);
        let consumer =
            BatchConsumer::new(sink, rx, cancel_token.clone(), config.drain_on_shutdown);

        info!(
            batch_lines = config.batch_lines,
            queue_depth = config.queue_depth,
            key_root = config.key_root.as_str(),
            "pipeline started"
        );
        let mut producer_task = tokio::spawn(producer.run());
        let mut consumer_task = tokio::spawn(consumer.run());

        tokio::pin!(shutdown);
        let early_consumer = tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                None
            }
            finished = &mut consumer_task => Some(finished),
        };
        cancel_token.cancel();

        let joined = tokio::time::timeout(config.shutdown_timeout, async {
            let consumer = match early_consumer {
                Some(finished) => finished,
                None => (&mut consumer_task).await,
            };
            let producer = (&mut producer_task).await;
            (producer, consumer)
        })
        .await;

        let Ok((producer, consumer)) = joined else {
            error!(
                "workers did not stop within {} s, aborting",
                config.shutdown_timeout.as_secs()
            );
            producer_task.abort();
            consumer_task.abort();
            return Err(PipelineError::ShutdownTimeout);
        };

        let consumer = consumer.map_err(|e| worker_failed("consumer", &e))?;
        let producer = producer.map_err(|e| worker_failed("producer", &e))?;

        // an upload failure is the root cause of anything the producer saw
        let consumer = consumer?;
        let producer = producer?;

        if producer.batches_dropped > 0 {
            warn!(
                "{} batches were not uploaded before shutdown",
                producer.batches_dropped
            );
        }
        info!(
            lines = producer.lines_read,
            batches = consumer.batches_uploaded,
            bytes = consumer.bytes_uploaded,
            "pipeline stopped"
        );
        Ok(PipelineReport { producer, consumer })
    }
}

fn worker_failed(worker: &'static str, e: &JoinError) -> PipelineError {
    error!("{worker} task failed: {e}");
    PipelineError::Worker {
        worker,
        reason: e.to_string(),
    }
}
