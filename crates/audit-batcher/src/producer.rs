// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns an input line stream into a sequence of full [`LineBatch`]es.
//!
//! ```text
//!   input ──read_until('\n')──> current batch ──full?──> handoff channel
//!                                     ^                       │
//!                                     └──── new batch <───────┘
//! ```
//!
//! The producer owns exactly one batch at a time. A batch is never touched
//! again once sent. Sending blocks while the channel is full, which is how a
//! slow sink throttles ingestion.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::LineBatch;
use crate::errors::PipelineError;
use crate::namer::{BatchNamer, Clock, SystemClock};

/// Shape of the batches a producer builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub lines: usize,
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub lines_read: u64,
    pub lines_dropped: u64,
    pub batches_emitted: u64,
    /// Batches left unsent because the consumer stopped during shutdown.
    pub batches_dropped: u64,
}

pub struct BatchProducer<R, C = SystemClock> {
    input: R,
    namer: BatchNamer<C>,
    limits: BatchLimits,
    flush_interval: Option<Duration>,
    tx: mpsc::Sender<LineBatch>,
    cancel_token: CancellationToken,
    stats: ProducerStats,
}

impl<R, C> BatchProducer<R, C>
where
    R: AsyncBufRead + Unpin,
    C: Clock,
{
    #[must_use]
    pub fn new(
        input: R,
        namer: BatchNamer<C>,
        limits: BatchLimits,
        tx: mpsc::Sender<LineBatch>,
        cancel_token: CancellationToken,
    ) -> Self {
        BatchProducer {
            input,
            namer,
            limits,
            flush_interval: None,
            tx,
            cancel_token,
            stats: ProducerStats::default(),
        }
    }

    /// Ship a non-empty batch once it has been open for `interval`.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    fn start_batch(&mut self) -> LineBatch {
        let batch =
            LineBatch::with_max_bytes(self.namer.next_name(), self.limits.lines, self.limits.max_bytes);
        debug!("started batch {}", batch.name());
        batch
    }

    async fn emit(&mut self, batch: LineBatch) -> Result<(), PipelineError> {
        info!(
            batch = batch.name(),
            lines = batch.count(),
            bytes = batch.size(),
            "sending batch"
        );
        if let Err(mpsc::error::SendError(batch)) = self.tx.send(batch).await {
            warn!("batch consumer stopped, dropping batch {}", batch.name());
            if self.cancel_token.is_cancelled() {
                self.stats.batches_dropped += 1;
                return Ok(());
            }
            return Err(PipelineError::ConsumerGone(batch.name().to_string()));
        }
        self.stats.batches_emitted += 1;
        Ok(())
    }

    /// Adds `line` to `current`, or ships `current` and starts a fresh batch
    /// when it is full. Returns the batch that is open afterwards.
    async fn push_line(
        &mut self,
        mut current: LineBatch,
        line: &[u8],
    ) -> Result<LineBatch, PipelineError> {
        if current.write_line(line) {
            return Ok(current);
        }

        debug!("batch {} is full", current.name());
        self.emit(current).await?;

        let mut fresh = self.start_batch();
        if !fresh.write_line(line) {
            // only reachable with a line capacity of zero
            warn!("batch {} refused a line, dropping it", fresh.name());
            self.stats.lines_dropped += 1;
        }
        Ok(fresh)
    }

    /// Reads until end of input or cancellation, then flushes the last batch.
    pub async fn run(mut self) -> Result<ProducerStats, PipelineError> {
        let mut current = self.start_batch();
        // when the open batch received its first line
        let mut opened: Option<Instant> = None;
        let mut line = Vec::new();

        loop {
            let deadline = self
                .flush_interval
                .zip(opened)
                .map(|(interval, opened)| opened + interval);

            // `read_until` keeps partially read bytes in `line` when another
            // branch wins, so the next iteration resumes the same line.
            let read = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    info!("shutdown requested, flushing batch {}", current.name());
                    break;
                }
                () = sleep_until_deadline(deadline) => {
                    debug!("flush interval elapsed for batch {}", current.name());
                    self.emit(current).await?;
                    current = self.start_batch();
                    opened = None;
                    continue;
                }
                read = self.input.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("end of input");
                    break;
                }
                Ok(_) => {
                    self.stats.lines_read += 1;
                    current = self.push_line(current, &line).await?;
                    if current.count() == 1 {
                        opened = Some(Instant::now());
                    }
                    line.clear();
                }
                Err(e) => {
                    warn!("failed to read input line, skipping it: {e}");
                    self.stats.lines_dropped += 1;
                    line.clear();
                }
            }
        }

        if !line.is_empty() {
            self.stats.lines_read += 1;
            current = self.push_line(current, &line).await?;
        }

        if current.is_empty() {
            debug!("final batch {} is empty, not sending", current.name());
        } else {
            self.emit(current).await?;
        }

        info!(
            lines_read = self.stats.lines_read,
            lines_dropped = self.stats.lines_dropped,
            batches = self.stats.batches_emitted,
            batches_dropped = self.stats.batches_dropped,
            "producer finished"
        );
        Ok(self.stats)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
