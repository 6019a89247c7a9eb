// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Receives completed batches and uploads them one at a time, in order.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::batch::LineBatch;
use crate::errors::PipelineError;
use crate::sinks::ObjectSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches_uploaded: u64,
    pub bytes_uploaded: u64,
}

pub struct BatchConsumer {
    sink: Arc<dyn ObjectSink>,
    rx: mpsc::Receiver<LineBatch>,
    cancel_token: CancellationToken,
    drain_on_shutdown: bool,
    stats: ConsumerStats,
}

impl BatchConsumer {
    #[must_use]
    pub fn new(
        sink: Arc<dyn ObjectSink>,
        rx: mpsc::Receiver<LineBatch>,
        cancel_token: CancellationToken,
        drain_on_shutdown: bool,
    ) -> Self {
        BatchConsumer {
            sink,
            rx,
            cancel_token,
            drain_on_shutdown,
            stats: ConsumerStats::default(),
        }
    }

    /// Uploads batches until the channel closes or shutdown is requested.
    ///
    /// With draining enabled, a shutdown request only stops the wait for
    /// cancellation: batches already queued, and the producer's final batch,
    /// are still uploaded before the channel closes. The first failed upload
    /// ends the loop with an error.
    pub async fn run(mut self) -> Result<ConsumerStats, PipelineError> {
        let mut draining = false;

        loop {
            let batch = tokio::select! {
                received = self.rx.recv() => match received {
                    Some(batch) => batch,
                    None => break,
                },
                () = self.cancel_token.cancelled(), if !draining => {
                    if !self.drain_on_shutdown {
                        info!("shutdown requested, {} queued batches left unsent", self.rx.len());
                        break;
                    }
                    info!("shutdown requested, draining queued batches");
                    draining = true;
                    continue;
                }
            };

            self.transmit(batch).await?;
        }

        info!(
            batches = self.stats.batches_uploaded,
            bytes = self.stats.bytes_uploaded,
            "consumer finished"
        );
        Ok(self.stats)
    }

    async fn transmit(&mut self, batch: LineBatch) -> Result<(), PipelineError> {
        let key = batch.name().to_string();
        let lines = batch.count();
        let bytes = batch.size();
        info!(batch = key.as_str(), lines, bytes, "uploading batch");

        let time = Instant::now();
        match self.sink.upload(&key, batch).await {
            Ok(receipt) => {
                info!(
                    batch = key.as_str(),
                    location = receipt.location.as_str(),
                    bytes = receipt.bytes,
                    etag = receipt.etag.as_deref().unwrap_or(""),
                    elapsed_ms = time.elapsed().as_millis() as u64,
                    "uploaded batch"
                );
                self.stats.batches_uploaded += 1;
                self.stats.bytes_uploaded += receipt.bytes;
                Ok(())
            }
            Err(e) => {
                error!(
                    batch = key.as_str(),
                    elapsed_ms = time.elapsed().as_millis() as u64,
                    "failed to upload batch: {e}"
                );
                Err(PipelineError::Upload { key, source: e })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::SinkError;
    use crate::sinks::UploadReceipt;
    use async_trait::async_trait;
    use std::io::Read;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingSink {
        uploads: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ObjectSink for RecordingSink {
        async fn upload(&self, key: &str, mut batch: LineBatch) -> Result<UploadReceipt, SinkError> {
            if self.fail_on.as_deref() == Some(key) {
                return Err(SinkError::Rejected {
                    status: 500,
                    body: "InternalError".to_string(),
                });
            }
            let mut body = String::new();
            batch.read_to_string(&mut body)?;
            let bytes = body.len() as u64;
            self.uploads.lock().unwrap().push((key.to_string(), body));
            Ok(UploadReceipt {
                location: format!("mem://{key}"),
                bytes,
                etag: None,
            })
        }
    }

    fn batch(name: &str, lines: &[&str]) -> LineBatch {
        let mut batch = LineBatch::new(name, lines.len());
        for line in lines {
            batch.write_line(line.as_bytes());
        }
        batch
    }

    #[tokio::test]
    #[traced_test]
    async fn test_uploads_in_order_until_channel_closes() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(4);
        let consumer = BatchConsumer::new(sink.clone(), rx, CancellationToken::new(), true);

        tx.send(batch("one", &["a", "b"])).await.unwrap();
        tx.send(batch("two", &["c"])).await.unwrap();
        drop(tx);

        let stats = consumer.run().await.unwrap();
        assert_eq!(stats.batches_uploaded, 2);
        assert_eq!(stats.bytes_uploaded, 6);

        let uploads = sink.uploads.lock().unwrap();
        assert_eq!(
            *uploads,
            vec![
                ("one".to_string(), "a\nb\n".to_string()),
                ("two".to_string(), "c\n".to_string()),
            ]
        );
        assert!(logs_contain("uploaded batch"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_upload_stops_consumer() {
        let sink = Arc::new(RecordingSink {
            fail_on: Some("one".to_string()),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(4);
        let consumer = BatchConsumer::new(sink.clone(), rx, CancellationToken::new(), true);

        tx.send(batch("one", &["a"])).await.unwrap();
        tx.send(batch("two", &["b"])).await.unwrap();

        let result = consumer.run().await;
        match result {
            Err(PipelineError::Upload { key, .. }) => assert_eq!(key, "one"),
            other => panic!("expected upload error, got {other:?}"),
        }
        assert!(sink.uploads.lock().unwrap().is_empty());
        assert!(logs_contain("failed to upload batch"));
        // receiver is gone, so the producer side sees a closed channel
        assert!(tx.send(batch("three", &["c"])).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_without_drain_stops_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(4);
        let cancel_token = CancellationToken::new();
        let consumer = BatchConsumer::new(sink.clone(), rx, cancel_token.clone(), false);

        cancel_token.cancel();
        let stats = consumer.run().await;
        assert_eq!(stats.unwrap(), ConsumerStats::default());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_with_drain_uploads_queued_batches() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(4);
        let cancel_token = CancellationToken::new();
        let consumer = BatchConsumer::new(sink.clone(), rx, cancel_token.clone(), true);

        tx.send(batch("one", &["a"])).await.unwrap();
        tx.send(batch("two", &["b"])).await.unwrap();
        cancel_token.cancel();

        let task = tokio::spawn(consumer.run());
        tx.send(batch("three", &["c"])).await.unwrap();
        drop(tx);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.batches_uploaded, 3);
        let keys: Vec<String> = sink
            .uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(keys, vec!["one", "two", "three"]);
    }
}
