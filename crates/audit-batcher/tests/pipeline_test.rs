// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use audit_batcher::{
    batch::LineBatch,
    config::PipelineConfig,
    errors::{PipelineError, SinkError},
    pipeline::Pipeline,
    sinks::{http::HttpSink, ObjectSink, UploadReceipt},
};
use mockito::{Matcher, Server};
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::sync::{oneshot, Semaphore};
use tokio::time::{sleep, timeout, Duration};

/// In-memory sink. Uploads wait for a permit when gated and fail when
/// `fail` is set.
struct MemorySink {
    uploads: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    fail: bool,
}

impl MemorySink {
    fn new() -> Self {
        MemorySink {
            uploads: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: None,
            fail: false,
        }
    }

    fn gated() -> Self {
        MemorySink {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    fn failing() -> Self {
        MemorySink {
            fail: true,
            ..Self::new()
        }
    }

    fn bodies(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectSink for MemorySink {
    async fn upload(&self, key: &str, mut batch: LineBatch) -> Result<UploadReceipt, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.fail {
            return Err(SinkError::Transport("connection reset".to_string()));
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

/// Hands out one line per read and counts how many lines were requested.
struct LineFeed {
    lines: Vec<Vec<u8>>,
    served: Arc<AtomicUsize>,
}

impl LineFeed {
    fn new(lines: &[&str], served: Arc<AtomicUsize>) -> Self {
        LineFeed {
            lines: lines.iter().rev().map(|l| format!("{l}\n").into_bytes()).collect(),
            served,
        }
    }
}

impl AsyncRead for LineFeed {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(line) = self.lines.pop() {
            assert!(buf.remaining() >= line.len());
            buf.put_slice(&line);
            self.served.fetch_add(1, Ordering::SeqCst);
        }
        Poll::Ready(Ok(()))
    }
}

fn config(batch_lines: usize, queue_depth: usize) -> PipelineConfig {
    PipelineConfig {
        batch_lines,
        queue_depth,
        ..Default::default()
    }
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn end_of_input_ships_partial_batch() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(config(10, 10), sink.clone()).unwrap();

    let report = timeout(
        Duration::from_secs(5),
        pipeline.run(&b"x\ny\n"[..], std::future::pending()),
    )
    .await
    .expect("pipeline did not finish at end of input")
    .unwrap();

    assert_eq!(report.producer.batches_emitted, 1);
    assert_eq!(report.consumer.batches_uploaded, 1);
    assert_eq!(sink.bodies(), vec!["x\ny\n".to_string()]);

    let uploads = sink.uploads.lock().unwrap();
    let key = &uploads[0].0;
    assert!(key.starts_with("vault/audit/"), "unexpected key {key}");
    assert!(key.ends_with(".log"), "unexpected key {key}");
}

#[tokio::test]
async fn batches_are_uploaded_in_order_with_increasing_keys() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(config(2, 1), sink.clone()).unwrap();
    let input = b"1\n2\n3\n4\n5\n6\n7\n";

    let report = timeout(
        Duration::from_secs(5),
        pipeline.run(&input[..], std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.producer.lines_read, 7);
    assert_eq!(report.consumer.batches_uploaded, 4);
    assert_eq!(sink.bodies(), vec!["1\n2\n", "3\n4\n", "5\n6\n", "7\n"]);

    let uploads = sink.uploads.lock().unwrap();
    let keys: Vec<&String> = uploads.iter().map(|(key, _)| key).collect();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]), "{keys:?}");
}

#[tokio::test]
async fn slow_sink_blocks_the_producer() {
    let sink = Arc::new(MemorySink::gated());
    let served = Arc::new(AtomicUsize::new(0));
    let input = BufReader::new(LineFeed::new(&["a", "b", "c", "d", "e"], served.clone()));
    let pipeline = Pipeline::new(config(1, 1), sink.clone()).unwrap();

    let run = tokio::spawn(pipeline.run(input, std::future::pending()));

    // one batch held by the sink, one in the queue, one waiting to be sent
    wait_for("the producer to stall", || served.load(Ordering::SeqCst) >= 4).await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(served.load(Ordering::SeqCst), 4);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    assert!(sink.bodies().is_empty());

    sink.gate.as_ref().unwrap().add_permits(16);

    let report = timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(served.load(Ordering::SeqCst), 5);
    assert_eq!(report.consumer.batches_uploaded, 5);
    assert_eq!(sink.bodies(), vec!["a\n", "b\n", "c\n", "d\n", "e\n"]);
}

#[tokio::test]
async fn failed_upload_stops_the_pipeline() {
    let sink = Arc::new(MemorySink::failing());
    let pipeline = Pipeline::new(config(1, 1), sink.clone()).unwrap();
    let input = b"a\nb\nc\nd\ne\nf\n";

    let result = timeout(
        Duration::from_secs(5),
        pipeline.run(&input[..], std::future::pending()),
    )
    .await
    .expect("pipeline did not stop after a failed upload");

    match result {
        Err(PipelineError::Upload { key, source }) => {
            assert!(key.starts_with("vault/audit/"));
            assert!(matches!(source, SinkError::Transport(_)));
        }
        other => panic!("expected upload error, got {other:?}"),
    }
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_drains_open_and_queued_batches() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(config(2, 4), sink.clone()).unwrap();
    let (reader, mut writer) = tokio::io::duplex(1024);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let run = tokio::spawn(pipeline.run(BufReader::new(reader), async move {
        let _ = shutdown_rx.await;
    }));

    writer.write_all(b"l1\nl2\nl3\n").await.unwrap();
    // the first batch only ships once the third line has been read
    wait_for("the first upload", || !sink.bodies().is_empty()).await;

    shutdown_tx.send(()).unwrap();
    let report = timeout(Duration::from_secs(5), run)
        .await
        .expect("pipeline did not stop after shutdown")
        .unwrap()
        .unwrap();

    assert_eq!(report.producer.lines_read, 3);
    assert_eq!(report.producer.batches_dropped, 0);
    assert_eq!(report.consumer.batches_uploaded, 2);
    assert_eq!(sink.bodies(), vec!["l1\nl2\n", "l3\n"]);

    // input was never closed
    drop(writer);
}

#[tokio::test]
async fn pipeline_ships_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", Matcher::Regex(r"^/audit/\d{4}/\d{2}/\d{2}/\d{2}/\d{4}\.\d{6}\.log$".to_string()))
        .match_header("content-type", "text/plain")
        .with_status(200)
        .with_header("etag", "\"abc\"")
        .expect(2)
        .create_async()
        .await;

    let sink = Arc::new(HttpSink::new(&server.url(), Duration::from_secs(5)).unwrap());
    let config = PipelineConfig {
        batch_lines: 2,
        queue_depth: 2,
        key_root: "audit".to_string(),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, sink).unwrap();

    let report = timeout(
        Duration::from_secs(10),
        pipeline.run(&b"one\ntwo\nthree\n"[..], std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();

    mock.assert_async().await;
    assert_eq!(report.consumer.batches_uploaded, 2);
    assert_eq!(report.consumer.bytes_uploaded, 14);
}
