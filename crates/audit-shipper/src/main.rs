// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use audit_batcher::{
    config::{Destination, PipelineConfig},
    logger::{Formatter, LOG_PREFIX},
    pipeline::Pipeline,
    sinks::{
        directory::DirectorySink,
        http::{HttpSink, DEFAULT_REQUEST_TIMEOUT},
        s3::{S3Settings, S3Sink, DEFAULT_REGION},
        ObjectSink,
    },
};

/// Reads log lines from stdin and uploads them in batches.
///
/// Sizing flags override the matching `AUDIT_SHIPPER_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "audit-shipper", version)]
struct Args {
    /// Where batches go: s3://bucket, http(s)://base-url, file:///dir or a directory path
    #[arg(long, env = "AUDIT_SHIPPER_DESTINATION")]
    destination: Option<String>,

    /// S3 bucket, shorthand for --destination s3://<bucket>
    #[arg(long, env = "AUDIT_SHIPPER_BUCKET", conflicts_with = "destination")]
    bucket: Option<String>,

    /// Shared credentials file to read the default profile from
    #[arg(long, env = "AUDIT_SHIPPER_CREDENTIALS")]
    credentials: Option<PathBuf>,

    #[arg(long, env = "AUDIT_SHIPPER_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Custom S3 endpoint, e.g. http://127.0.0.1:9000
    #[arg(long, env = "AUDIT_SHIPPER_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    #[arg(long, env = "AUDIT_SHIPPER_FORCE_PATH_STYLE")]
    force_path_style: bool,

    /// Lines per batch
    #[arg(long)]
    batch_lines: Option<usize>,

    /// Completed batches that may wait for upload
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Prefix for object keys
    #[arg(long)]
    key_root: Option<String>,

    #[arg(long)]
    max_batch_bytes: Option<u64>,

    /// Ship a partial batch once it is this many seconds old
    #[arg(long)]
    flush_interval_secs: Option<u64>,

    /// Stop without uploading queued batches when a signal arrives
    #[arg(long)]
    no_drain: bool,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env_unvalidated();
        if let Some(lines) = self.batch_lines {
            config.batch_lines = lines;
        }
        if let Some(depth) = self.queue_depth {
            config.queue_depth = depth;
        }
        if let Some(root) = &self.key_root {
            config.key_root = root.clone();
        }
        if self.max_batch_bytes.is_some() {
            config.max_batch_bytes = self.max_batch_bytes;
        }
        if let Some(secs) = self.flush_interval_secs {
            config.flush_interval = Some(Duration::from_secs(secs));
        }
        if self.no_drain {
            config.drain_on_shutdown = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.to_lowercase();
        }
        config.validate()?;
        Ok(config)
    }

    fn destination(&self) -> Result<Destination> {
        match (&self.destination, &self.bucket) {
            (Some(destination), _) => Ok(destination.parse()?),
            (None, Some(bucket)) => Ok(format!("s3://{bucket}").parse()?),
            (None, None) => bail!("no destination given, use --destination or --bucket"),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.pipeline_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{LOG_PREFIX} | ERROR | {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("{LOG_PREFIX} | ERROR | {e:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args, config));

    // the stdin reader may still be parked in a blocking read
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_smithy_runtime=off,aws_config=warn,{log_level}"
    );

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_ansi(false)
        .event_format(Formatter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");
    Ok(())
}

async fn run(args: Args, config: PipelineConfig) -> Result<()> {
    let destination = args.destination()?;
    let sink = build_sink(&args, &destination).await?;
    info!("shipping stdin to {destination:?}");

    let pipeline = Pipeline::new(config, sink)?;
    let input = BufReader::new(tokio::io::stdin());
    let report = pipeline.run(input, shutdown_signal()).await?;

    info!(
        lines = report.producer.lines_read,
        batches = report.consumer.batches_uploaded,
        bytes = report.consumer.bytes_uploaded,
        "done"
    );
    Ok(())
}

async fn build_sink(args: &Args, destination: &Destination) -> Result<Arc<dyn ObjectSink>> {
    let sink: Arc<dyn ObjectSink> = match destination {
        Destination::S3 { bucket } => {
            let settings = S3Settings {
                bucket: bucket.clone(),
                region: args.region.clone(),
                credentials_file: args.credentials.clone(),
                endpoint_url: args.endpoint_url.clone(),
                force_path_style: args.force_path_style,
            };
            Arc::new(S3Sink::from_settings(&settings).await?)
        }
        Destination::Http { base_url } => {
            Arc::new(HttpSink::new(base_url, DEFAULT_REQUEST_TIMEOUT)?)
        }
        Destination::Directory(root) => Arc::new(DirectorySink::new(root.clone())),
    };
    Ok(sink)
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = terminate.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("could not listen for SIGTERM: {e}");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c, shutdown only on end of input: {e}");
        std::future::pending::<()>().await;
    }
}
