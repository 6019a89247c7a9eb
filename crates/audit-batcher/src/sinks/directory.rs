// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::batch::LineBatch;
use crate::errors::SinkError;
use crate::sinks::{ObjectSink, UploadReceipt};

/// Writes each batch to `<root>/<key>`, creating parent directories.
///
/// The file is written under a temporary name and renamed into place, so a
/// reader never sees a partial object.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySink { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.trim_start_matches('/').is_empty() || escapes {
            return Err(SinkError::InvalidConfig(format!(
                "key '{key}' does not name a file under the output directory"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn write_object(path: &Path, mut batch: LineBatch) -> io::Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".partial");
    let tmp = PathBuf::from(tmp_name);

    let mut file = io::BufWriter::new(fs::File::create(&tmp)?);
    let written = io::copy(&mut batch, &mut file)?;
    file.flush()?;
    file.get_ref().sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(written)
}

#[async_trait]
impl ObjectSink for DirectorySink {
    async fn upload(&self, key: &str, batch: LineBatch) -> Result<UploadReceipt, SinkError> {
        let path = self.object_path(key)?;
        debug!("writing batch {} to {}", key, path.display());

        let target = path.clone();
        let bytes = tokio::task::spawn_blocking(move || write_object(&target, batch))
            .await
            .map_err(|e| SinkError::Transport(format!("file writer task failed: {e}")))??;

        Ok(UploadReceipt {
            location: path.display().to_string(),
            bytes,
            etag: None,
        })
    }
}
