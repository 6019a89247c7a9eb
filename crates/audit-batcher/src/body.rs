// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `http_body::Body` over a [`LineBatch`], so network sinks stream a batch in
//! fixed-size chunks with an exact length instead of buffering the payload.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};

use crate::batch::{LineBatch, ReadState};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct BatchBody {
    batch: LineBatch,
    chunk_size: usize,
    done: bool,
}

impl BatchBody {
    #[must_use]
    pub fn new(batch: LineBatch) -> Self {
        Self::with_chunk_size(batch, DEFAULT_CHUNK_SIZE)
    }

    #[must_use]
    pub fn with_chunk_size(batch: LineBatch, chunk_size: usize) -> Self {
        let done = batch.remaining() == 0;
        BatchBody {
            batch,
            chunk_size: chunk_size.max(1),
            done,
        }
    }

    /// Total bytes this body will yield.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.batch.remaining()
    }
}

impl Body for BatchBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let len = this.batch.remaining().min(this.chunk_size as u64) as usize;
        let mut chunk = BytesMut::zeroed(len);
        let (n, state) = this.batch.read_chunk(&mut chunk);
        chunk.truncate(n);
        if state == ReadState::Exhausted {
            this.done = true;
        }

        if n == 0 {
            return Poll::Ready(None);
        }
        Poll::Ready(Some(Ok(Frame::data(chunk.freeze()))))
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.batch.remaining())
    }
}
