// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdin fan-in: multiple producers write to one instance's stdin pipe
//! through a single serializing writer task (§4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StreamError;

/// Default queue depth for buffered stdin writes before `try_write` reports
/// [`StreamError::WouldBlock`].
pub const DEFAULT_STDIN_QUEUE_DEPTH: usize = 32;

/// Serializes writes from any number of callers onto one stdin pipe.
///
/// The background task owns the underlying writer and drains the queue in
/// order, so concurrent producers never interleave partial writes.
pub struct StdinMux {
    tx: mpsc::Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StdinMux {
    pub fn new(writer: Box<dyn AsyncWrite + Unpin + Send>, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(queue_depth.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let closed_task = Arc::clone(&closed);

        let task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(chunk) = rx.recv().await {
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            closed_task.store(true, Ordering::SeqCst);
        });

        Self { tx, closed, task }
    }

    /// Queue `data` for writing, waiting if the queue is currently full.
    pub async fn write(&self, data: Vec<u8>) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        self.tx.send(data).await.map_err(|_| StreamError::Closed)
    }

    /// Queue `data` without waiting; fails fast instead of buffering
    /// unboundedly when the writer can't keep up.
    pub fn try_write(&self, data: Vec<u8>) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        self.tx.try_send(data).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => StreamError::WouldBlock,
            mpsc::error::TrySendError::Closed(_) => StreamError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the writer task, e.g. when the owning instance has exited.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "stdin_tests.rs"]
mod tests;
