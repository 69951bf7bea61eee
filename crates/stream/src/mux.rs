// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance stdout/stderr fan-out to the EventEmitter (§4.5).
//!
//! Raw byte chunks are forwarded with their original read boundaries
//! preserved best-effort; this is deliberately not line-oriented.

use std::sync::Arc;

use parking_lot::Mutex;
use procd_bus::EventEmitter;
use procd_core::Event;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::ring::{RingBuffer, DEFAULT_RING_CAPACITY};

const READ_CHUNK_SIZE: usize = 8192;

/// Handle to one spawned output fan-out loop (one per instance/label pair).
pub struct StreamHandle {
    ring: Arc<Mutex<RingBuffer>>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Recent backlog for this stream; not replayed to new subscribers by
    /// default (§4.5) — callers opt in by calling this explicitly.
    pub fn backlog(&self) -> Vec<u8> {
        self.ring.lock().snapshot()
    }

    /// Stop forwarding. Called when the owning instance exits (§5: "all
    /// timers/resources associated with a terminated instance are released
    /// at `exit`").
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Fans output pipes out to the bus and input pipes in from multiple
/// producers (the input side lives in [`crate::stdin`]).
#[derive(Clone)]
pub struct StreamMux {
    bus: EventEmitter,
}

impl StreamMux {
    pub fn new(bus: EventEmitter) -> Self {
        Self { bus }
    }

    /// Spawn a read loop forwarding `reader`'s chunks to `stream.<os_pid>.<label>`
    /// until EOF or a read error.
    pub fn spawn_output_stream(
        &self,
        os_pid: u32,
        label: impl Into<String>,
        mut reader: Box<dyn AsyncRead + Unpin + Send>,
    ) -> StreamHandle {
        let label = label.into();
        let bus = self.bus.clone();
        let ring = Arc::new(Mutex::new(RingBuffer::new(DEFAULT_RING_CAPACITY)));
        let ring_for_task = Arc::clone(&ring);

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = buf[..n].to_vec();
                        ring_for_task.lock().push(&chunk);
                        bus.publish(Event::Stream {
                            os_pid,
                            label: label.clone(),
                            data: chunk,
                        });
                    }
                    Err(err) => {
                        tracing::debug!(os_pid, %label, %err, "stream reader ended");
                        break;
                    }
                }
            }
        });

        StreamHandle { ring, task }
    }
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
