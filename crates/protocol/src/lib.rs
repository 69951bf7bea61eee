// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Wire-facing DTOs for the process supervision core (§6).
//!
//! This crate defines the request/response/spec-JSON shapes and the event
//! stream encodings as plain serializable Rust types. It does not run a
//! server: `procd-daemon` binds these types to a minimal length-prefixed
//! socket for the workspace's own integration tests, and an external HTTP/WS
//! adapter could bind the same types to the full surface without this
//! workspace implementing one.

pub mod feed;
pub mod request;
pub mod response;
pub mod spec_json;
pub mod wire;

pub use feed::{encode_event, Feed};
pub use request::{Request, ScaleSpec, StateSpec};
pub use response::Response;
pub use spec_json::SpecJson;
pub use wire::{
    decode, encode, read_message, read_request, write_message, write_response, ProtocolError,
    DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
