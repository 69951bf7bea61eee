// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pushes_under_capacity_are_kept_whole() {
    let mut r = RingBuffer::new(16);
    r.push(b"hello");
    assert_eq!(r.snapshot(), b"hello");
}

#[test]
fn pushes_over_capacity_evict_oldest_bytes() {
    let mut r = RingBuffer::new(4);
    r.push(b"ab");
    r.push(b"cd");
    r.push(b"ef");
    assert_eq!(r.snapshot(), b"cdef");
}

#[test]
fn single_push_larger_than_capacity_keeps_only_the_tail() {
    let mut r = RingBuffer::new(3);
    r.push(b"abcdef");
    assert_eq!(r.snapshot(), b"def");
}

#[test]
fn empty_buffer_reports_empty() {
    let r = RingBuffer::new(8);
    assert!(r.is_empty());
    assert_eq!(r.len(), 0);
}
