// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic pattern matching (§3 Subscription, §4.6).
//!
//! Patterns and topics are both dot-separated paths. An empty pattern
//! segment is a wildcard matching exactly one topic segment: `proc..spawn`
//! matches `proc.web.spawn` and `proc.anything.spawn`, but not
//! `proc.web.nested.spawn` (segment counts must match) nor `proc.spawn`.

/// A compiled subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Option<String>>,
}

impl Pattern {
    /// Parse a dot-separated pattern; empty segments become wildcards.
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| if s.is_empty() { None } else { Some(s.to_string()) })
            .collect();
        Self { segments }
    }

    /// Whether `topic` matches this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split('.').collect();
        if topic_segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(topic_segments.iter())
            .all(|(pattern_seg, topic_seg)| match pattern_seg {
                None => true,
                Some(literal) => literal == topic_seg,
            })
    }

    pub fn as_str_segments(&self) -> &[Option<String>] {
        &self.segments
    }
}

impl std::fmt::Display for Pattern {
    /// Reconstructs the dot-separated string this pattern was parsed from
    /// (wildcard segments round-trip back to empty strings).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<&str> = self
            .segments
            .iter()
            .map(|s| s.as_deref().unwrap_or(""))
            .collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::parse(s)
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::parse(&s)
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
