// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::Node;
use std::mem;

pub const DEFAULT_BUFFER_LIMIT: usize = 100;

/// Buffered nodes ready to move into the tables. `clear_first` is set only
/// on the first flush of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub clear_first: bool,
    pub nodes: Vec<Node>,
}

/// Per-query consumer state: the pending node buffer and whether the
/// previous cycle's tables have been cleared yet.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCycle {
    request_id: u64,
    query: String,
    buffer: Vec<Node>,
    limit: usize,
    cleared: bool,
    received: u64,
}

impl QueryCycle {
    pub fn new(request_id: u64, query: &str, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            request_id,
            query: query.to_owned(),
            buffer: Vec::with_capacity(limit),
            limit,
            cleared: false,
            received: 0,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn push(&mut self, node: Node) -> Option<Flush> {
        self.buffer.push(node);
        self.received += 1;
        if self.buffer.len() >= self.limit {
            return Some(self.take());
        }
        None
    }

    /// End-of-stream flush of whatever is still buffered.
    pub fn drain(&mut self) -> Option<Flush> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take())
    }

    fn take(&mut self) -> Flush {
        let clear_first = !self.cleared;
        self.cleared = true;
        Flush {
            clear_first,
            nodes: mem::replace(&mut self.buffer, Vec::with_capacity(self.limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryCycle;
    use crate::{Node, StormMessage};
    use serde_json::json;

    fn node(index: usize) -> Node {
        let repr = format!("10.0.0.{index}");
        match StormMessage::from_wire(json!(["node", [["inet:ipv4", index], {"repr": repr}]])) {
            StormMessage::Record(node) => *node,
            other => panic!("fixture should decode as a node, got {other:?}"),
        }
    }

    #[test]
    fn buffer_flushes_exactly_at_limit() {
        let mut cycle = QueryCycle::new(1, "inet:ipv4", 3);
        assert!(cycle.push(node(0)).is_none());
        assert!(cycle.push(node(1)).is_none());

        let flush = cycle.push(node(2)).expect("third node fills the buffer");
        assert!(flush.clear_first);
        assert_eq!(flush.nodes.len(), 3);
        assert_eq!(cycle.buffered(), 0);
        assert!(cycle.drain().is_none());
    }

    #[test]
    fn only_first_flush_requests_a_clear() {
        let mut cycle = QueryCycle::new(1, "inet:ipv4", 2);
        cycle.push(node(0));
        let first = cycle.push(node(1)).expect("first flush");
        cycle.push(node(2));
        let second = cycle.push(node(3)).expect("second flush");

        assert!(first.clear_first);
        assert!(!second.clear_first);
    }

    #[test]
    fn drain_flushes_partial_buffer_once() {
        let mut cycle = QueryCycle::new(1, "inet:ipv4", 100);
        for index in 0..99 {
            assert!(cycle.push(node(index)).is_none());
        }

        let flush = cycle.drain().expect("partial buffer drains");
        assert!(flush.clear_first);
        assert_eq!(flush.nodes.len(), 99);
        assert!(cycle.drain().is_none());
        assert_eq!(cycle.received(), 99);
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let mut cycle = QueryCycle::new(1, "inet:ipv4", 0);
        assert!(cycle.push(node(0)).is_some());
    }
}
