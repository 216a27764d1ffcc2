// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;

pub const DEFAULT_MAX_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Older,
    Newer,
}

/// Submitted queries, newest first. Only consecutive duplicates are
/// suppressed, so `A, B, A` keeps three entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRing {
    entries: VecDeque<String>,
    index: usize,
    max_history: usize,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryRing {
    pub fn new(max_history: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            max_history: max_history.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn record(&mut self, query: &str) {
        self.index = 0;

        match self.entries.front() {
            None => self.entries.push_back(query.to_owned()),
            Some(newest) if newest != query => self.entries.push_front(query.to_owned()),
            Some(_) => return,
        }

        while self.entries.len() > self.max_history {
            self.entries.pop_back();
        }
        self.clamp_index();
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.index).map(String::as_str)
    }

    pub fn navigate(&mut self, direction: HistoryDirection) -> Option<&str> {
        match direction {
            HistoryDirection::Older if self.index + 1 < self.entries.len() => self.index += 1,
            HistoryDirection::Newer if self.index > 0 => self.index -= 1,
            _ => return None,
        }
        self.current()
    }

    fn clamp_index(&mut self) {
        self.index = self.index.min(self.entries.len().saturating_sub(1));
    }
}
