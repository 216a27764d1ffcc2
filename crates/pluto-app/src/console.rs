// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;
use time::OffsetDateTime;
use time::macros::format_description;

pub const DEFAULT_CONSOLE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub seq: u64,
    pub stamp: String,
    pub text: String,
}

impl ConsoleLine {
    pub fn display(&self) -> String {
        format!("{} - {}", self.stamp, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Console {
    lines: VecDeque<ConsoleLine>,
    capacity: usize,
    next_seq: u64,
    scroll_back: usize,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl Console {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            scroll_back: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &ConsoleLine> + ExactSizeIterator {
        self.lines.iter()
    }

    /// Lines scrolled back from the newest entry; zero means following.
    pub fn scroll_back(&self) -> usize {
        self.scroll_back
    }

    pub fn print(&mut self, text: &str) -> usize {
        self.print_at(text, OffsetDateTime::now_utc())
    }

    /// Appends every line of `text` stamped with `now`, evicting the oldest
    /// entry whenever the capacity is exceeded. Returns the lines appended.
    pub fn print_at(&mut self, text: &str, now: OffsetDateTime) -> usize {
        let stamp = format_stamp(now);
        let mut appended = 0;
        for line in text.lines() {
            self.lines.push_back(ConsoleLine {
                seq: self.next_seq,
                stamp: stamp.clone(),
                text: line.to_owned(),
            });
            self.next_seq += 1;
            appended += 1;

            if self.lines.len() > self.capacity {
                self.lines.pop_front();
            }
        }
        self.scroll_back = 0;
        appended
    }

    /// Empties the log; sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_back = 0;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.lines.len().saturating_sub(1);
        self.scroll_back = self.scroll_back.saturating_add(lines).min(max);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }
}

fn format_stamp(now: OffsetDateTime) -> String {
    let utc = now.to_offset(time::UtcOffset::UTC);
    utc.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}
