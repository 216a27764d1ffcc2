// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{
    Console, DEFAULT_BUFFER_LIMIT, DEFAULT_CONSOLE_CAPACITY, DEFAULT_MAX_HISTORY, Flush,
    HistoryRing, NodeTables, QueryCycle, StormMessage, Summary,
};
use tracing::{debug, info, warn};

pub const STREAM_ERROR_KIND: &str = "StreamError";
pub const CANCELED_KIND: &str = "Canceled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StormLimits {
    pub buffer_limit: usize,
    pub max_history: usize,
    pub console_capacity: usize,
}

impl Default for StormLimits {
    fn default() -> Self {
        Self {
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            max_history: DEFAULT_MAX_HISTORY,
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StormCommand {
    Submit(String),
    Message {
        request_id: u64,
        message: StormMessage,
    },
    StreamEnded {
        request_id: u64,
    },
    StreamBroken {
        request_id: u64,
        error: String,
    },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Exhausted,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StormEvent {
    CycleStarted { request_id: u64, query: String },
    TablesCleared,
    Flushed { rows: usize },
    SummaryChanged(Summary),
    ConsoleAppended { lines: usize },
    CycleFinished { request_id: u64, outcome: CycleOutcome },
}

/// Everything the query screen shows, plus the in-flight cycle. Only the
/// UI loop mutates this, one command at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct StormState {
    pub history: HistoryRing,
    pub nodes: NodeTables,
    pub summary: Summary,
    pub console: Console,
    cycle: Option<QueryCycle>,
    buffer_limit: usize,
    last_request_id: u64,
}

impl Default for StormState {
    fn default() -> Self {
        Self::new(StormLimits::default())
    }
}

impl StormState {
    pub fn new(limits: StormLimits) -> Self {
        Self {
            history: HistoryRing::new(limits.max_history),
            nodes: NodeTables::default(),
            summary: Summary::Idle,
            console: Console::new(limits.console_capacity),
            cycle: None,
            buffer_limit: limits.buffer_limit.max(1),
            last_request_id: 0,
        }
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.cycle.as_ref().map(QueryCycle::request_id)
    }

    pub fn buffered(&self) -> usize {
        self.cycle.as_ref().map_or(0, QueryCycle::buffered)
    }

    pub fn dispatch(&mut self, command: StormCommand) -> Vec<StormEvent> {
        match command {
            StormCommand::Submit(query) => self.submit(&query),
            StormCommand::Message {
                request_id,
                message,
            } => {
                if !self.is_active(request_id) {
                    debug!(request_id, tag = message.tag(), "dropping stale storm message");
                    return Vec::new();
                }
                self.apply_message(message)
            }
            StormCommand::StreamEnded { request_id } => {
                if !self.is_active(request_id) {
                    return Vec::new();
                }
                self.finish_stream()
            }
            StormCommand::StreamBroken { request_id, error } => {
                if !self.is_active(request_id) {
                    return Vec::new();
                }
                warn!(request_id, %error, "storm stream broke");
                self.fail(STREAM_ERROR_KIND, &error)
            }
            StormCommand::Cancel => self.cancel(),
        }
    }

    /// Submits `query` and feeds it `messages` in order, as a worker would.
    /// Stops pulling from the iterator as soon as the cycle terminates.
    pub fn run_stream<I>(&mut self, query: &str, messages: I) -> Vec<StormEvent>
    where
        I: IntoIterator<Item = StormMessage>,
    {
        let mut events = self.submit(query);
        let Some(request_id) = self.in_flight() else {
            return events;
        };

        for message in messages {
            events.extend(self.dispatch(StormCommand::Message {
                request_id,
                message,
            }));
            if !self.is_active(request_id) {
                return events;
            }
        }

        events.extend(self.dispatch(StormCommand::StreamEnded { request_id }));
        events
    }

    fn is_active(&self, request_id: u64) -> bool {
        self.in_flight() == Some(request_id)
    }

    fn submit(&mut self, query: &str) -> Vec<StormEvent> {
        let mut events = self.cancel_in_flight();

        self.history.record(query);
        self.last_request_id = self.last_request_id.wrapping_add(1).max(1);
        let request_id = self.last_request_id;
        self.cycle = Some(QueryCycle::new(request_id, query, self.buffer_limit));
        self.console.clear();
        info!(request_id, query, "storm query submitted");

        events.push(StormEvent::CycleStarted {
            request_id,
            query: query.to_owned(),
        });
        events.push(self.set_summary(Summary::Running));
        events
    }

    fn apply_message(&mut self, message: StormMessage) -> Vec<StormEvent> {
        match message {
            StormMessage::Record(node) => {
                let flush = self.cycle.as_mut().and_then(|cycle| cycle.push(*node));
                flush.map(|flush| self.flush(flush)).unwrap_or_default()
            }
            StormMessage::Failure(failure) => self.fail(&failure.kind, &failure.message),
            StormMessage::Completion(completion) => vec![self.set_summary(Summary::Succeeded {
                count: completion.count,
                took_ms: completion.took_ms,
            })],
            StormMessage::Log(text) | StormMessage::Other(text) => {
                let lines = self.console.print(&text);
                vec![StormEvent::ConsoleAppended { lines }]
            }
        }
    }

    fn flush(&mut self, flush: Flush) -> Vec<StormEvent> {
        let mut events = Vec::with_capacity(2);
        if flush.clear_first {
            self.nodes.clear();
            events.push(StormEvent::TablesCleared);
        }
        let rows = self.nodes.add(flush.nodes);
        debug!(rows, total = self.nodes.row_count(), "flushed buffered nodes");
        events.push(StormEvent::Flushed { rows });
        events
    }

    fn finish_stream(&mut self) -> Vec<StormEvent> {
        let Some(mut cycle) = self.cycle.take() else {
            return Vec::new();
        };

        let mut events = cycle.drain().map(|flush| self.flush(flush)).unwrap_or_default();
        info!(
            request_id = cycle.request_id(),
            received = cycle.received(),
            "storm stream exhausted"
        );
        events.push(StormEvent::CycleFinished {
            request_id: cycle.request_id(),
            outcome: CycleOutcome::Exhausted,
        });
        events
    }

    fn fail(&mut self, kind: &str, message: &str) -> Vec<StormEvent> {
        let Some(cycle) = self.cycle.take() else {
            return Vec::new();
        };

        if cycle.buffered() > 0 {
            debug!(
                discarded = cycle.buffered(),
                "discarding buffered nodes from failed query"
            );
        }
        vec![
            self.set_summary(Summary::Failed {
                kind: kind.to_owned(),
                message: message.to_owned(),
            }),
            StormEvent::CycleFinished {
                request_id: cycle.request_id(),
                outcome: CycleOutcome::Failed,
            },
        ]
    }

    fn cancel(&mut self) -> Vec<StormEvent> {
        let mut events = self.cancel_in_flight();
        if !events.is_empty() {
            events.insert(
                0,
                self.set_summary(Summary::Failed {
                    kind: CANCELED_KIND.to_owned(),
                    message: "query canceled".to_owned(),
                }),
            );
        }
        events
    }

    fn cancel_in_flight(&mut self) -> Vec<StormEvent> {
        let Some(cycle) = self.cycle.take() else {
            return Vec::new();
        };
        info!(request_id = cycle.request_id(), "storm query canceled");
        vec![StormEvent::CycleFinished {
            request_id: cycle.request_id(),
            outcome: CycleOutcome::Canceled,
        }]
    }

    fn set_summary(&mut self, summary: Summary) -> StormEvent {
        self.summary = summary.clone();
        StormEvent::SummaryChanged(summary)
    }
}
