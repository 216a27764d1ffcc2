// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryTone {
    Neutral,
    Info,
    Error,
    Success,
}

/// Outcome line for the current query. Each transition replaces the
/// previous value outright.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Summary {
    #[default]
    Idle,
    Running,
    Failed {
        kind: String,
        message: String,
    },
    Succeeded {
        count: u64,
        took_ms: u64,
    },
}

impl Summary {
    pub fn text(&self) -> String {
        match self {
            Self::Idle => String::new(),
            Self::Running => "running...".to_owned(),
            Self::Failed { kind, message } => format!("{kind}: {message}"),
            Self::Succeeded { count, took_ms } => {
                format!("{count} in {:.2}s", *took_ms as f64 / 1000.0)
            }
        }
    }

    pub const fn tone(&self) -> SummaryTone {
        match self {
            Self::Idle => SummaryTone::Neutral,
            Self::Running => SummaryTone::Info,
            Self::Failed { .. } => SummaryTone::Error,
            Self::Succeeded { .. } => SummaryTone::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Summary, SummaryTone};

    #[test]
    fn running_text_and_tone() {
        assert_eq!(Summary::Running.text(), "running...");
        assert_eq!(Summary::Running.tone(), SummaryTone::Info);
    }

    #[test]
    fn failed_joins_kind_and_message() {
        let summary = Summary::Failed {
            kind: "StormRuntimeError".to_owned(),
            message: "boom".to_owned(),
        };
        assert_eq!(summary.text(), "StormRuntimeError: boom");
        assert_eq!(summary.tone(), SummaryTone::Error);
    }

    #[test]
    fn succeeded_reports_seconds_with_two_decimals() {
        let summary = Summary::Succeeded {
            count: 250,
            took_ms: 1500,
        };
        assert_eq!(summary.text(), "250 in 1.50s");
        assert_eq!(summary.tone(), SummaryTone::Success);

        let quick = Summary::Succeeded {
            count: 0,
            took_ms: 7,
        };
        assert_eq!(quick.text(), "0 in 0.01s");
    }

    #[test]
    fn idle_is_blank() {
        assert_eq!(Summary::default(), Summary::Idle);
        assert!(Summary::Idle.text().is_empty());
    }
}
