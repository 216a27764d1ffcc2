// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A packed node as produced by `storm` with `repr` enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub form: String,
    pub value: Value,
    pub repr: Option<String>,
    pub props: BTreeMap<String, Value>,
    pub reprs: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

impl Node {
    /// Human-readable primary value. Falls back to the raw primary value
    /// when the server did not attach a repr.
    pub fn primary_repr(&self) -> String {
        if let Some(repr) = &self.repr {
            return repr.clone();
        }
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn prop_repr(&self, name: &str) -> Option<String> {
        if let Some(repr) = self.reprs.get(name) {
            return Some(repr.clone());
        }
        self.props.get(name).map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub count: u64,
    pub took_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StormMessage {
    Record(Box<Node>),
    Failure(Failure),
    Completion(Completion),
    Log(String),
    /// Anything else, already serialized for the console.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    repr: Option<String>,
    #[serde(default)]
    props: BTreeMap<String, Value>,
    #[serde(default)]
    reprs: BTreeMap<String, Value>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ErrInfo {
    #[serde(default, alias = "message")]
    mesg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FiniInfo {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    took: u64,
}

#[derive(Debug, Deserialize)]
struct PrintInfo {
    #[serde(alias = "message")]
    mesg: String,
}

impl StormMessage {
    /// Classify one wire message. Never fails: unknown tags and payloads
    /// that do not match their tag's shape degrade to `Other`.
    pub fn from_wire(raw: Value) -> Self {
        let (tag, payload) = match &raw {
            Value::Array(items) if items.len() == 2 => match &items[0] {
                Value::String(tag) => (tag.as_str(), &items[1]),
                _ => return Self::Other(raw.to_string()),
            },
            _ => return Self::Other(raw.to_string()),
        };

        let decoded = match tag {
            "node" | "record" => decode_node(payload).map(|node| Self::Record(Box::new(node))),
            "err" | "failure" => decode_failure(payload).map(Self::Failure),
            "fini" | "completion" => decode_completion(payload).map(Self::Completion),
            "print" | "log" => decode_print(payload).map(Self::Log),
            _ => None,
        };

        decoded.unwrap_or_else(|| Self::Other(raw.to_string()))
    }

    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Record(_) => "node",
            Self::Failure(_) => "err",
            Self::Completion(_) => "fini",
            Self::Log(_) => "print",
            Self::Other(_) => "other",
        }
    }
}

fn decode_node(payload: &Value) -> Option<Node> {
    let ((form, value), info): ((String, Value), NodeInfo) =
        serde_json::from_value(payload.clone()).ok()?;

    let reprs = info
        .reprs
        .into_iter()
        .map(|(name, repr)| match repr {
            Value::String(text) => (name, text),
            other => (name, other.to_string()),
        })
        .collect();

    Some(Node {
        form,
        value,
        repr: info.repr,
        props: info.props,
        reprs,
        tags: info.tags.into_keys().collect(),
    })
}

fn decode_failure(payload: &Value) -> Option<Failure> {
    let (kind, info): (String, ErrInfo) = serde_json::from_value(payload.clone()).ok()?;
    Some(Failure {
        kind,
        message: info.mesg.unwrap_or_default(),
    })
}

fn decode_completion(payload: &Value) -> Option<Completion> {
    let info: FiniInfo = serde_json::from_value(payload.clone()).ok()?;
    Some(Completion {
        count: info.count,
        took_ms: info.took,
    })
}

fn decode_print(payload: &Value) -> Option<String> {
    let info: PrintInfo = serde_json::from_value(payload.clone()).ok()?;
    Some(info.mesg)
}
