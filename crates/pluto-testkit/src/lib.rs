// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Value, json};

const FQDN_LABELS: [&str; 12] = [
    "vertex", "woot", "kenshoto", "acme", "contoso", "example", "fabrikam", "initech", "globex",
    "umbrella", "hooli", "wayne",
];
const FQDN_ZONES: [&str; 6] = ["com", "link", "net", "org", "io", "lol"];
const TAG_NAMES: [&str; 6] = [
    "rep.feed.malicious",
    "cno.infra.c2",
    "cno.mal.redtree",
    "int.seen",
    "risk.sinkhole",
    "desc.benign",
];

pub fn node(form: &str, value: impl Into<Value>, repr: &str) -> Value {
    json!(["node", [[form, value.into()], {"repr": repr, "props": {}, "reprs": {}, "tags": {}}]])
}

pub fn node_with_props(form: &str, value: impl Into<Value>, repr: &str, props: Value) -> Value {
    json!(["node", [[form, value.into()], {"repr": repr, "props": props, "reprs": {}, "tags": {}}]])
}

pub fn ipv4(index: u32) -> Value {
    let addr = 0x0A00_0000_u32.wrapping_add(index);
    node("inet:ipv4", addr, &format_ipv4(addr))
}

pub fn fqdn(name: &str) -> Value {
    node("inet:fqdn", name, name)
}

pub fn fini(count: u64, took: u64) -> Value {
    json!(["fini", {"tock": 0, "took": took, "count": count}])
}

pub fn err(kind: &str, mesg: &str) -> Value {
    json!(["err", [kind, {"mesg": mesg}]])
}

pub fn print(mesg: &str) -> Value {
    json!(["print", {"mesg": mesg}])
}

pub fn init(text: &str) -> Value {
    json!(["init", {"tick": 0, "text": text, "hash": "0"}])
}

/// Joins messages the way the Cortex HTTP API streams them.
pub fn ndjson(messages: &[Value]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&message.to_string());
        out.push('\n');
    }
    out
}

pub fn format_ipv4(addr: u32) -> String {
    let [a, b, c, d] = addr.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

/// Builder for a full storm response.
#[derive(Debug, Clone, Default)]
pub struct StormScript {
    messages: Vec<Value>,
}

impl StormScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(mut self, query: &str) -> Self {
        self.messages.push(init(query));
        self
    }

    pub fn ipv4_nodes(mut self, count: u32) -> Self {
        self.messages.extend((0..count).map(ipv4));
        self
    }

    pub fn message(mut self, message: Value) -> Self {
        self.messages.push(message);
        self
    }

    pub fn print(mut self, mesg: &str) -> Self {
        self.messages.push(print(mesg));
        self
    }

    pub fn err(mut self, kind: &str, mesg: &str) -> Self {
        self.messages.push(err(kind, mesg));
        self
    }

    pub fn fini(mut self, count: u64, took: u64) -> Self {
        self.messages.push(fini(count, took));
        self
    }

    pub fn build(self) -> Vec<Value> {
        self.messages
    }

    pub fn to_ndjson(&self) -> String {
        ndjson(&self.messages)
    }
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator for mixed-form node messages.
#[derive(Debug, Clone)]
pub struct NodeFaker {
    rng: DeterministicRng,
}

impl NodeFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn ipv4(&mut self) -> Value {
        let addr = self.rng.next_u64() as u32;
        let tag = TAG_NAMES[self.rng.int_n(TAG_NAMES.len())];
        json!(["node", [["inet:ipv4", addr], {
            "repr": format_ipv4(addr),
            "props": {"type": "unicast", "asn": self.rng.int_n(65_535)},
            "reprs": {},
            "tags": {tag: [null, null]}
        }]])
    }

    pub fn fqdn(&mut self) -> Value {
        let label = FQDN_LABELS[self.rng.int_n(FQDN_LABELS.len())];
        let zone = FQDN_ZONES[self.rng.int_n(FQDN_ZONES.len())];
        let name = format!("{label}{}.{zone}", self.rng.int_n(1000));
        node_with_props("inet:fqdn", name.clone(), &name, json!({"zone": zone}))
    }

    pub fn sha256(&mut self) -> Value {
        let digest = format!(
            "{:016x}{:016x}{:016x}{:016x}",
            self.rng.next_u64(),
            self.rng.next_u64(),
            self.rng.next_u64(),
            self.rng.next_u64()
        );
        node("hash:sha256", digest.clone(), &digest)
    }

    pub fn any(&mut self) -> Value {
        match self.rng.int_n(3) {
            0 => self.ipv4(),
            1 => self.fqdn(),
            _ => self.sha256(),
        }
    }

    pub fn mixed(&mut self, count: usize) -> Vec<Value> {
        (0..count).map(|_| self.any()).collect()
    }
}
