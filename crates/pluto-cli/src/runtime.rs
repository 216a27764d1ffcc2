// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use pluto_app::StormMessage;
use pluto_cortex::{Client, ConnectOptions, StormOpts};
use pluto_tui::{InternalEvent, QueryEvent, SessionRuntime};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, info};

/// Runs each query on its own worker thread against a logged-in cortex.
pub struct CortexRuntime {
    options: ConnectOptions,
    client: Option<Client>,
    workers: HashMap<u64, Arc<AtomicBool>>,
}

impl CortexRuntime {
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            client: None,
            workers: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn running_workers(&self) -> usize {
        self.workers.len()
    }
}

impl SessionRuntime for CortexRuntime {
    fn connect(&mut self, address: &str) -> Result<String> {
        let client = Client::connect(address, &self.options)?;
        let label = format!("{}@{}", client.user(), client.base_url());
        self.client = Some(client);
        Ok(label)
    }

    fn spawn_query(
        &mut self,
        request_id: u64,
        query: &str,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| anyhow!("not connected to a cortex; log in first"))?;

        // A worker holds the other reference until it returns.
        self.workers.retain(|_, flag| Arc::strong_count(flag) > 1);

        let canceled = Arc::new(AtomicBool::new(false));
        self.workers.insert(request_id, Arc::clone(&canceled));

        let query = query.to_owned();
        thread::Builder::new()
            .name(format!("storm-{request_id}"))
            .spawn(move || run_query(&client, request_id, &query, &canceled, &tx))
            .context("spawn storm worker")?;
        Ok(())
    }

    fn cancel_query(&mut self, request_id: u64) -> Result<()> {
        if let Some(flag) = self.workers.remove(&request_id) {
            flag.store(true, Ordering::Relaxed);
            debug!(request_id, "storm worker asked to stop");
        }
        Ok(())
    }
}

fn run_query(
    client: &Client,
    request_id: u64,
    query: &str,
    canceled: &Arc<AtomicBool>,
    tx: &Sender<InternalEvent>,
) {
    let last = match client.storm_cancelable(query, StormOpts::default(), Arc::clone(canceled)) {
        Err(error) => QueryEvent::Broken {
            request_id,
            error: format!("{error:#}"),
        },
        Ok(stream) => {
            let mut last = QueryEvent::Ended { request_id };
            let mut received = 0_u64;
            for item in stream {
                if canceled.load(Ordering::Relaxed) {
                    debug!(request_id, received, "storm worker stopped early");
                    return;
                }
                match item {
                    Ok(raw) => {
                        received += 1;
                        let event = InternalEvent::Query(QueryEvent::Message {
                            request_id,
                            message: StormMessage::from_wire(raw),
                        });
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        last = QueryEvent::Broken {
                            request_id,
                            error: format!("{error:#}"),
                        };
                        break;
                    }
                }
            }
            info!(request_id, received, "storm stream closed");
            last
        }
    };

    if !canceled.load(Ordering::Relaxed) {
        let _ = tx.send(InternalEvent::Query(last));
    }
}
