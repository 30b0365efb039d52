//! Test helpers: a tracing layer that records every event, and a polling wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Subscriber;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, Layered, SubscriberExt};

/// Poll `condition` until it holds or `timeout` passes. Returns the final result.
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Record {
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingLayer {
    records: Arc<Mutex<Vec<Record>>>,
}

impl RecordingLayer {
    pub fn subscriber(&self) -> Layered<RecordingLayer, Registry> {
        tracing_subscriber::registry().with(self.clone())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn with_outcome(&self, outcome: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.field("outcome") == Some(outcome))
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }
}

impl<S> Layer<S> for RecordingLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        self.records.lock().unwrap().push(visitor.record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    record: Record,
}

impl tracing::field::Visit for RecordVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.record.message = format!("{:?}", value);
        } else {
            self.record
                .fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.record.message = value.to_string();
        } else {
            self.record
                .fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}
