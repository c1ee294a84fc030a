use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

use super::fields::EventFields;
use crate::common::types::{Shared, unix_millis};

/// One correlated log record, kept for triage of a single extraction call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
  pub timestamp_ms: u64,
  pub level: String,
  pub request_id: String,
  pub target: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stage: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  pub message: String,
  #[serde(skip_serializing_if = "Map::is_empty")]
  pub fields: Map<String, Value>,
}

/// Bounded in-memory log of events that carry a `request_id` field.
///
/// Oldest entries are evicted once `capacity` is reached.
#[derive(Clone)]
pub struct LogStore {
  entries: Shared<VecDeque<LogEntry>>,
  capacity: usize,
  keep_steps: bool,
}

impl LogStore {
  pub fn new(capacity: usize, keep_steps: bool) -> Self {
    Self {
      entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
      capacity,
      keep_steps,
    }
  }

  pub fn push(&self, entry: LogEntry) {
    if self.capacity == 0 {
      return;
    }
    let mut entries = self.entries.lock();
    while entries.len() >= self.capacity {
      entries.pop_front();
    }
    entries.push_back(entry);
  }

  pub fn entries_for(&self, request_id: &str) -> Vec<LogEntry> {
    self.entries
      .lock()
      .iter()
      .filter(|e| e.request_id == request_id)
      .cloned()
      .collect()
  }

  pub fn all(&self) -> Vec<LogEntry> {
    self.entries.lock().iter().cloned().collect()
  }

  pub fn clear(&self) {
    self.entries.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<S: Subscriber> Layer<S> for LogStore {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let metadata = event.metadata();
    let fields = EventFields::from_event(event);
    let Some(request_id) = fields.request_id else {
      return;
    };
    if !self.keep_steps && fields.stage.is_some() && *metadata.level() >= Level::DEBUG {
      return;
    }

    self.push(LogEntry {
      timestamp_ms: unix_millis(),
      level: metadata.level().to_string(),
      request_id,
      target: metadata.target().to_string(),
      component: fields.component,
      provider: fields.provider,
      stage: fields.stage,
      duration_ms: fields.duration_ms,
      message: fields.message,
      fields: fields.extra,
    });
  }
}
