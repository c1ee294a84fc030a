use serde_json::{Map, Value};
use tracing::field::{Field, Visit};

/// Fields pulled out of an event so they can be rendered apart from the rest.
#[derive(Default)]
pub struct EventFields {
  pub message: String,
  pub request_id: Option<String>,
  pub component: Option<String>,
  pub provider: Option<String>,
  pub stage: Option<String>,
  pub duration_ms: Option<u64>,
  pub extra: Map<String, Value>,
}

impl EventFields {
  pub fn from_event(event: &tracing::Event<'_>) -> Self {
    let mut fields = Self::default();
    event.record(&mut fields);
    fields
  }

  fn put(&mut self, field: &Field, value: Value) {
    let as_text = || match &value {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    };
    match field.name() {
      "message" => self.message = as_text(),
      "request_id" => self.request_id = Some(as_text()),
      "component" => self.component = Some(as_text()),
      "provider" => self.provider = Some(as_text()),
      "stage" => self.stage = Some(as_text()),
      "duration_ms" => self.duration_ms = value.as_u64(),
      name => {
        self.extra.insert(name.to_string(), value);
      }
    }
  }
}

impl Visit for EventFields {
  fn record_str(&mut self, field: &Field, value: &str) {
    self.put(field, Value::String(value.to_string()));
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    self.put(field, Value::from(value));
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    self.put(field, Value::from(value));
  }

  fn record_f64(&mut self, field: &Field, value: f64) {
    self.put(field, Value::from(value));
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    self.put(field, Value::from(value));
  }

  fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
    self.put(field, Value::String(format!("{:?}", value)));
  }
}
