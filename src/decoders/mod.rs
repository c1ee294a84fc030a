use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Instant,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{extractors::pattern::rank_by_rate, protocol::audit::millis};

pub mod cipher;
pub mod codec;

/// A reversible transform tried by the cascade.
pub trait Decoder: Send + Sync {
  fn name(&self) -> &str;

  /// `key` is the auxiliary key (the hidden container's id), when known.
  fn decode(&self, encoded: &str, key: Option<&str>) -> Option<String>;
}

struct Shift {
  name: String,
  amount: i32,
}

impl Decoder for Shift {
  fn name(&self) -> &str {
    &self.name
  }

  fn decode(&self, encoded: &str, _key: Option<&str>) -> Option<String> {
    Some(cipher::shift(encoded, self.amount))
  }
}

struct Transform {
  name: &'static str,
  run: fn(&str, Option<&str>) -> Option<String>,
}

impl Decoder for Transform {
  fn name(&self) -> &str {
    self.name
  }

  fn decode(&self, encoded: &str, key: Option<&str>) -> Option<String> {
    (self.run)(encoded, key)
  }
}

fn shift_decoder(amount: i32) -> Box<dyn Decoder> {
  Box::new(Shift {
    name: cipher::shift_name(amount),
    amount,
  })
}

fn transform(name: &'static str, run: fn(&str, Option<&str>) -> Option<String>) -> Box<dyn Decoder> {
  Box::new(Transform { name, run })
}

/// Default registry in priority order.
pub fn standard_decoders() -> Vec<Box<dyn Decoder>> {
  let mut decoders = vec![shift_decoder(-3), shift_decoder(3)];
  decoders.extend(
    (1..=25)
      .filter(|n| *n != 3 && *n != 23)
      .map(shift_decoder),
  );
  decoders.extend([
    transform("base64", |e, _| codec::base64(e)),
    transform("base64 reversed", |e, _| codec::base64_reversed(e)),
    transform("hex", |e, _| codec::hex(e)),
    transform("hex sentinel", |e, _| codec::hex_sentinel(e)),
    transform("xor key", codec::xor),
    transform("xor base64", codec::xor_base64),
    transform("rot13", |e, _| Some(cipher::rot13(e))),
    transform("atbash", |e, _| Some(cipher::atbash(e))),
    transform("reverse", |e, _| Some(cipher::reverse(e))),
    transform("identity", |e, _| Some(e.to_string())),
  ]);
  decoders
}

/// Loose success oracle: the output carries an explicit http(s) marker.
pub fn looks_like_url(text: &str) -> bool {
  text.contains("http://") || text.contains("https://")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedResult {
  pub plaintext: String,
  pub decoder: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
  pub attempts: u64,
  pub successes: u64,
}

#[derive(Default)]
struct Counter {
  attempts: AtomicU64,
  successes: AtomicU64,
}

impl Counter {
  fn load(&self) -> DecoderStats {
    // The two counters are not updated together; never report a rate above 1.
    let successes = self.successes.load(Ordering::Relaxed);
    let attempts = self.attempts.load(Ordering::Relaxed);
    DecoderStats {
      attempts: attempts.max(successes),
      successes,
    }
  }
}

/// Tries decoders in order and stops at the first one whose output looks
/// like a URL.
pub struct DecodeCascade {
  decoders: Vec<Box<dyn Decoder>>,
  counters: Arc<Vec<Counter>>,
  adaptive: bool,
}

impl Default for DecodeCascade {
  fn default() -> Self {
    Self::with_decoders(standard_decoders())
  }
}

impl DecodeCascade {
  pub fn new(adaptive: bool) -> Self {
    Self {
      adaptive,
      ..Self::default()
    }
  }

  pub fn with_decoders(decoders: Vec<Box<dyn Decoder>>) -> Self {
    let counters = decoders.iter().map(|_| Counter::default()).collect();
    Self {
      decoders,
      counters: Arc::new(counters),
      adaptive: false,
    }
  }

  pub fn adaptive(mut self, adaptive: bool) -> Self {
    self.adaptive = adaptive;
    self
  }

  pub fn names(&self) -> Vec<&str> {
    self.order().into_iter().map(|i| self.decoders[i].name()).collect()
  }

  pub fn stats(&self) -> Vec<(String, DecoderStats)> {
    self.decoders
      .iter()
      .zip(self.counters.iter())
      .map(|(d, c)| (d.name().to_string(), c.load()))
      .collect()
  }

  fn order(&self) -> Vec<usize> {
    if !self.adaptive {
      return (0..self.decoders.len()).collect();
    }
    let rates: Vec<Option<f64>> = self
      .counters
      .iter()
      .map(|c| {
        let s = c.load();
        (s.attempts > 0).then(|| s.successes as f64 / s.attempts as f64)
      })
      .collect();
    rank_by_rate(&rates)
  }

  pub fn decode(&self, encoded: &str, key: Option<&str>) -> Option<DecodedResult> {
    self.run(encoded, key, None)
  }

  /// Same as [`decode`](Self::decode), with log entries tied to `request_id`.
  pub fn decode_traced(
    &self,
    encoded: &str,
    key: Option<&str>,
    request_id: &str,
  ) -> Option<DecodedResult> {
    self.run(encoded, key, Some(request_id))
  }

  fn run(&self, encoded: &str, key: Option<&str>, request_id: Option<&str>) -> Option<DecodedResult> {
    let started = Instant::now();
    let order = self.order();

    for (tried, index) in order.iter().enumerate() {
      let decoder = &self.decoders[*index];
      let counter = &self.counters[*index];
      counter.attempts.fetch_add(1, Ordering::Relaxed);

      match decoder.decode(encoded, key) {
        Some(plaintext) if looks_like_url(&plaintext) => {
          counter.successes.fetch_add(1, Ordering::Relaxed);
          info!(
            request_id,
            component = "decoder",
            decoder = decoder.name(),
            tried = (tried + 1) as u64,
            duration_ms = millis(started.elapsed()),
            "payload decoded"
          );
          return Some(DecodedResult {
            plaintext,
            decoder: decoder.name().to_string(),
          });
        }
        _ => {
          debug!(
            request_id,
            component = "decoder",
            stage = "decode",
            decoder = decoder.name(),
            "no url marker"
          );
        }
      }
    }

    warn!(
      request_id,
      component = "decoder",
      decoders = self.decoders.len() as u64,
      encoded_len = encoded.len() as u64,
      has_key = key.is_some(),
      duration_ms = millis(started.elapsed()),
      "every decoder failed"
    );
    None
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use base64::prelude::*;

  use super::*;

  struct Counting {
    name: &'static str,
    output: Option<&'static str>,
    calls: Arc<AtomicUsize>,
  }

  impl Decoder for Counting {
    fn name(&self) -> &str {
      self.name
    }

    fn decode(&self, _encoded: &str, _key: Option<&str>) -> Option<String> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.output.map(str::to_string)
    }
  }

  fn counting(name: &'static str, output: Option<&'static str>) -> (Box<dyn Decoder>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let decoder: Box<dyn Decoder> = Box::new(Counting {
      name,
      output,
      calls: calls.clone(),
    });
    (decoder, calls)
  }

  #[test]
  fn test_cascade_halts_at_first_url() {
    let (miss, miss_calls) = counting("miss", Some("garbage"));
    let (none, none_calls) = counting("none", None);
    let (hit, hit_calls) = counting("hit", Some("https://example.test/a.m3u8"));
    let (later, later_calls) = counting("later", Some("https://example.test/b.m3u8"));

    let cascade = DecodeCascade::with_decoders(vec![miss, none, hit, later]);
    let result = cascade.decode("whatever", None).unwrap();

    assert_eq!(result.decoder, "hit");
    assert_eq!(result.plaintext, "https://example.test/a.m3u8");
    assert_eq!(miss_calls.load(Ordering::SeqCst), 1);
    assert_eq!(none_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_exhaustion_is_none() {
    let (miss, _) = counting("miss", Some("no marker"));
    let cascade = DecodeCascade::with_decoders(vec![miss]);
    assert!(cascade.decode("whatever", None).is_none());
    assert_eq!(cascade.stats()[0].1, DecoderStats { attempts: 1, successes: 0 });
  }

  #[test]
  fn test_block_encoded_payload() {
    let encoded = BASE64_STANDARD.encode("https://example.test/path/master.m3u8");
    let result = DecodeCascade::default().decode(&encoded, Some("xTyBxQyGTA")).unwrap();
    assert_eq!(result.plaintext, "https://example.test/path/master.m3u8");
    assert_eq!(result.decoder, "base64");
  }

  #[test]
  fn test_forward_shifted_payload_hits_first_shift() {
    let encoded = cipher::shift("https://example.test/file.m3u8", 3);
    let result = DecodeCascade::default().decode(&encoded, None).unwrap();
    assert_eq!(result.plaintext, "https://example.test/file.m3u8");
    assert_eq!(result.decoder, "shift -3");
  }

  #[test]
  fn test_hex_and_xor_payloads() {
    let hex_payload = ::hex::encode("https://example.test/h.m3u8");
    let result = DecodeCascade::default().decode(&hex_payload, None).unwrap();
    assert_eq!(result.decoder, "hex");

    let key = "xTyBxQyGTA";
    let xored: Vec<u8> = "https://example.test/x.m3u8"
      .bytes()
      .zip(key.bytes().cycle())
      .map(|(b, k)| b ^ k)
      .collect();
    let wrapped = BASE64_STANDARD.encode(xored);
    let result = DecodeCascade::default().decode(&wrapped, Some(key)).unwrap();
    assert_eq!(result.plaintext, "https://example.test/x.m3u8");
    assert_eq!(result.decoder, "xor base64");
  }

  #[test]
  fn test_registry_order() {
    let cascade = DecodeCascade::default();
    let names = cascade.names();
    assert_eq!(&names[..3], &["shift -3", "shift +3", "shift +1"]);
    assert_eq!(names.iter().filter(|n| **n == "shift -3").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "shift +3").count(), 1);
    assert_eq!(names.last(), Some(&"identity"));
    assert_eq!(names.len(), 2 + 23 + 10);
  }

  #[test]
  fn test_adaptive_order_promotes_winner() {
    let (a, _) = counting("a", None);
    let (b, _) = counting("b", Some("https://example.test/b.m3u8"));
    let cascade = DecodeCascade::with_decoders(vec![a, b]).adaptive(true);
    assert_eq!(cascade.names(), vec!["a", "b"]);
    cascade.decode("x", None);
    assert_eq!(cascade.names(), vec!["b", "a"]);
  }

  #[test]
  fn test_stats_never_report_more_successes_than_attempts() {
    let counter = Counter::default();
    counter.attempts.store(2, Ordering::Relaxed);
    counter.successes.store(3, Ordering::Relaxed);
    assert_eq!(
      counter.load(),
      DecoderStats {
        attempts: 3,
        successes: 3,
      }
    );
  }
}
