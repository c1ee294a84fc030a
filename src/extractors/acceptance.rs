//! Pure acceptance predicates. A capture is only "found" once one of these
//! returns `Ok`.

use thiserror::Error;

use crate::{
  configs::{LengthBounds, PayloadBounds},
  decoders::codec,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  #[error("too short ({len} < {min})")]
  TooShort { len: usize, min: usize },

  #[error("too long ({len} > {max})")]
  TooLong { len: usize, max: usize },

  #[error("contains markup")]
  Markup,

  #[error("disallowed character {0:?}")]
  Charset(char),

  #[error("more than two padding characters")]
  Padding,

  #[error("not decodable as base64")]
  Undecodable,

  #[error("container id rejected: {0}")]
  Container(Box<Rejection>),
}

fn check_len(len: usize, min: usize, max: usize) -> Result<(), Rejection> {
  if len < min {
    return Err(Rejection::TooShort { len, min });
  }
  if len > max {
    return Err(Rejection::TooLong { len, max });
  }
  Ok(())
}

fn is_unsafe_path_char(c: char) -> bool {
  c.is_whitespace() || matches!(c, '<' | '>' | '{' | '}' | '|' | '\\' | '^' | '`')
}

/// Base64 alphabet, at most two trailing `=`, and it must actually decode.
pub fn accept_hash(value: &str, bounds: LengthBounds) -> Result<(), Rejection> {
  check_len(value.len(), bounds.min_len, bounds.max_len)?;

  let body = value.trim_end_matches('=');
  if value.len() - body.len() > 2 {
    return Err(Rejection::Padding);
  }
  if let Some(c) = body
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || *c == '+' || *c == '/'))
  {
    return Err(Rejection::Charset(c));
  }
  if codec::base64_bytes(value).is_none() {
    return Err(Rejection::Undecodable);
  }

  Ok(())
}

pub fn accept_relay_path(value: &str, bounds: LengthBounds) -> Result<(), Rejection> {
  check_len(value.len(), bounds.min_len, bounds.max_len)?;
  if let Some(c) = value.chars().find(|c| is_unsafe_path_char(*c)) {
    return Err(Rejection::Charset(c));
  }
  Ok(())
}

pub fn accept_container_id(id: &str, min_len: usize) -> Result<(), Rejection> {
  check_len(id.len(), min_len, usize::MAX)?;
  if let Some(c) = id.chars().find(|c| is_unsafe_path_char(*c)) {
    return Err(Rejection::Charset(c));
  }
  Ok(())
}

/// Hidden payload text: no markup and only `[A-Za-z0-9+/=:.]` once trimmed.
pub fn accept_payload(
  container: Option<&str>,
  encoded: &str,
  bounds: PayloadBounds,
) -> Result<(), Rejection> {
  if let Some(id) = container {
    accept_container_id(id, bounds.min_container_len)
      .map_err(|r| Rejection::Container(Box::new(r)))?;
  }

  let encoded = encoded.trim();
  check_len(encoded.len(), bounds.min_len, bounds.max_len)?;
  if encoded.contains('<') || encoded.contains('>') {
    return Err(Rejection::Markup);
  }
  if let Some(c) = encoded
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | ':' | '.')))
  {
    return Err(Rejection::Charset(c));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const HASH: LengthBounds = LengthBounds::new(20, 4_096);
  const RELAY: LengthBounds = LengthBounds::new(10, 500);
  const PAYLOAD: PayloadBounds = PayloadBounds {
    min_len: 20,
    max_len: 16_384,
    min_container_len: 3,
  };

  #[test]
  fn test_short_capture_rejected() {
    assert_eq!(
      accept_hash("abc", HASH),
      Err(Rejection::TooShort { len: 3, min: 20 })
    );
    assert!(accept_relay_path("abc", RELAY).is_err());
  }

  #[test]
  fn test_hash_rules() {
    // "relay-hash-value-0123456789" in base64
    assert!(accept_hash("cmVsYXktaGFzaC12YWx1ZS0wMTIzNDU2Nzg5", HASH).is_ok());
    assert_eq!(
      accept_hash("cmVsYXktaGFzaC12YWx1ZS0w===", HASH),
      Err(Rejection::Padding)
    );
    assert_eq!(
      accept_hash("cmVsYXktaGFzaC12YWx1ZS0w-x", HASH),
      Err(Rejection::Charset('-'))
    );
  }

  #[test]
  fn test_relay_path_rejects_unsafe_characters() {
    assert!(accept_relay_path("Zm9vYmFyYmF6cXV4", RELAY).is_ok());
    assert_eq!(
      accept_relay_path("Zm9v YmFyYmF6", RELAY),
      Err(Rejection::Charset(' '))
    );
    assert_eq!(
      accept_relay_path("Zm9v{token}YmFy", RELAY),
      Err(Rejection::Charset('{'))
    );
    let long = "a".repeat(501);
    assert!(matches!(
      accept_relay_path(&long, RELAY),
      Err(Rejection::TooLong { .. })
    ));
  }

  #[test]
  fn test_payload_rules() {
    let encoded = "aHR0cHM6Ly9leGFtcGxlLnRlc3QvbWFzdGVyLm0zdTg=";
    assert!(accept_payload(Some("xTyBxQyGTA"), encoded, PAYLOAD).is_ok());
    assert!(accept_payload(None, &format!("  {}\n", encoded), PAYLOAD).is_ok());
    assert_eq!(
      accept_payload(Some("xTyBxQyGTA"), "<span>aHR0cHM6Ly9leGFtcGxl</span>", PAYLOAD),
      Err(Rejection::Markup)
    );
    assert_eq!(
      accept_payload(Some("xTyBxQyGTA"), "aHR0cHM6Ly9leGFtcGxl-LnRlc3Q", PAYLOAD),
      Err(Rejection::Charset('-'))
    );
    assert!(matches!(
      accept_payload(Some("ab"), encoded, PAYLOAD),
      Err(Rejection::Container(_))
    ));
  }
}
