//! Byte-level transforms: base64, hex and repeating-key XOR.

use base64::{
  Engine,
  alphabet,
  engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

/// Standard alphabet, padding optional, trailing bits tolerated.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
  &alphabet::STANDARD,
  GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true),
);

fn lossy(bytes: Vec<u8>) -> String {
  match String::from_utf8(bytes) {
    Ok(text) => text,
    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
  }
}

pub fn base64_bytes(encoded: &str) -> Option<Vec<u8>> {
  let trimmed = encoded.trim();
  if trimmed.is_empty() {
    return None;
  }
  LENIENT.decode(trimmed).ok()
}

pub fn base64(encoded: &str) -> Option<String> {
  base64_bytes(encoded).map(lossy)
}

pub fn base64_reversed(encoded: &str) -> Option<String> {
  base64(&super::cipher::reverse(encoded))
}

/// Hex digits, optionally split into `:`-separated groups.
pub fn hex(encoded: &str) -> Option<String> {
  let cleaned: String = encoded.trim().chars().filter(|c| *c != ':').collect();
  if cleaned.is_empty() {
    return None;
  }
  ::hex::decode(cleaned).ok().map(lossy)
}

/// Hex behind a single leading `g` sentinel.
pub fn hex_sentinel(encoded: &str) -> Option<String> {
  hex(encoded.trim().strip_prefix('g')?)
}

fn xor_bytes(data: &[u8], key: &[u8]) -> Vec<u8> {
  data.iter()
    .zip(key.iter().cycle())
    .map(|(b, k)| b ^ k)
    .collect()
}

pub fn xor(encoded: &str, key: Option<&str>) -> Option<String> {
  let key = key.filter(|k| !k.is_empty())?;
  Some(lossy(xor_bytes(encoded.as_bytes(), key.as_bytes())))
}

pub fn xor_base64(encoded: &str, key: Option<&str>) -> Option<String> {
  let key = key.filter(|k| !k.is_empty())?;
  let bytes = base64_bytes(encoded)?;
  Some(lossy(xor_bytes(&bytes, key.as_bytes())))
}
