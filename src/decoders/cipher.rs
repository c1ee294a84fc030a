//! Letter-substitution transforms. Only ASCII letters move; everything else
//! passes through untouched.

/// Rotates ASCII letters by `amount` positions, wrapping within case.
pub fn shift(text: &str, amount: i32) -> String {
  let amount = amount.rem_euclid(26) as u8;
  text.chars()
    .map(|c| match c {
      'a'..='z' => ((c as u8 - b'a' + amount) % 26 + b'a') as char,
      'A'..='Z' => ((c as u8 - b'A' + amount) % 26 + b'A') as char,
      _ => c,
    })
    .collect()
}

pub fn rot13(text: &str) -> String {
  shift(text, 13)
}

/// Mirror alphabet: `a <-> z`, `b <-> y`, case preserved.
pub fn atbash(text: &str) -> String {
  text.chars()
    .map(|c| match c {
      'a'..='z' => (b'z' - (c as u8 - b'a')) as char,
      'A'..='Z' => (b'Z' - (c as u8 - b'A')) as char,
      _ => c,
    })
    .collect()
}

pub fn reverse(text: &str) -> String {
  text.chars().rev().collect()
}

/// Display name for a decoding shift, using the negative form past 13.
pub fn shift_name(amount: i32) -> String {
  let amount = amount.rem_euclid(26);
  if amount > 13 {
    format!("shift -{}", 26 - amount)
  } else {
    format!("shift +{}", amount)
  }
}
