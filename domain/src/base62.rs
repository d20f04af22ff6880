//! Base62 transcoding between identifiers and short codes.
//!
//! The alphabet ordering is part of the wire format: codes already handed out
//! decode only under this exact ordering.

use crate::CoreError;

pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE: u64 = 62;

/// Position of `c` in the alphabet, if it belongs to it.
pub fn index_of(c: char) -> Option<u64> {
    match c {
        '0'..='9' => Some(c as u64 - '0' as u64),
        'a'..='z' => Some(c as u64 - 'a' as u64 + 10),
        'A'..='Z' => Some(c as u64 - 'A' as u64 + 36),
        _ => None,
    }
}

/// Encode an unsigned 64-bit integer, most significant symbol first.
/// Zero encodes to "0".
pub fn encode(mut n: u64) -> String {
    if n == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    // 62^11 > 2^64, so eleven symbols always suffice
    let mut buf = [0u8; 11];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = ALPHABET[(n % BASE) as usize];
        n /= BASE;
    }
    buf[i..].iter().map(|&b| b as char).collect()
}

/// Inverse of [`encode`].
pub fn decode(s: &str) -> Result<u64, CoreError> {
    if s.is_empty() {
        return Err(CoreError::Validation("empty code".into()));
    }
    s.chars().enumerate().try_fold(0u64, |acc, (position, symbol)| {
        let idx = index_of(symbol).ok_or(CoreError::InvalidSymbol { symbol, position })?;
        acc.checked_mul(BASE)
            .and_then(|v| v.checked_add(idx))
            .ok_or(CoreError::CodeOverflow)
    })
}
