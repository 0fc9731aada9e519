//! Base64 in the layout SQL servers produce.
//!
//! `TO_BASE64()` and `encode(.., 'base64')` break their output into lines of
//! 76 characters, and their decoders ignore whitespace. [`encode`] and
//! [`decode`] follow the same layout so payloads survive the round trip
//! through either server.

use ::base64::prelude::*;

/// Output characters per line.
pub const LINE_LENGTH: usize = 76;

/// Encode `data`, inserting `\n` after every [`LINE_LENGTH`] characters
/// that are followed by more output.
pub fn encode(data: &[u8]) -> String {
    let flat = BASE64_STANDARD.encode(data);
    let mut out = String::with_capacity(flat.len() + flat.len() / LINE_LENGTH);
    for (i, c) in flat.chars().enumerate() {
        if i > 0 && i % LINE_LENGTH == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out
}

/// Decode `text`, skipping ASCII whitespace anywhere in the input.
///
/// Fails on characters outside the alphabet, bad padding, and anything
/// left over after the padding.
pub fn decode(text: &str) -> Result<Vec<u8>, ::base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_STANDARD.decode(compact)
}
