//! `atob`/`btoa` and `Buffer` (spec.md §4.3). Base64 codec with Latin-1
//! validation; matches the S6 testable scenario exactly, including accepting
//! missing padding on decode and throwing `InvalidCharacterError` for
//! non-Latin-1 input to `btoa`.

use base64::engine::general_purpose::STANDARD;
use base64::engine::Engine;

use crate::error_bridge::{invalid_character_error, BridgeError};

/// `btoa(data)`: encodes a Latin-1 string to Base64. Throws
/// `InvalidCharacterError` if any code point is outside U+0000..=U+00FF.
pub fn btoa(data: &str) -> Result<String, BridgeError> {
    let mut bytes = Vec::with_capacity(data.len());
    for ch in data.chars() {
        let code_point = ch as u32;
        if code_point > 0xFF {
            return Err(invalid_character_error(format!(
                "string contains a character outside of the Latin1 range: U+{code_point:04X}"
            )));
        }
        bytes.push(code_point as u8);
    }
    Ok(STANDARD.encode(bytes))
}

/// `atob(encoded)`: decodes Base64 back to a Latin-1 string. Accepts input
/// missing its trailing `=` padding (spec.md §8 S6).
pub fn atob(encoded: &str) -> Result<String, BridgeError> {
    let padded = pad_base64(encoded);
    let bytes = STANDARD
        .decode(padded)
        .map_err(|e| invalid_character_error(format!("invalid base64: {e}")))?;
    Ok(bytes.into_iter().map(char::from).collect())
}

fn pad_base64(input: &str) -> String {
    let remainder = input.len() % 4;
    if remainder == 0 {
        return input.to_owned();
    }
    let mut padded = input.to_owned();
    for _ in 0..(4 - remainder) {
        padded.push('=');
    }
    padded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEncoding {
    Utf8,
    Base64,
    Hex,
}

/// `Buffer.from(string, encoding)` / `Buffer.from(array)`.
pub fn buffer_from_string(data: &str, encoding: BufferEncoding) -> Result<Vec<u8>, BridgeError> {
    match encoding {
        BufferEncoding::Utf8 => Ok(data.as_bytes().to_vec()),
        BufferEncoding::Base64 => STANDARD
            .decode(pad_base64(data))
            .map_err(|e| invalid_character_error(format!("invalid base64: {e}"))),
        BufferEncoding::Hex => hex::decode(data).map_err(|e| invalid_character_error(format!("invalid hex: {e}"))),
    }
}

#[must_use]
pub fn buffer_alloc(size: usize) -> Vec<u8> {
    vec![0u8; size]
}

#[must_use]
pub fn buffer_concat(buffers: &[Vec<u8>]) -> Vec<u8> {
    buffers.iter().flat_map(|b| b.iter().copied()).collect()
}

#[must_use]
pub fn buffer_slice(buffer: &[u8], start: usize, end: usize) -> Vec<u8> {
    let end = end.min(buffer.len());
    let start = start.min(end);
    buffer[start..end].to_vec()
}

#[must_use]
pub fn buffer_to_string(buffer: &[u8], encoding: BufferEncoding) -> String {
    match encoding {
        BufferEncoding::Utf8 => String::from_utf8_lossy(buffer).into_owned(),
        BufferEncoding::Base64 => STANDARD.encode(buffer),
        BufferEncoding::Hex => hex::encode(buffer),
    }
}
