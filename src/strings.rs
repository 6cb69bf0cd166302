//! String decoders for bounded, null-terminated buffers read out of the workspace.

use crate::error::{Error, Result};

/// Decodes the bytes before the first NUL in `buf`.
///
/// Each byte becomes the `char` with the same code point, so high bytes survive
/// without a lossy replacement. Fails with [`Error::DecodeTruncated`] when `buf`
/// holds no NUL.
pub fn decode_ascii(buf: &[u8]) -> Result<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::DecodeTruncated { limit: buf.len() })?;
    Ok(buf[..end].iter().map(|&b| b as char).collect())
}

/// Decodes little-endian UTF-16 code units up to the first zero unit.
///
/// Unpaired surrogates decode to U+FFFD. A trailing odd byte is ignored.
pub fn decode_utf16le(buf: &[u8]) -> Result<String> {
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let end = units
        .iter()
        .position(|&u| u == 0)
        .ok_or(Error::DecodeTruncated { limit: buf.len() })?;

    Ok(char::decode_utf16(units[..end].iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}
