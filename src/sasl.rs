//! SASL authentication helpers.
//!
//! Only the PLAIN mechanism (RFC 4616) is supported: the client sends the
//! base64 encoding of `\0account\0password` after the server's
//! `AUTHENTICATE +` prompt.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single `AUTHENTICATE` payload chunk.
///
/// Responses longer than this would need continuation frames; PLAIN
/// credentials short enough for one chunk are the only supported case.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Encode PLAIN credentials as a single `AUTHENTICATE` payload.
///
/// The authorization identity is left empty, delegating to the
/// authentication identity, which is what IRC networks expect.
#[must_use]
pub fn encode_plain(account: &str, password: &str) -> String {
    let raw = format!("\0{account}\0{password}");
    BASE64.encode(raw.as_bytes())
}

/// Whether a PLAIN payload fits in a single chunk.
#[must_use]
pub fn fits_single_chunk(payload: &str) -> bool {
    payload.len() <= SASL_CHUNK_SIZE
}
