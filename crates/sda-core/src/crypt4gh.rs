//! Crypt4GH wire-format boundary parsing.
//!
//! This is deliberately *not* cryptography: §1 scopes "decrypt-and-reencrypt
//! a header for a new recipient" to an external collaborator
//! ([`crate::traits::HeaderReencryptor`]). What the pipeline needs before it
//! can even call that collaborator is the byte offset where the header ends
//! and the payload begins, which the Crypt4GH container format exposes in
//! the clear: an 8-byte magic, a 4-byte version, a 4-byte packet count, then
//! that many length-prefixed packets.

use crate::error::{Error, Result};

const MAGIC: &[u8; 8] = b"crypt4gh";
const PREAMBLE_LEN: usize = 16;

/// Byte length of the header (magic through the last header packet) at the
/// start of `data`. Does not touch packet contents — those remain opaque
/// ciphertext to this crate.
pub fn header_length(data: &[u8]) -> Result<usize> {
    if data.len() < PREAMBLE_LEN || &data[0..8] != MAGIC {
        return Err(Error::Validation("not a crypt4gh container: bad magic".into()));
    }

    let packet_count = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;
    let mut offset = PREAMBLE_LEN;

    for _ in 0..packet_count {
        if offset + 4 > data.len() {
            return Err(Error::Validation("truncated crypt4gh header".into()));
        }
        let packet_len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        if packet_len < 4 || offset + packet_len > data.len() {
            return Err(Error::Validation("invalid crypt4gh packet length".into()));
        }
        offset += packet_len;
    }

    Ok(offset)
}
