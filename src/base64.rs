//! Base64 codec (RFC 4648, standard alphabet, `=` padding).
//!
//! Used by the WebSocket handshake to encode the 16-byte client key and the
//! 20-byte SHA-1 accept digest. Size-bound calculators are overflow-checked
//! so the codec never computes an output length it cannot address.

use crate::error::Error;
use crate::Result;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const PAD: u8 = b'=';

/// Sentinel in the decode table for bytes outside the alphabet.
const BAD: u8 = 0xff;

const DECODE_TABLE: [u8; 128] = {
    let mut table = [BAD; 128];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Exact encoded size of an `n`-byte input: `((n + 2) / 3) * 4`.
///
/// Fails with a size-limit error when the calculation would overflow.
pub fn encoded_size(n: usize) -> Result<usize> {
    n.checked_add(2)
        .map(|m| m / 3)
        .and_then(|m| m.checked_mul(4))
        .ok_or_else(|| Error::SizeLimit(format!("base64 input too large: {} bytes", n)))
}

/// Upper bound on the decoded size of an `n`-byte input: `(n / 4) * 3`.
/// The actual output may be 1 or 2 bytes shorter due to padding.
pub fn max_decoded_size(n: usize) -> Result<usize> {
    (n / 4)
        .checked_mul(3)
        .ok_or_else(|| Error::SizeLimit(format!("base64 input too large: {} bytes", n)))
}

fn decode_symbol(ch: u8) -> Result<u8> {
    let v = if ch < 128 { DECODE_TABLE[ch as usize] } else { BAD };
    if v == BAD {
        return Err(Error::InvalidInput(format!("bad base64 byte {:#04x}", ch)));
    }
    Ok(v)
}

/// Encodes `input` into the standard base64 alphabet with `=` padding.
pub fn encode(input: &[u8]) -> Result<String> {
    let mut out = Vec::with_capacity(encoded_size(input.len())?);
    let mut chunks = input.chunks_exact(3);
    for group in &mut chunks {
        let bits = ((group[0] as u32) << 16) | ((group[1] as u32) << 8) | group[2] as u32;
        out.push(ALPHABET[(bits >> 18) as usize & 0x3f]);
        out.push(ALPHABET[(bits >> 12) as usize & 0x3f]);
        out.push(ALPHABET[(bits >> 6) as usize & 0x3f]);
        out.push(ALPHABET[bits as usize & 0x3f]);
    }
    match *chunks.remainder() {
        [a] => {
            let bits = (a as u32) << 16;
            out.push(ALPHABET[(bits >> 18) as usize & 0x3f]);
            out.push(ALPHABET[(bits >> 12) as usize & 0x3f]);
            out.push(PAD);
            out.push(PAD);
        }
        [a, b] => {
            let bits = ((a as u32) << 16) | ((b as u32) << 8);
            out.push(ALPHABET[(bits >> 18) as usize & 0x3f]);
            out.push(ALPHABET[(bits >> 12) as usize & 0x3f]);
            out.push(ALPHABET[(bits >> 6) as usize & 0x3f]);
            out.push(PAD);
        }
        _ => {}
    }
    // the alphabet is ASCII
    Ok(String::from_utf8(out).expect("base64 output is ASCII"))
}

/// Decodes standard base64. The input length must be a multiple of 4; `=`
/// may appear only as the last one or two bytes.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() % 4 != 0 {
        return Err(Error::InvalidInput(format!(
            "base64 length {} is not a multiple of 4",
            input.len()
        )));
    }
    if input.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(max_decoded_size(input.len())?);
    let (body, last) = input.split_at(input.len() - 4);
    for group in body.chunks_exact(4) {
        let bits = ((decode_symbol(group[0])? as u32) << 18)
            | ((decode_symbol(group[1])? as u32) << 12)
            | ((decode_symbol(group[2])? as u32) << 6)
            | decode_symbol(group[3])? as u32;
        out.push((bits >> 16) as u8);
        out.push((bits >> 8) as u8);
        out.push(bits as u8);
    }
    // final group: trailing pads shorten the output
    if last[2] == PAD {
        if last[3] != PAD {
            return Err(Error::InvalidInput("bad base64 padding".into()));
        }
        let bits =
            ((decode_symbol(last[0])? as u32) << 18) | ((decode_symbol(last[1])? as u32) << 12);
        out.push((bits >> 16) as u8);
    } else if last[3] == PAD {
        let bits = ((decode_symbol(last[0])? as u32) << 18)
            | ((decode_symbol(last[1])? as u32) << 12)
            | ((decode_symbol(last[2])? as u32) << 6);
        out.push((bits >> 16) as u8);
        out.push((bits >> 8) as u8);
    } else {
        let bits = ((decode_symbol(last[0])? as u32) << 18)
            | ((decode_symbol(last[1])? as u32) << 12)
            | ((decode_symbol(last[2])? as u32) << 6)
            | decode_symbol(last[3])? as u32;
        out.push((bits >> 16) as u8);
        out.push((bits >> 8) as u8);
        out.push(bits as u8);
    }
    Ok(out)
}
