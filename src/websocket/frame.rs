//! RFC 6455 frame header codec.
//!
//! Pure functions over a byte region holding a frame header: byte 0 is
//! `fin(1) rsv1(1) rsv2(1) rsv3(1) opcode(4)`, byte 1 is `mask(1) len7(7)`,
//! followed by an optional 16- or 64-bit network-order length extension and
//! an optional 4-byte mask key. The payload length is always derived from
//! the length encoding in effect, never assumed.

use crate::error::Error;
use crate::wire;
use crate::Result;

/// Fixed part of every header: flags byte plus mask/length byte.
pub const BASE_SIZE: usize = 2;
/// Size of the mask key when the mask bit is set.
pub const MASK_SIZE: usize = 4;
/// Largest possible header: base + 64-bit extension + mask key.
pub const MAX_HEADER_SIZE: usize = BASE_SIZE + 8 + MASK_SIZE;

/// 7-bit sentinel: real length in the next 16 bits.
const LEN16_TAG: u8 = 126;
/// 7-bit sentinel: real length in the next 64 bits.
const LEN64_TAG: u8 = 127;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0f;

/// Frame opcodes defined by RFC 6455; the remaining code points are
/// reserved and rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xa => Ok(Self::Pong),
            other => Err(Error::InvalidInput(format!("reserved opcode {:#x}", other))),
        }
    }
}

pub fn fin(header: &[u8]) -> bool {
    header[0] & FIN_BIT != 0
}

pub fn opcode(header: &[u8]) -> Result<Opcode> {
    Opcode::try_from(header[0] & OPCODE_BITS)
}

pub fn masked(header: &[u8]) -> bool {
    header[1] & MASK_BIT != 0
}

/// Bytes of length extension for the encoding currently in effect: 0, 2 or 8.
pub fn length_extension(header: &[u8]) -> usize {
    match header[1] & !MASK_BIT {
        LEN16_TAG => 2,
        LEN64_TAG => 8,
        _ => 0,
    }
}

/// Total header size: `2 + length_extension (0|2|8) + mask key (0|4)`.
pub fn header_size(header: &[u8]) -> usize {
    BASE_SIZE + length_extension(header) + if masked(header) { MASK_SIZE } else { 0 }
}

/// Payload length encoded by the header. The region must hold the whole
/// length extension for the encoding in effect.
pub fn payload_size(header: &[u8]) -> u64 {
    match header[1] & !MASK_BIT {
        LEN16_TAG => wire::get_u16(&header[BASE_SIZE..]) as u64,
        LEN64_TAG => wire::get_u64(&header[BASE_SIZE..]),
        literal => literal as u64,
    }
}

/// Writes `n` with the smallest applicable encoding, preserving the mask
/// bit. Call this before [`set_mask_key`]: the key's position depends on
/// the length encoding chosen here.
pub fn set_payload_size(header: &mut [u8], n: u64) {
    let mask_bit = header[1] & MASK_BIT;
    if n <= 125 {
        header[1] = mask_bit | n as u8;
    } else if n <= u16::MAX as u64 {
        header[1] = mask_bit | LEN16_TAG;
        wire::put_u16(&mut header[BASE_SIZE..], n as u16);
    } else {
        header[1] = mask_bit | LEN64_TAG;
        wire::put_u64(&mut header[BASE_SIZE..], n);
    }
}

/// The 4-byte mask key following the length field, if the mask bit is set.
pub fn mask_key(header: &[u8]) -> Option<[u8; 4]> {
    if !masked(header) {
        return None;
    }
    let at = BASE_SIZE + length_extension(header);
    let mut key = [0u8; 4];
    key.copy_from_slice(&header[at..at + MASK_SIZE]);
    Some(key)
}

/// Stores the mask key after the length field in effect. An all-zero key
/// means "unmasked": the mask bit is cleared and no key is stored.
pub fn set_mask_key(header: &mut [u8], key: [u8; 4]) {
    if key == [0u8; 4] {
        header[1] &= !MASK_BIT;
        return;
    }
    header[1] |= MASK_BIT;
    let at = BASE_SIZE + length_extension(header);
    header[at..at + MASK_SIZE].copy_from_slice(&key);
}

/// XORs the payload with the key, cycled, per RFC 6455. Masking is its own
/// inverse.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % MASK_SIZE];
    }
}

/// A complete frame recovered by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    /// Bytes of input the frame occupied, header included.
    pub consumed: usize,
}

/// Builds a complete final frame (header plus payload) into `out`, without
/// a packet buffer. An all-zero `mask` produces an unmasked frame.
pub fn encode(opcode: Opcode, payload: &[u8], mask: [u8; 4], out: &mut Vec<u8>) {
    let mut header = [0u8; MAX_HEADER_SIZE];
    header[0] = FIN_BIT | opcode as u8;
    set_payload_size(&mut header, payload.len() as u64);
    set_mask_key(&mut header, mask);
    let hlen = header_size(&header);
    out.extend_from_slice(&header[..hlen]);
    let at = out.len();
    out.extend_from_slice(payload);
    if mask != [0u8; 4] {
        apply_mask(&mut out[at..], mask);
    }
}

/// Interprets a complete frame at the front of `input`, unmasking the
/// payload. `Ok(None)` means the frame is still incomplete.
pub fn decode(input: &[u8]) -> Result<Option<Frame>> {
    if input.len() < BASE_SIZE {
        return Ok(None);
    }
    if input.len() < BASE_SIZE + length_extension(input) {
        return Ok(None);
    }
    let header_len = header_size(input);
    if input.len() < header_len {
        return Ok(None);
    }
    let payload_len = usize::try_from(payload_size(input))
        .map_err(|_| Error::SizeLimit("frame payload exceeds addressable size".into()))?;
    let total = header_len
        .checked_add(payload_len)
        .ok_or_else(|| Error::SizeLimit("frame size overflow".into()))?;
    if input.len() < total {
        return Ok(None);
    }
    let opcode = opcode(input)?;
    let mut payload = input[header_len..total].to_vec();
    if let Some(key) = mask_key(input) {
        apply_mask(&mut payload, key);
    }
    Ok(Some(Frame {
        fin: fin(input),
        opcode,
        payload,
        consumed: total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(len: u64, mask: [u8; 4]) -> [u8; MAX_HEADER_SIZE] {
        let mut h = [0u8; MAX_HEADER_SIZE];
        h[0] = FIN_BIT | Opcode::Binary as u8;
        set_payload_size(&mut h, len);
        set_mask_key(&mut h, mask);
        h
    }

    #[test]
    fn header_sizes() {
        assert_eq!(header_size(&header_for(0, [0; 4])), 2);
        assert_eq!(header_size(&header_for(125, [0; 4])), 2);
        assert_eq!(header_size(&header_for(125, [1, 2, 3, 4])), 6);
        assert_eq!(header_size(&header_for(126, [0; 4])), 4);
        assert_eq!(header_size(&header_for(65535, [0; 4])), 4);
        assert_eq!(header_size(&header_for(65536, [0; 4])), 10);
        assert_eq!(header_size(&header_for(65536, [1, 2, 3, 4])), 14);
    }

    #[test]
    fn payload_size_encodings() {
        for len in [0u64, 1, 125, 126, 127, 65535, 65536, u32::MAX as u64 + 1] {
            let h = header_for(len, [0; 4]);
            assert_eq!(payload_size(&h), len, "len={}", len);
        }
    }

    #[test]
    fn mask_key_follows_length_field() {
        for len in [5u64, 300, 100_000] {
            let h = header_for(len, [9, 8, 7, 6]);
            assert!(masked(&h));
            assert_eq!(mask_key(&h), Some([9, 8, 7, 6]));
            assert_eq!(payload_size(&h), len);
        }
    }

    #[test]
    fn zero_key_means_unmasked() {
        let h = header_for(5, [0; 4]);
        assert!(!masked(&h));
        assert_eq!(mask_key(&h), None);
        assert_eq!(header_size(&h), 2);
    }

    #[test]
    fn masking_is_involutive() {
        let mut payload = b"mask me twice".to_vec();
        let original = payload.clone();
        apply_mask(&mut payload, [0x12, 0x34, 0x56, 0x78]);
        assert_ne!(payload, original);
        apply_mask(&mut payload, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(payload, original);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut wire = Vec::new();
        encode(Opcode::Binary, b"hello", [0xde, 0xad, 0xbe, 0xef], &mut wire);
        // masked payload is not the plaintext on the wire
        assert_ne!(&wire[wire.len() - 5..], b"hello");
        let frame = decode(&wire).unwrap().expect("complete frame");
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.consumed, wire.len());
    }

    #[test]
    fn decode_needs_whole_frame() {
        let mut wire = Vec::new();
        encode(Opcode::Text, &[7u8; 300], [0; 4], &mut wire);
        for cut in [0, 1, 2, 3, 150, wire.len() - 1] {
            assert!(decode(&wire[..cut]).unwrap().is_none(), "cut={}", cut);
        }
        assert!(decode(&wire).unwrap().is_some());
    }

    #[test]
    fn decode_rejects_reserved_opcode() {
        let wire = [FIN_BIT | 0x5, 0x00];
        assert!(matches!(
            decode(&wire),
            Err(crate::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn sample_wire_bytes() {
        // unmasked "Hel" text frame from the RFC examples family
        let mut wire = Vec::new();
        encode(Opcode::Text, b"Hel", [0; 4], &mut wire);
        assert_eq!(wire, [0x81, 0x03, b'H', b'e', b'l']);
        // 16-bit extension kicks in at 126
        let mut wire = Vec::new();
        encode(Opcode::Binary, &[0u8; 126], [0; 4], &mut wire);
        assert_eq!(&wire[..4], [0x82, 126, 0x00, 0x7e]);
    }
}
