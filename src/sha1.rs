//! Streaming SHA-1 digest (FIPS 180-1).
//!
//! SHA-1 is broken for collision resistance; it is carried here solely
//! because RFC 6455 defines the handshake accept value as
//! `base64(sha1(key ++ GUID))`.
//!
//! Finalization consumes the hasher, so re-padding an already-finalized
//! digest is unrepresentable.

use crate::error::Error;
use crate::wire;
use crate::Result;

const K_0_19: u32 = 0x5a82_7999;
const K_20_39: u32 = 0x6ed9_eba1;
const K_40_59: u32 = 0x8f1b_bcdc;
const K_60_79: u32 = 0xca62_c1d6;

const INITIAL_STATE: [u32; 5] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476, 0xc3d2_e1f0];

/// Streaming SHA-1 state: five accumulator words, one pending 64-byte
/// block, and the count of message bits seen so far.
pub struct Sha1 {
    state: [u32; 5],
    block: [u8; 64],
    block_len: usize,
    bits: u64,
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sha1 {
    pub fn new() -> Self {
        Self {
            state: INITIAL_STATE,
            block: [0u8; 64],
            block_len: 0,
            bits: 0,
        }
    }

    /// Appends `data`, processing 64-byte blocks as they fill up.
    ///
    /// Fails with a size-limit error if the cumulative bit length would
    /// overflow the 64-bit counter in the final padding block.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        let added = (data.len() as u64)
            .checked_mul(8)
            .and_then(|b| self.bits.checked_add(b))
            .ok_or_else(|| Error::SizeLimit("sha1 input exceeds 2^64 bits".into()))?;
        self.bits = added;
        let mut rest = data;
        while !rest.is_empty() {
            let room = 64 - self.block_len;
            let n = room.min(rest.len());
            self.block[self.block_len..self.block_len + n].copy_from_slice(&rest[..n]);
            self.block_len += n;
            rest = &rest[n..];
            if self.block_len == 64 {
                let block = self.block;
                self.process_block(&block);
                self.block_len = 0;
            }
        }
        Ok(())
    }

    /// Pads the pending block and returns the 20-byte digest, big-endian.
    pub fn finish(mut self) -> [u8; 20] {
        let bits = self.bits;
        self.block[self.block_len] = 0x80;
        self.block_len += 1;
        if 64 - self.block_len < 8 {
            // no room left for the 64-bit length, split across two blocks
            self.block[self.block_len..].fill(0);
            let block = self.block;
            self.process_block(&block);
            self.block_len = 0;
        }
        self.block[self.block_len..56].fill(0);
        wire::put_u64(&mut self.block[56..], bits);
        let block = self.block;
        self.process_block(&block);
        let mut digest = [0u8; 20];
        for (i, word) in self.state.iter().enumerate() {
            wire::put_u32(&mut digest[i * 4..], *word);
        }
        digest
    }

    fn process_block(&mut self, block: &[u8; 64]) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = wire::get_u32(&block[i * 4..]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }
        let [mut a, mut b, mut c, mut d, mut e] = self.state;
        for (i, &word) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), K_0_19),
                20..=39 => (b ^ c ^ d, K_20_39),
                40..=59 => ((b & c) | (b & d) | (c & d), K_40_59),
                _ => (b ^ c ^ d, K_60_79),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(word)
                .wrapping_add(k);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }
        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
        self.state[4] = self.state[4].wrapping_add(e);
    }
}

/// One-shot digest of `data`.
pub fn digest(data: &[u8]) -> [u8; 20] {
    let mut sha = Sha1::new();
    // the only failure mode is the 2^64-bit counter overflow, which a
    // single in-memory slice cannot reach
    sha.update(data).expect("slice below sha1 length limit");
    sha.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        let vectors: &[(&[u8], &str)] = &[
            (b"", "da39a3ee5e6b4b0d3255bfef95601890afd80709"),
            (b"abc", "a9993e364706816aba3e25717850c26c9cd0d89d"),
            (
                b"The quick brown fox jumps over the lazy dog",
                "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12",
            ),
            (
                b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq",
                "84983e441c3bd26ebaae4aa1f95129e5e54670f1",
            ),
        ];
        for (input, expected) in vectors {
            assert_eq!(hex::encode(digest(input)), *expected);
        }
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut sha = Sha1::new();
        for chunk in data.chunks(7) {
            sha.update(chunk).unwrap();
        }
        assert_eq!(sha.finish(), digest(data));
    }

    #[test]
    fn million_a() {
        let mut sha = Sha1::new();
        let chunk = [b'a'; 1000];
        for _ in 0..1000 {
            sha.update(&chunk).unwrap();
        }
        assert_eq!(
            hex::encode(sha.finish()),
            "34aa973cd4c4daa4f61eeb2bdbad27316534016f"
        );
    }

    #[test]
    fn padding_split_across_blocks() {
        // 56..63 bytes leave no room for the length field in the same block
        let vectors: &[(usize, &str)] = &[
            (55, "cef734ba81a024479e09eb5a75b6ddae62e6abf1"),
            (56, "901305367c259952f4e7af8323f480d59f81335b"),
            (57, "025ecbd5d70f8fb3c5457cd96bab13fda305dc59"),
            (63, "0ddc4e0cccd9a12850deb5abb0853a4425559fec"),
            (64, "bb2fa3ee7afb9f54c6dfb5d021f14b1ffe40c163"),
            (65, "78c741ddc482e4cdf8c474a0876347a0905b6233"),
        ];
        for (len, expected) in vectors {
            assert_eq!(hex::encode(digest(&vec![b'x'; *len])), *expected);
        }
    }

    #[test]
    fn length_overflow_is_size_limit() {
        let mut sha = Sha1::new();
        sha.bits = u64::MAX - 7;
        assert!(matches!(
            sha.update(b"x"),
            Err(crate::Error::SizeLimit(_))
        ));
    }
}
