//! Packet-framed buffering over a byte channel.
//!
//! A [`PacketBuf`] owns two growable arenas: outgoing bytes waiting for the
//! channel and incoming bytes waiting for the application. Writes are
//! delimited into packets with a reserve-then-patch header scheme:
//! `begin_packet` reserves header room before the payload length is known,
//! `end_packet` patches the reserved bytes afterwards. The header layout is
//! pluggable through [`FrameFormat`]; [`LengthPrefix`] is the plain 4-byte
//! default and the WebSocket layer plugs in RFC 6455 frame headers instead.

mod arena;

use crate::channel::Channel;
use crate::error::Error;
use crate::wire;
use crate::Result;
use arena::Arena;
use std::io::ErrorKind;

/// A frame header recognized at the front of the incoming arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    /// Bytes occupied by the header itself.
    pub header_len: usize,
    /// Payload bytes that follow the header.
    pub payload_len: usize,
    /// XOR mask to undo on the payload, if the format masks payloads.
    pub mask: Option<[u8; 4]>,
}

/// Pluggable packet header layout.
///
/// The buffer reserves [`reserved_len`](Self::reserved_len) bytes when a
/// packet begins and hands them back to [`finish_header`](Self::finish_header)
/// once the payload is complete; formats whose final header is shorter than
/// the reservation get the payload shifted down for them.
pub trait FrameFormat {
    /// Header bytes to reserve before the payload is written. Must be an
    /// upper bound on what `finish_header` uses.
    fn reserved_len(&self) -> usize;

    /// Writes the final header for `payload` into `header` (which is
    /// `reserved_len` bytes long) and returns the used prefix length.
    /// May transform the payload in place (masking).
    fn finish_header(&mut self, payload: &mut [u8], header: &mut [u8]) -> Result<usize>;

    /// Tries to parse a header at the front of `buf`. `Ok(None)` means more
    /// bytes are needed; malformed headers are invalid-input errors.
    fn parse_header(&self, buf: &[u8]) -> Result<Option<ParsedHeader>>;

    /// Undoes any payload transformation announced by `parse_header`.
    fn open_payload(&self, header: &ParsedHeader, payload: &mut [u8]) {
        let _ = (header, payload);
    }
}

/// Default header layout: a 4-byte network-order total frame size
/// (header plus payload).
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefix;

impl LengthPrefix {
    const HEADER_LEN: usize = 4;
}

impl FrameFormat for LengthPrefix {
    fn reserved_len(&self) -> usize {
        Self::HEADER_LEN
    }

    fn finish_header(&mut self, payload: &mut [u8], header: &mut [u8]) -> Result<usize> {
        let total = payload.len() + Self::HEADER_LEN;
        let total = u32::try_from(total)
            .map_err(|_| Error::SizeLimit(format!("packet of {} bytes overflows prefix", total)))?;
        wire::put_u32(header, total);
        Ok(Self::HEADER_LEN)
    }

    fn parse_header(&self, buf: &[u8]) -> Result<Option<ParsedHeader>> {
        if buf.len() < Self::HEADER_LEN {
            return Ok(None);
        }
        let total = wire::get_u32(buf) as usize;
        if total < Self::HEADER_LEN {
            return Err(Error::InvalidInput(format!(
                "length prefix {} is smaller than its own header",
                total
            )));
        }
        Ok(Some(ParsedHeader {
            header_len: Self::HEADER_LEN,
            payload_len: total - Self::HEADER_LEN,
            mask: None,
        }))
    }
}

const DEFAULT_CAPACITY: usize = 512;

/// Double-buffered packet engine over a [`Channel`].
///
/// Single-threaded and non-reentrant: one instance belongs to one
/// connection. `flush` and `fill` report partial progress (including zero)
/// rather than blocking; the caller's retry loop provides the waiting.
pub struct PacketBuf<C, F = LengthPrefix> {
    channel: C,
    format: F,
    out: Arena,
    inn: Arena,
    /// Offset of the reserved header in `out` between `begin_packet` and
    /// `end_packet`; `None` when no packet is open.
    packet_start: Option<usize>,
    /// Unread payload bytes of the packet recognized by `read_packet`.
    payload: usize,
}

impl<C: Channel> PacketBuf<C> {
    /// Packet buffer with the default 4-byte length-prefix format.
    pub fn new(channel: C) -> Self {
        Self::with_format(channel, LengthPrefix)
    }
}

impl<C: Channel, F: FrameFormat> PacketBuf<C, F> {
    pub fn with_format(channel: C, format: F) -> Self {
        Self::with_limits(channel, format, DEFAULT_CAPACITY, usize::MAX)
    }

    /// Starts both arenas at `capacity` bytes and caps their growth at
    /// `max_size`; exceeding the cap fails with a size-limit error.
    pub fn with_limits(channel: C, format: F, capacity: usize, max_size: usize) -> Self {
        Self {
            channel,
            format,
            out: Arena::new(capacity, max_size),
            inn: Arena::new(capacity, max_size),
            packet_start: None,
            payload: 0,
        }
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn format_mut(&mut self) -> &mut F {
        &mut self.format
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Appends bytes to the outgoing arena, growing it as needed.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out_ensure(bytes.len())?;
        self.out.space()[..bytes.len()].copy_from_slice(bytes);
        self.out.commit(bytes.len());
        Ok(())
    }

    /// Records the packet start and reserves header room by advancing the
    /// write cursor without writing content.
    pub fn begin_packet(&mut self) -> Result<()> {
        debug_assert!(self.packet_start.is_none(), "packet already open");
        let reserved = self.format.reserved_len();
        self.out_ensure(reserved)?;
        self.packet_start = Some(self.out.tail);
        self.out.space()[..reserved].fill(0);
        self.out.commit(reserved);
        Ok(())
    }

    /// Patches the reserved header now that the payload length is known.
    pub fn end_packet(&mut self) -> Result<()> {
        let start = self
            .packet_start
            .take()
            .expect("end_packet without begin_packet");
        let reserved = self.format.reserved_len();
        let tail = self.out.tail;
        let (header, payload) = self.out.data[start..tail].split_at_mut(reserved);
        let payload_len = tail - start - reserved;
        let used = self.format.finish_header(payload, header)?;
        debug_assert!(used <= reserved);
        if used < reserved {
            // shorter final header: slide the payload down over the slack
            self.out.data.copy_within(start + reserved..tail, start + used);
            self.out.tail -= reserved - used;
        }
        tracing::trace!(header = used, payload = payload_len, "packet framed");
        Ok(())
    }

    /// Hands outgoing bytes to the channel: one write attempt, partial
    /// progress allowed. Bytes belonging to a still-open packet are held
    /// back. Returns the number of bytes the channel accepted; zero is a
    /// valid result for a channel with no room right now.
    pub fn flush(&mut self) -> Result<usize> {
        let end = self.packet_start.unwrap_or(self.out.tail);
        let pending = &self.out.data[self.out.head..end];
        if pending.is_empty() {
            return Ok(0);
        }
        let n = match self.channel.write(pending) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
            Err(e) => return Err(e.into()),
        };
        self.out.consume(n);
        // keep the unsent remainder at the arena start
        let shift = self.out.compact();
        if let Some(start) = self.packet_start.as_mut() {
            *start -= shift;
        }
        Ok(n)
    }

    /// Pulls bytes from the channel into the incoming arena until the
    /// channel has nothing more, growing the arena when it is full.
    /// Returns the number of bytes read; zero means nothing was available.
    pub fn fill(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            if self.inn.room() == 0 {
                self.inn.compact();
                self.inn.ensure(1)?;
            }
            match self.channel.read(self.inn.space()) {
                Ok(0) => break,
                Ok(n) => {
                    self.inn.commit(n);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Checks whether a complete packet sits at the front of the incoming
    /// arena. On success the header is consumed, the payload is unmasked in
    /// place, and [`read`](Self::read) yields the payload bytes. Returns
    /// `false` without consuming anything when more input is needed.
    pub fn read_packet(&mut self) -> Result<bool> {
        if self.payload > 0 {
            return Ok(true);
        }
        let parsed = match self.format.parse_header(self.inn.readable())? {
            Some(parsed) => parsed,
            None => return Ok(false),
        };
        let total = parsed.header_len + parsed.payload_len;
        if self.inn.len() < total {
            return Ok(false);
        }
        let region = &mut self.inn.readable_mut()[parsed.header_len..total];
        self.format.open_payload(&parsed, region);
        self.inn.consume(parsed.header_len);
        self.payload = parsed.payload_len;
        Ok(true)
    }

    /// Copies payload bytes of the current packet into `buf`, returning how
    /// many were copied. Only valid after `read_packet` returned `true`;
    /// never reads past the recognized packet boundary.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.payload);
        buf[..n].copy_from_slice(&self.inn.readable()[..n]);
        self.inn.consume(n);
        self.payload -= n;
        n
    }

    /// Unread payload bytes of the packet recognized by `read_packet`.
    pub fn payload_remaining(&self) -> usize {
        self.payload
    }

    /// Outgoing bytes not yet accepted by the channel.
    pub fn out_pending(&self) -> usize {
        self.out.len()
    }

    /// Buffered incoming bytes, for layers that parse the stream directly
    /// (the handshake reads header lines before frame traffic starts).
    pub fn available(&self) -> &[u8] {
        self.inn.readable()
    }

    /// Drops `n` buffered incoming bytes. Companion to [`available`](Self::available).
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.payload == 0, "consuming across a packet payload");
        self.inn.consume(n);
    }

    fn out_ensure(&mut self, n: usize) -> Result<()> {
        if self.out.room() < n {
            let shift = self.out.compact();
            if let Some(start) = self.packet_start.as_mut() {
                *start -= shift;
            }
            self.out.ensure(n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use std::io;

    /// Channel adapter that accepts at most `cap` bytes per write call.
    struct Trickle<C> {
        inner: C,
        cap: usize,
    }

    impl<C: Channel> Channel for Trickle<C> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.cap);
            self.inner.read(&mut buf[..n])
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.cap);
            self.inner.write(&buf[..n])
        }
    }

    fn send_packet<C: Channel>(buf: &mut PacketBuf<C>, payload: &[u8]) {
        buf.begin_packet().unwrap();
        buf.write(payload).unwrap();
        buf.end_packet().unwrap();
        while buf.out_pending() > 0 {
            buf.flush().unwrap();
        }
    }

    fn recv_packet<C: Channel>(buf: &mut PacketBuf<C>) -> Vec<u8> {
        while !buf.read_packet().unwrap() {
            assert!(buf.fill().unwrap() > 0, "peer sent a truncated packet");
        }
        let mut out = vec![0u8; buf.payload_remaining()];
        assert_eq!(buf.read(&mut out), out.len());
        out
    }

    #[test]
    fn length_prefix_roundtrip() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::new(a);
        let mut rx = PacketBuf::new(b);
        send_packet(&mut tx, b"hello packet");
        assert_eq!(recv_packet(&mut rx), b"hello packet");
    }

    #[test]
    fn empty_packet_roundtrip() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::new(a);
        let mut rx = PacketBuf::new(b);
        send_packet(&mut tx, b"");
        assert_eq!(recv_packet(&mut rx), b"");
    }

    #[test]
    fn several_packets_in_one_fill() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::new(a);
        let mut rx = PacketBuf::new(b);
        for payload in [&b"one"[..], b"two", b"three"] {
            send_packet(&mut tx, payload);
        }
        rx.fill().unwrap();
        for payload in [&b"one"[..], b"two", b"three"] {
            assert!(rx.read_packet().unwrap());
            let mut out = vec![0u8; rx.payload_remaining()];
            rx.read(&mut out);
            assert_eq!(out, payload);
        }
        assert!(!rx.read_packet().unwrap());
    }

    #[test]
    fn read_packet_waits_for_full_payload() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::with_format(Trickle { inner: a, cap: 3 }, LengthPrefix);
        let mut rx = PacketBuf::with_format(Trickle { inner: b, cap: 3 }, LengthPrefix);
        tx.begin_packet().unwrap();
        tx.write(b"dribble").unwrap();
        tx.end_packet().unwrap();
        while tx.out_pending() > 0 {
            tx.flush().unwrap();
            rx.fill().unwrap();
            if tx.out_pending() > 0 {
                // incomplete input never yields a packet
                assert!(!rx.read_packet().unwrap());
            }
        }
        assert!(rx.read_packet().unwrap());
        let mut out = vec![0u8; rx.payload_remaining()];
        rx.read(&mut out);
        assert_eq!(out, b"dribble");
    }

    #[test]
    fn flush_holds_back_open_packet() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::new(a);
        let mut rx = PacketBuf::new(b);
        send_packet(&mut tx, b"first");
        tx.begin_packet().unwrap();
        tx.write(b"second, unfinished").unwrap();
        tx.flush().unwrap();
        rx.fill().unwrap();
        assert!(rx.read_packet().unwrap());
        let mut out = vec![0u8; rx.payload_remaining()];
        rx.read(&mut out);
        assert_eq!(out, b"first");
        // nothing of the open packet went out
        assert!(!rx.read_packet().unwrap());
        assert_eq!(rx.available().len(), 0);
        tx.end_packet().unwrap();
        while tx.out_pending() > 0 {
            tx.flush().unwrap();
        }
        assert_eq!(recv_packet(&mut rx), b"second, unfinished");
    }

    #[test]
    fn arena_growth_keeps_header_slot() {
        // payload far beyond the initial capacity forces growth while a
        // packet is open; the patched header must still be correct
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::with_limits(a, LengthPrefix, 16, usize::MAX);
        let mut rx = PacketBuf::with_limits(b, LengthPrefix, 16, usize::MAX);
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        send_packet(&mut tx, &payload);
        assert_eq!(recv_packet(&mut rx), payload);
    }

    #[test]
    fn max_size_is_a_hard_error() {
        let (a, _b) = MemoryChannel::pair();
        let mut tx = PacketBuf::with_limits(a, LengthPrefix, 8, 32);
        tx.begin_packet().unwrap();
        assert!(matches!(
            tx.write(&[0u8; 64]),
            Err(crate::Error::SizeLimit(_))
        ));
    }

    #[test]
    fn zero_progress_is_not_an_error() {
        let (a, _b) = MemoryChannel::pair();
        let mut buf = PacketBuf::new(a);
        assert_eq!(buf.flush().unwrap(), 0);
        assert_eq!(buf.fill().unwrap(), 0);
        assert!(!buf.read_packet().unwrap());
    }

    #[test]
    fn corrupt_length_prefix_is_invalid_input() {
        let (a, b) = MemoryChannel::pair();
        let mut tx = PacketBuf::new(a);
        let mut rx = PacketBuf::new(b);
        // total smaller than the header itself can never be valid
        tx.write(&[0, 0, 0, 1]).unwrap();
        while tx.out_pending() > 0 {
            tx.flush().unwrap();
        }
        rx.fill().unwrap();
        assert!(matches!(
            rx.read_packet(),
            Err(crate::Error::InvalidInput(_))
        ));
    }
}
