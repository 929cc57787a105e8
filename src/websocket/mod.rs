//! RFC 6455 WebSocket layer over the packet buffer.
//!
//! [`WsFrames`] plugs the frame-header codec into [`PacketBuf`] in place of
//! the plain length prefix; [`WebSocket`] adds the HTTP upgrade handshake
//! on top and gates frame traffic on it. Payload frames are binary, as
//! negotiated by the `Sec-WebSocket-Protocol: binary` handshake header.

pub mod frame;
pub mod handshake;

use crate::channel::Channel;
use crate::error::Error;
use crate::packet::{FrameFormat, PacketBuf, ParsedHeader};
use crate::Result;
use frame::Opcode;
use handshake::{Handshake, Phase};
use rand::rngs::ThreadRng;
use rand::RngCore;

pub use handshake::{accept_key, Role};

/// RFC 6455 frame headers as a [`FrameFormat`].
///
/// Clients mask every outgoing payload with a fresh random key; servers
/// send unmasked. The randomness source is injected, never process-global,
/// so tests can run fully deterministic.
pub struct WsFrames<R> {
    role: Role,
    rng: R,
}

impl<R: RngCore> WsFrames<R> {
    pub fn new(role: Role, rng: R) -> Self {
        Self { role, rng }
    }

    fn fresh_mask_key(&mut self) -> [u8; 4] {
        // an all-zero key would read back as "unmasked"
        let mut key = [0u8; 4];
        while key == [0u8; 4] {
            self.rng.fill_bytes(&mut key);
        }
        key
    }
}

impl<R: RngCore> FrameFormat for WsFrames<R> {
    fn reserved_len(&self) -> usize {
        // worst case: 64-bit length extension, plus the mask key for clients
        match self.role {
            Role::Client => frame::MAX_HEADER_SIZE,
            Role::Server => frame::MAX_HEADER_SIZE - frame::MASK_SIZE,
        }
    }

    fn finish_header(&mut self, payload: &mut [u8], header: &mut [u8]) -> Result<usize> {
        header.fill(0);
        header[0] = 0x80 | Opcode::Binary as u8;
        frame::set_payload_size(header, payload.len() as u64);
        if self.role == Role::Client {
            let key = self.fresh_mask_key();
            frame::set_mask_key(header, key);
            frame::apply_mask(payload, key);
        }
        Ok(frame::header_size(header))
    }

    fn parse_header(&self, buf: &[u8]) -> Result<Option<ParsedHeader>> {
        if buf.len() < frame::BASE_SIZE {
            return Ok(None);
        }
        if buf.len() < frame::BASE_SIZE + frame::length_extension(buf) {
            return Ok(None);
        }
        let header_len = frame::header_size(buf);
        if buf.len() < header_len {
            return Ok(None);
        }
        let payload_len = usize::try_from(frame::payload_size(buf))
            .map_err(|_| Error::SizeLimit("frame payload exceeds addressable size".into()))?;
        Ok(Some(ParsedHeader {
            header_len,
            payload_len,
            mask: frame::mask_key(buf),
        }))
    }

    fn open_payload(&self, header: &ParsedHeader, payload: &mut [u8]) {
        if let Some(key) = header.mask {
            frame::apply_mask(payload, key);
        }
    }
}

/// A WebSocket connection: packet traffic behind an HTTP upgrade.
///
/// Drive [`handshake`](Self::handshake) until it returns `true`; only then
/// is the connection open for `begin_packet`/`end_packet` framing. A
/// handshake that fails validation never opens — the packet methods'
/// behavior before `open` is unspecified by this layer, not defended.
pub struct WebSocket<C, R = ThreadRng> {
    buf: PacketBuf<C, WsFrames<R>>,
    handshake: Handshake,
}

impl<C: Channel> WebSocket<C> {
    /// Client side with operating-system randomness.
    pub fn client(channel: C) -> Self {
        Self::client_with_rng(channel, rand::thread_rng())
    }

    /// Server side with operating-system randomness.
    pub fn server(channel: C) -> Self {
        Self::server_with_rng(channel, rand::thread_rng())
    }
}

impl<C: Channel, R: RngCore> WebSocket<C, R> {
    /// Client side with an injected randomness source for key and mask
    /// generation.
    pub fn client_with_rng(channel: C, rng: R) -> Self {
        Self::with_role(channel, Role::Client, rng)
    }

    pub fn server_with_rng(channel: C, rng: R) -> Self {
        Self::with_role(channel, Role::Server, rng)
    }

    fn with_role(channel: C, role: Role, rng: R) -> Self {
        Self {
            buf: PacketBuf::with_format(channel, WsFrames::new(role, rng)),
            handshake: Handshake::new(role),
        }
    }

    pub fn role(&self) -> Role {
        self.handshake.role()
    }

    /// Whether the upgrade completed and frame traffic is permitted.
    pub fn is_open(&self) -> bool {
        self.handshake.is_open()
    }

    /// Whether validation has failed. A connection can be neither open nor
    /// invalid while the handshake is still in flight.
    pub fn is_valid(&self) -> bool {
        self.handshake.is_valid()
    }

    /// Advances the handshake as far as currently-buffered channel traffic
    /// allows: one pump of flush/fill plus any resulting state moves.
    /// Returns whether the connection is open; `false` also covers a
    /// handshake that already failed validation and will never open.
    pub fn handshake(&mut self) -> Result<bool> {
        loop {
            match self.handshake.phase() {
                Phase::Initial => match self.handshake.role() {
                    Role::Client => {
                        let request = self.handshake.client_request(&mut self.buf.format_mut().rng);
                        self.buf.write(&request)?;
                    }
                    Role::Server => self.handshake.start_reading(),
                },
                Phase::WritingHandshake => {
                    self.buf.flush()?;
                    if self.buf.out_pending() > 0 {
                        return Ok(false);
                    }
                    self.handshake.sent();
                }
                Phase::ReadingHandshake => {
                    self.buf.fill()?;
                    let consumed = self.handshake.parse(self.buf.available());
                    self.buf.consume(consumed);
                    if self.handshake.phase() == Phase::ReadingHandshake {
                        return Ok(false);
                    }
                }
                Phase::ValidatingHeaders => {
                    self.handshake.validate();
                    if self.handshake.role() == Role::Server {
                        let response = self.handshake.server_response();
                        self.buf.write(&response)?;
                    }
                }
                Phase::Open => return Ok(true),
                Phase::Failed => return Ok(false),
            }
        }
    }

    /// Starts an outgoing frame. See [`PacketBuf::begin_packet`].
    pub fn begin_packet(&mut self) -> Result<()> {
        self.buf.begin_packet()
    }

    /// Finishes the frame: patches the header and masks the payload when
    /// this side is a client.
    pub fn end_packet(&mut self) -> Result<()> {
        self.buf.end_packet()
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.write(bytes)
    }

    pub fn flush(&mut self) -> Result<usize> {
        self.buf.flush()
    }

    pub fn fill(&mut self) -> Result<usize> {
        self.buf.fill()
    }

    /// Whether a complete frame is buffered; on `true` its payload becomes
    /// readable. See [`PacketBuf::read_packet`].
    pub fn read_packet(&mut self) -> Result<bool> {
        self.buf.read_packet()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.buf.read(buf)
    }

    pub fn payload_remaining(&self) -> usize {
        self.buf.payload_remaining()
    }

    pub fn out_pending(&self) -> usize {
        self.buf.out_pending()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.buf.channel_mut()
    }

    pub fn into_channel(self) -> C {
        self.buf.into_channel()
    }
}
