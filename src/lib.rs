//! # packet-ws
//!
//! Packet-framed buffering over a byte channel, with an RFC 6455 WebSocket
//! layer on top.
//!
//! The core is a growable double-buffer ([`PacketBuf`]) that delimits
//! discrete messages inside a continuous byte stream using a pluggable
//! header layout ([`FrameFormat`]): a plain 4-byte length prefix by
//! default, or WebSocket frame headers with masking and the HTTP upgrade
//! handshake via [`WebSocket`]. The base64 and SHA-1 codecs the handshake
//! accept key depends on are included.
//!
//! Everything is single-threaded and non-blocking: `flush` and `fill`
//! report partial progress instead of waiting, so the crate slots into any
//! event-readiness loop without owning one.
//!
//! ## Example
//!
//! ```ignore
//! use packet_ws::{MemoryChannel, WebSocket};
//!
//! let (a, b) = MemoryChannel::pair();
//! let mut client = WebSocket::client(a);
//! let mut server = WebSocket::server(b);
//! while !(client.handshake()? && server.handshake()?) {}
//!
//! client.begin_packet()?;
//! client.write(b"hello")?;
//! client.end_packet()?;
//! client.flush()?;
//!
//! server.fill()?;
//! assert!(server.read_packet()?);
//! # Ok::<(), packet_ws::Error>(())
//! ```

pub mod base64;
pub mod channel;
pub mod error;
pub mod packet;
pub mod sha1;
pub mod websocket;
pub mod wire;

pub use channel::{Channel, MemoryChannel};
pub use error::{Error, Result};
pub use packet::{FrameFormat, LengthPrefix, PacketBuf, ParsedHeader};
pub use websocket::{accept_key, Role, WebSocket, WsFrames};
