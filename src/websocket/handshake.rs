//! HTTP upgrade handshake state machine.
//!
//! Drives the one-time exchange that upgrades a plain connection to frame
//! traffic. Parsing is line-by-line over whatever input is currently
//! buffered and never fails with an error: malformed peers flip the
//! validity flag and the parser keeps advancing so the read loop cannot
//! stall. The flag becomes visible when the caller asks whether the
//! connection opened.

use crate::base64;
use crate::sha1;
use rand::RngCore;
use std::collections::HashMap;

/// Fixed GUID appended to the client key before hashing (RFC 6455 §1.3).
const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const REQUEST_PREAMBLE: &str = concat!(
    "GET / HTTP/1.1\r\n",
    "User-Agent: packet-ws/",
    env!("CARGO_PKG_VERSION"),
    "\r\n",
    "Connection: Upgrade\r\n",
    "Upgrade: websocket\r\n",
    "Sec-WebSocket-Protocol: binary\r\n",
    "Sec-WebSocket-Version: 13\r\n",
    "Sec-WebSocket-Key: "
);

const RESPONSE_PREAMBLE: &str = concat!(
    "HTTP/1.1 101 Switching Protocols\r\n",
    "Upgrade: websocket\r\n",
    "Connection: Upgrade\r\n",
    "Sec-WebSocket-Protocol: binary\r\n",
    "Sec-WebSocket-Accept: "
);

const BAD_RESPONSE: &str = "HTTP/1.1 400 Bad Request\r\n\r\n";

/// Which side of the upgrade this connection plays. Fixed for the
/// connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Handshake phase. Clients move `Initial → WritingHandshake →
/// ReadingHandshake → ValidatingHeaders → Open`; servers move `Initial →
/// ReadingHandshake → ValidatingHeaders → WritingHandshake → Open`.
/// `Failed` is terminal: a connection that failed validation never opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    Initial,
    WritingHandshake,
    ReadingHandshake,
    ValidatingHeaders,
    Open,
    Failed,
}

/// Line-by-line parse sub-state shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsePhase {
    Method,
    Status,
    Headers,
    End,
}

/// Computes the accept value for a handshake key:
/// `base64(sha1(key ++ GUID))`, 28 characters for the 20-byte digest.
pub fn accept_key(key: &str) -> String {
    let mut sha = sha1::Sha1::new();
    sha.update(key.as_bytes()).expect("key below sha1 limit");
    sha.update(GUID.as_bytes()).expect("guid below sha1 limit");
    base64::encode(&sha.finish()).expect("20-byte digest encodes")
}

pub(super) struct Handshake {
    role: Role,
    phase: Phase,
    parse: ParsePhase,
    /// Lower-cased header name to value. First occurrence wins on
    /// duplicates. Holds the client's own generated key as well, so
    /// validation can recompute the expected accept value.
    headers: HashMap<String, String>,
    valid: bool,
}

impl Handshake {
    pub(super) fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Initial,
            parse: match role {
                Role::Client => ParsePhase::Status,
                Role::Server => ParsePhase::Method,
            },
            headers: HashMap::new(),
            valid: true,
        }
    }

    pub(super) fn phase(&self) -> Phase {
        self.phase
    }

    pub(super) fn role(&self) -> Role {
        self.role
    }

    pub(super) fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub(super) fn is_valid(&self) -> bool {
        self.valid
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::trace!(role = ?self.role, from = ?self.phase, to = ?phase, "handshake phase");
        self.phase = phase;
    }

    /// Builds the client request with a fresh 16-byte random key, recorded
    /// under `sec-websocket-key` for later validation of the response.
    pub(super) fn client_request(&mut self, rng: &mut dyn RngCore) -> Vec<u8> {
        debug_assert_eq!(self.phase, Phase::Initial);
        let mut key = [0u8; 16];
        rng.fill_bytes(&mut key);
        let encoded = base64::encode(&key).expect("16-byte key encodes");
        let mut request = Vec::with_capacity(REQUEST_PREAMBLE.len() + encoded.len() + 4);
        request.extend_from_slice(REQUEST_PREAMBLE.as_bytes());
        request.extend_from_slice(encoded.as_bytes());
        request.extend_from_slice(b"\r\n\r\n");
        self.headers.insert("sec-websocket-key".into(), encoded);
        self.set_phase(Phase::WritingHandshake);
        request
    }

    /// Server entry point: start consuming the request.
    pub(super) fn start_reading(&mut self) {
        debug_assert_eq!(self.phase, Phase::Initial);
        self.set_phase(Phase::ReadingHandshake);
    }

    /// The outgoing handshake bytes were fully handed to the channel.
    pub(super) fn sent(&mut self) {
        match self.role {
            Role::Client => self.set_phase(Phase::ReadingHandshake),
            Role::Server => {
                let next = if self.valid { Phase::Open } else { Phase::Failed };
                self.set_phase(next);
            }
        }
    }

    /// Consumes complete header lines from `input`, returning how many
    /// bytes were used. Incomplete trailing lines are left for the next
    /// call. Bad lines mark the handshake invalid but are still skipped.
    pub(super) fn parse(&mut self, input: &[u8]) -> usize {
        let mut consumed = 0;
        while self.parse != ParsePhase::End {
            let rest = &input[consumed..];
            let line_len = match find_line_end(rest) {
                Some(n) => n,
                None => break,
            };
            let line = &rest[..line_len];
            consumed += line_len + 2;
            match self.parse {
                ParsePhase::Method => self.parse_method_line(line),
                ParsePhase::Status => self.parse_status_line(line),
                ParsePhase::Headers => self.parse_header_line(line),
                ParsePhase::End => unreachable!(),
            }
        }
        if self.parse == ParsePhase::End && self.phase == Phase::ReadingHandshake {
            self.set_phase(Phase::ValidatingHeaders);
        }
        consumed
    }

    fn parse_method_line(&mut self, line: &[u8]) {
        if line.len() < 4 || !line.starts_with(b"GET") {
            self.valid = false;
            return;
        }
        self.parse = ParsePhase::Headers;
    }

    fn parse_status_line(&mut self, line: &[u8]) {
        let ok = line.len() >= 4
            && line.starts_with(b"HTTP")
            && line
                .iter()
                .position(|&b| b == b' ')
                .map(|at| line[at + 1..].starts_with(b"101"))
                .unwrap_or(false);
        if !ok {
            self.valid = false;
            return;
        }
        self.parse = ParsePhase::Headers;
    }

    fn parse_header_line(&mut self, line: &[u8]) {
        if line.is_empty() {
            self.parse = ParsePhase::End;
            return;
        }
        let sep = match line.iter().position(|&b| b == b':') {
            Some(at) => at,
            None => {
                self.valid = false;
                return;
            }
        };
        let name: String = line[..sep]
            .iter()
            .map(|b| (*b as char).to_ascii_lowercase())
            .collect();
        let raw = line[sep + 1..].strip_prefix(b" ").unwrap_or(&line[sep + 1..]);
        let value = String::from_utf8_lossy(raw).into_owned();
        self.headers.entry(name).or_insert(value);
    }

    fn header_is(&self, name: &str, value: &str) -> bool {
        self.headers.get(name).map(String::as_str) == Some(value)
    }

    /// Checks the headers collected during parsing. Only runs the checks if
    /// no line was flagged invalid; value comparison is case-sensitive.
    pub(super) fn validate(&mut self) {
        debug_assert_eq!(self.phase, Phase::ValidatingHeaders);
        if self.valid {
            let role_ok = match self.role {
                Role::Server => {
                    self.headers.contains_key("sec-websocket-key")
                        && self.headers.contains_key("sec-websocket-version")
                }
                Role::Client => {
                    let own_key = self
                        .headers
                        .get("sec-websocket-key")
                        .expect("client stored its key before reading");
                    let expected = accept_key(own_key);
                    self.header_is("sec-websocket-accept", &expected)
                }
            };
            self.valid = role_ok
                && self.header_is("sec-websocket-protocol", "binary")
                && self.header_is("upgrade", "websocket")
                && self.header_is("connection", "Upgrade");
        }
        tracing::debug!(role = ?self.role, valid = self.valid, "handshake validated");
        match self.role {
            // the client has nothing to send back: open or fail right here
            Role::Client => {
                let next = if self.valid { Phase::Open } else { Phase::Failed };
                self.set_phase(next);
            }
            // the server always answers, 101 or 400
            Role::Server => self.set_phase(Phase::WritingHandshake),
        }
    }

    /// Builds the server response after validation: the `101` upgrade with
    /// the computed accept value, or a bare `400` when invalid.
    pub(super) fn server_response(&self) -> Vec<u8> {
        debug_assert_eq!(self.role, Role::Server);
        if !self.valid {
            return BAD_RESPONSE.as_bytes().to_vec();
        }
        let key = self
            .headers
            .get("sec-websocket-key")
            .expect("validated handshake has a key");
        let accept = accept_key(key);
        let mut response = Vec::with_capacity(RESPONSE_PREAMBLE.len() + accept.len() + 4);
        response.extend_from_slice(RESPONSE_PREAMBLE.as_bytes());
        response.extend_from_slice(accept.as_bytes());
        response.extend_from_slice(b"\r\n\r\n");
        response
    }
}

/// Offset of the next `\r\n`, or `None` if no complete line is buffered.
fn find_line_end(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|w| w == b"\r\n")
}
