//! Byte channel boundary under the packet buffer.
//!
//! Anything that can be written to and read from in chunks and may report
//! partial progress qualifies: a non-blocking socket, a pipe, an in-memory
//! buffer for tests. Transports below this line (TLS, proxies) are out of
//! scope for this crate.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// A duplex byte channel with non-blocking semantics.
///
/// `Ok(0)` from either side is valid and means "no progress right now";
/// implementations may also surface `ErrorKind::WouldBlock`, which the
/// packet buffer treats the same way. Any other error is propagated
/// unchanged.
pub trait Channel {
    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes up to `buf.len()` bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl Channel for std::net::TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }
}

/// In-memory duplex channel: two cross-connected byte queues.
///
/// Single-threaded by design, like every component in this crate; use
/// [`MemoryChannel::pair`] to wire a client to a server in tests.
pub struct MemoryChannel {
    rx: Rc<RefCell<VecDeque<u8>>>,
    tx: Rc<RefCell<VecDeque<u8>>>,
}

impl MemoryChannel {
    /// Creates two channels where bytes written to one side become
    /// readable on the other.
    pub fn pair() -> (Self, Self) {
        let a = Rc::new(RefCell::new(VecDeque::new()));
        let b = Rc::new(RefCell::new(VecDeque::new()));
        (
            Self {
                rx: Rc::clone(&a),
                tx: Rc::clone(&b),
            },
            Self { rx: b, tx: a },
        )
    }

    /// Bytes queued towards the peer but not yet read by it.
    pub fn pending(&self) -> usize {
        self.tx.borrow().len()
    }
}

impl Channel for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.rx.borrow_mut();
        let n = buf.len().min(queue.len());
        for slot in buf.iter_mut().take(n) {
            *slot = queue.pop_front().expect("queue length checked");
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.borrow_mut().extend(buf.iter().copied());
        Ok(buf.len())
    }
}
