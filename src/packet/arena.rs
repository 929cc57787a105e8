//! Contiguous growable byte arena with read/write cursors.

use crate::error::Error;
use crate::Result;

/// One arena: bytes in `data[head..tail]` are buffered and unconsumed,
/// `data[tail..]` is writable room.
///
/// Invariant: `head <= tail <= data.len() <= limit`. Growth doubles the
/// backing storage and never reorders buffered bytes; positions handed out
/// to callers are indices, so growth cannot invalidate them.
pub(crate) struct Arena {
    pub(super) data: Vec<u8>,
    pub(super) head: usize,
    pub(super) tail: usize,
    limit: usize,
}

impl Arena {
    pub(super) fn new(capacity: usize, limit: usize) -> Self {
        Self {
            data: vec![0; capacity.min(limit)],
            head: 0,
            tail: 0,
            limit,
        }
    }

    /// Buffered, unconsumed bytes.
    pub(super) fn readable(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    pub(super) fn readable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.head..self.tail]
    }

    pub(super) fn len(&self) -> usize {
        self.tail - self.head
    }

    pub(super) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Writable room at the tail.
    pub(super) fn room(&self) -> usize {
        self.data.len() - self.tail
    }

    pub(super) fn space(&mut self) -> &mut [u8] {
        &mut self.data[self.tail..]
    }

    pub(super) fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.room());
        self.tail += n;
    }

    /// Drops `n` bytes from the front; cursors rewind to zero once the
    /// arena drains so the space is reused without copying.
    pub(super) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.head += n;
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
    }

    /// Moves buffered bytes to the arena start. Returns the shift so the
    /// caller can adjust any saved positions.
    pub(super) fn compact(&mut self) -> usize {
        let shift = self.head;
        if shift > 0 {
            self.data.copy_within(self.head..self.tail, 0);
            self.tail -= shift;
            self.head = 0;
        }
        shift
    }

    /// Grows the backing storage (doubling) until at least `n` writable
    /// bytes are available at the tail. Does not compact.
    pub(super) fn ensure(&mut self, n: usize) -> Result<()> {
        if self.room() >= n {
            return Ok(());
        }
        let needed = self
            .tail
            .checked_add(n)
            .ok_or_else(|| Error::SizeLimit("arena size overflow".into()))?;
        if needed > self.limit {
            return Err(Error::SizeLimit(format!(
                "arena would exceed maximum of {} bytes",
                self.limit
            )));
        }
        let mut new_len = self.data.len().max(1);
        while new_len < needed {
            new_len = new_len.saturating_mul(2);
        }
        self.data.resize(new_len.min(self.limit), 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_preserves_bytes() {
        let mut arena = Arena::new(4, usize::MAX);
        arena.ensure(6).unwrap();
        arena.space()[..6].copy_from_slice(b"abcdef");
        arena.commit(6);
        arena.ensure(100).unwrap();
        assert_eq!(arena.readable(), b"abcdef");
        assert!(arena.room() >= 100);
    }

    #[test]
    fn consume_rewinds_when_drained() {
        let mut arena = Arena::new(8, usize::MAX);
        arena.space()[..4].copy_from_slice(b"abcd");
        arena.commit(4);
        arena.consume(2);
        assert_eq!(arena.readable(), b"cd");
        assert_eq!(arena.head, 2);
        arena.consume(2);
        assert_eq!(arena.head, 0);
        assert_eq!(arena.tail, 0);
    }

    #[test]
    fn compact_shifts_to_start() {
        let mut arena = Arena::new(8, usize::MAX);
        arena.space()[..6].copy_from_slice(b"abcdef");
        arena.commit(6);
        arena.consume(4);
        assert_eq!(arena.compact(), 4);
        assert_eq!(arena.readable(), b"ef");
        assert_eq!(arena.compact(), 0);
    }

    #[test]
    fn limit_is_enforced() {
        let mut arena = Arena::new(4, 16);
        arena.ensure(16).unwrap();
        assert!(matches!(
            arena.ensure(17),
            Err(crate::Error::SizeLimit(_))
        ));
    }
}
