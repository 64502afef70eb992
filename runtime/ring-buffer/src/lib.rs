//! Byte Ring Buffer - Fixed-capacity FIFO over caller-owned storage
//!
//! # Purpose
//! Software queue between a UART's hardware FIFO and application code. One
//! buffer exists per direction per line; the interrupt handler is the
//! producer for receive and the consumer for transmit.
//!
//! # Concurrency
//! The buffer performs no locking. It assumes a single producer and a single
//! consumer at any instant. Callers that share a buffer with an interrupt
//! handler must suppress that handler's source around every access.
//!
//! # Failure Policy
//! Writing to a full buffer and reading from an empty one are expected
//! conditions, reported through the return value.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

/// Ring buffer for bytes
///
/// Capacity is the length of the storage slice handed to [`RingBuffer::new`].
/// Any capacity works; a capacity of zero yields a buffer that is both empty
/// and full.
pub struct RingBuffer<'a> {
    storage: &'a mut [u8],
    head: usize,  // Write position
    tail: usize,  // Read position
    count: usize, // Number of items
}

impl<'a> RingBuffer<'a> {
    /// Bind `storage` as the backing store and start out empty
    ///
    /// Previous contents of `storage` are ignored.
    pub fn new(storage: &'a mut [u8]) -> Self {
        Self {
            storage,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Get the number of bytes in the buffer
    pub fn len(&self) -> usize {
        self.count
    }

    /// Number of bytes that can still be written
    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if the buffer is full
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Append a byte
    ///
    /// Returns `false` and leaves the buffer untouched if it is full. The
    /// caller decides what an overrun means.
    #[must_use]
    pub fn write(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }

        self.storage[self.head] = byte;
        self.head = self.advance(self.head);
        self.count += 1;
        true
    }

    /// Remove and return the oldest byte
    ///
    /// Returns `None` if the buffer is empty
    pub fn read(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }

        let byte = self.storage[self.tail];
        self.tail = self.advance(self.tail);
        self.count -= 1;
        Some(byte)
    }

    /// Peek at the next byte without removing it
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.storage[self.tail])
        }
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    #[inline]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity() {
            0
        } else {
            next
        }
    }
}

impl core::fmt::Debug for RingBuffer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.count)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}
