//! Bounded single-producer / single-consumer byte queue.
//!
//! The producer (a logical PS/2 device or a UART RX interrupt) only calls
//! [`ByteQueue::push`]; the consumer (the phy, possibly from interrupt
//! context, or the main loop) only calls [`ByteQueue::pop`] and
//! [`ByteQueue::clear`]. Both sides take `&self`, so the queue can live in a
//! `static` or behind an `Arc` without a lock.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
}

pub struct ByteQueue<const N: usize> {
    slots: [AtomicU8; N],
    /// Total bytes consumed. Only written by the consumer.
    head: AtomicUsize,
    /// Total bytes produced. Only written by the producer.
    tail: AtomicUsize,
}

impl<const N: usize> ByteQueue<N> {
    pub fn new() -> Self {
        assert!(N > 0, "ByteQueue needs at least one slot");
        Self {
            slots: core::array::from_fn(|_| AtomicU8::new(0)),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots the producer can still fill. Only grows under a concurrent consumer.
    pub fn free(&self) -> usize {
        N.saturating_sub(self.len())
    }

    pub fn push(&self, byte: u8) -> Result<(), PushError> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= N {
            return Err(PushError::Full);
        }
        self.slots[tail % N].store(byte, Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn pop(&self) -> Option<u8> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let byte = self.slots[head % N].load(Ordering::Relaxed);
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Drops everything queued so far. Consumer side only.
    pub fn clear(&self) {
        let tail = self.tail.load(Ordering::Acquire);
        self.head.store(tail, Ordering::Release);
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for ByteQueue<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ByteQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn preserves_fifo_order_across_wraparound() {
        let q = ByteQueue::<4>::new();
        for round in 0..10u8 {
            q.push(round).unwrap();
            q.push(round.wrapping_add(100)).unwrap();
            assert_eq!(q.pop(), Some(round));
            assert_eq!(q.pop(), Some(round.wrapping_add(100)));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn rejects_push_when_full() {
        let q = ByteQueue::<2>::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.push(3), Err(PushError::Full));
        assert_eq!(q.len(), 2);
        assert_eq!(q.free(), 0);
        assert_eq!(q.pop(), Some(1));
        q.push(3).unwrap();
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn clear_discards_pending_bytes() {
        let q = ByteQueue::<8>::new();
        for b in 0..5 {
            q.push(b).unwrap();
        }
        q.clear();
        assert!(q.is_empty());
        q.push(9).unwrap();
        assert_eq!(q.pop(), Some(9));
    }

    #[test]
    fn producer_and_consumer_threads_see_every_byte_in_order() {
        let q = Arc::new(ByteQueue::<16>::new());
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for i in 0..2000u32 {
                    let byte = (i % 251) as u8;
                    while q.push(byte).is_err() {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(2000);
        while received.len() < 2000 {
            if let Some(byte) = q.pop() {
                received.push(byte);
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();

        let expected: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(received, expected);
    }
}
