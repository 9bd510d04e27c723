//! SPI slave link. The master clocks one byte in each direction per transfer; the
//! interrupt handler and the main loop share [`SpiExchange`] without locks.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use hid_proto::{Frame, FRAME_LEN};

use super::{Inbound, Transport};

#[derive(Debug)]
pub struct SpiExchange {
    in_buf: [AtomicU8; FRAME_LEN],
    in_index: AtomicUsize,
    receiving: AtomicBool,
    /// A nonzero first byte marks a response ready to be clocked out.
    out_buf: [AtomicU8; FRAME_LEN],
    out_index: AtomicUsize,
}

impl SpiExchange {
    pub fn new() -> Self {
        Self {
            in_buf: core::array::from_fn(|_| AtomicU8::new(0)),
            in_index: AtomicUsize::new(0),
            receiving: AtomicBool::new(false),
            out_buf: core::array::from_fn(|_| AtomicU8::new(0)),
            out_index: AtomicUsize::new(0),
        }
    }

    /// Transfer interrupt body: takes the byte clocked in, returns the byte to clock out.
    pub fn isr_exchange(&self, incoming: u8) -> u8 {
        let outgoing = self.next_outgoing();
        self.accept_incoming(incoming);
        outgoing
    }

    fn next_outgoing(&self) -> u8 {
        let index = self.out_index.load(Ordering::Acquire);
        if self.out_buf[0].load(Ordering::Acquire) == 0 || index >= FRAME_LEN {
            return 0;
        }
        let byte = self.out_buf[index].load(Ordering::Relaxed);
        if index + 1 == FRAME_LEN {
            // Response fully sent: rearm for the next request.
            self.out_index.store(0, Ordering::Release);
            self.in_index.store(0, Ordering::Release);
            self.out_buf[0].store(0, Ordering::Release);
        } else {
            self.out_index.store(index + 1, Ordering::Release);
        }
        byte
    }

    fn accept_incoming(&self, byte: u8) {
        if !self.receiving.load(Ordering::Acquire) && byte != 0 {
            self.receiving.store(true, Ordering::Release);
        }
        let index = self.in_index.load(Ordering::Acquire);
        if self.receiving.load(Ordering::Acquire) && index < FRAME_LEN {
            self.in_buf[index].store(byte, Ordering::Relaxed);
            self.in_index.store(index + 1, Ordering::Release);
            if index + 1 == FRAME_LEN {
                self.receiving.store(false, Ordering::Release);
            }
        }
    }

    /// A complete request, once per exchange: it stays pending until a response is written.
    pub fn take_request(&self) -> Option<Frame> {
        if self.out_buf[0].load(Ordering::Acquire) != 0
            || self.in_index.load(Ordering::Acquire) != FRAME_LEN
        {
            return None;
        }
        let mut frame = [0u8; FRAME_LEN];
        for (dst, src) in frame.iter_mut().zip(&self.in_buf) {
            *dst = src.load(Ordering::Relaxed);
        }
        Some(frame)
    }

    /// Publishes a response. Byte 0 is stored last since it doubles as the ready flag.
    pub fn write_response(&self, frame: &Frame) {
        for i in (0..FRAME_LEN).rev() {
            self.out_buf[i].store(frame[i], Ordering::Release);
        }
    }
}

impl Default for SpiExchange {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SpiLink {
    exchange: Arc<SpiExchange>,
}

impl SpiLink {
    pub fn new(exchange: Arc<SpiExchange>) -> Self {
        Self { exchange }
    }

    pub fn exchange(&self) -> &Arc<SpiExchange> {
        &self.exchange
    }
}

impl Transport for SpiLink {
    fn receive(&mut self, _now_us: u64) -> Option<Inbound> {
        self.exchange.take_request().map(Inbound::Frame)
    }

    fn send(&mut self, frame: &Frame) {
        self.exchange.write_response(frame);
    }
}
