use std::io::Write;
use std::sync::Arc;

use hid_devices_input::ByteQueue;
use hid_proto::{Frame, FRAME_LEN};
use tracing::{trace, warn};

use super::{Inbound, Transport};

/// Filled by the UART receive interrupt, drained by the main loop.
pub type SerialRxQueue = ByteQueue<64>;

pub trait SerialPort {
    fn read_byte(&mut self) -> Option<u8>;
    fn write_frame(&mut self, frame: &Frame);
}

/// UART whose receive side is an interrupt-fed queue and whose transmit side is any writer.
pub struct IsrSerialPort<W> {
    rx: Arc<SerialRxQueue>,
    tx: W,
}

impl<W: Write> IsrSerialPort<W> {
    pub fn new(tx: W) -> Self {
        Self {
            rx: Arc::new(SerialRxQueue::new()),
            tx,
        }
    }

    /// Producer handle for the receive interrupt.
    pub fn rx_queue(&self) -> Arc<SerialRxQueue> {
        Arc::clone(&self.rx)
    }

    pub fn writer(&self) -> &W {
        &self.tx
    }

    /// Receive interrupt body. Bytes arriving while the queue is full are lost.
    pub fn on_rx_interrupt(queue: &SerialRxQueue, byte: u8) {
        if queue.push(byte).is_err() {
            warn!(byte, "serial rx overrun");
        }
    }
}

impl<W: Write> SerialPort for IsrSerialPort<W> {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    fn write_frame(&mut self, frame: &Frame) {
        if let Err(err) = self.tx.write_all(frame).and_then(|()| self.tx.flush()) {
            warn!(%err, "failed to write response");
        }
    }
}

/// Assembles request frames from a byte stream.
pub struct SerialLink<P> {
    port: P,
    buffer: Frame,
    index: usize,
    last_byte_us: u64,
    timeout_us: u64,
}

impl<P: SerialPort> SerialLink<P> {
    pub fn new(port: P, timeout_us: u64) -> Self {
        Self {
            port,
            buffer: [0; FRAME_LEN],
            index: 0,
            last_byte_us: 0,
            timeout_us,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Bytes of the frame currently being assembled.
    pub fn buffered(&self) -> usize {
        self.index
    }
}

impl<P: SerialPort> Transport for SerialLink<P> {
    fn receive(&mut self, now_us: u64) -> Option<Inbound> {
        while let Some(byte) = self.port.read_byte() {
            self.buffer[self.index] = byte;
            if self.index == FRAME_LEN - 1 {
                self.index = 0;
                return Some(Inbound::Frame(self.buffer));
            }
            self.index += 1;
            self.last_byte_us = now_us;
        }

        if self.index > 0 && now_us.saturating_sub(self.last_byte_us) > self.timeout_us {
            trace!(buffered = self.index, "dropping stale partial frame");
            self.index = 0;
            return Some(Inbound::Timeout);
        }
        None
    }

    fn send(&mut self, frame: &Frame) {
        self.port.write_frame(frame);
    }
}
