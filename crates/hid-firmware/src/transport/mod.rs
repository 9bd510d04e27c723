//! Links to the KVM host. Each delivers whole 8-byte frames to the dispatcher.

pub mod serial;
pub mod spi;

use hid_proto::Frame;

pub use serial::{IsrSerialPort, SerialLink, SerialPort, SerialRxQueue};
pub use spi::{SpiExchange, SpiLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    /// A partial frame went stale and was dropped.
    Timeout,
}

pub trait Transport {
    /// Never blocks; `None` when nothing complete has arrived yet.
    fn receive(&mut self, now_us: u64) -> Option<Inbound>;
    fn send(&mut self, frame: &Frame);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn receive(&mut self, now_us: u64) -> Option<Inbound> {
        (**self).receive(now_us)
    }

    fn send(&mut self, frame: &Frame) {
        (**self).send(frame)
    }
}
