//! Wire format shared by the HID bridge firmware and its host.
//!
//! Every exchange is a fixed 8-byte frame sealed with a Modbus CRC16 over the
//! first six bytes. The host sends one request and waits for exactly one
//! response; see [`Request`] and [`Response`].

#![forbid(unsafe_code)]

mod command;
mod crc;
mod frame;
mod outputs;

pub use command::{Command, MouseButtons, Operation};
pub use crc::{crc16, merge8, merge8_i16, split16};
pub use frame::{
    decode_request, seal, verify, ErrorCode, Frame, FrameError, Pong, Request, Response,
    FRAME_LEN, REQUEST_MAGIC, RESPONSE_MAGIC,
};
pub use outputs::{Capabilities, KeyboardOutput, MouseOutput, OutputBits, PongFlags};
