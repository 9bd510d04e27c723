use thiserror::Error;

use crate::command::{Command, Operation};
use crate::crc::{crc16, merge8, split16};
use crate::outputs::{Capabilities, OutputBits, PongFlags};

pub const FRAME_LEN: usize = 8;
pub const REQUEST_MAGIC: u8 = 0x33;
pub const RESPONSE_MAGIC: u8 = 0x34;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame crc mismatch: computed {expected:#06x}, frame carries {actual:#06x}")]
    Crc { expected: u16, actual: u16 },

    #[error("unexpected frame magic {0:#04x}")]
    Magic(u8),
}

/// Writes the CRC of bytes 0..6 into bytes 6..8.
pub fn seal(frame: &mut Frame) {
    let (hi, lo) = split16(crc16(&frame[..6]));
    frame[6] = hi;
    frame[7] = lo;
}

pub fn verify(frame: &Frame) -> bool {
    crc16(&frame[..6]) == merge8(frame[6], frame[7])
}

fn check_crc(frame: &Frame) -> Result<(), FrameError> {
    let expected = crc16(&frame[..6]);
    let actual = merge8(frame[6], frame[7]);
    if expected != actual {
        return Err(FrameError::Crc { expected, actual });
    }
    Ok(())
}

/// A CRC-valid request. The command code is kept raw so that unknown codes can still be
/// answered by the dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Request {
    pub code: u8,
    pub payload: [u8; 4],
}

impl Request {
    pub fn new(operation: Operation) -> Self {
        Self {
            code: operation.command().code(),
            payload: operation.payload(),
        }
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.code)
    }

    /// `None` for command codes this firmware does not know.
    pub fn operation(&self) -> Option<Operation> {
        self.command().map(|cmd| Operation::parse(cmd, &self.payload))
    }

    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = REQUEST_MAGIC;
        frame[1] = self.code;
        frame[2..6].copy_from_slice(&self.payload);
        seal(&mut frame);
        frame
    }
}

/// Validates a request frame. Integrity is checked before the magic so that line noise is
/// reported as a CRC failure.
pub fn decode_request(frame: &Frame) -> Result<Request, FrameError> {
    check_crc(frame)?;
    if frame[0] != REQUEST_MAGIC {
        return Err(FrameError::Magic(frame[0]));
    }
    let mut payload = [0u8; 4];
    payload.copy_from_slice(&frame[2..6]);
    Ok(Request {
        code: frame[1],
        payload,
    })
}

/// Plain (non-`OK`) status codes.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Nothing has been answered yet.
    None = 0x24,
    Crc = 0x40,
    Invalid = 0x45,
    Timeout = 0x48,
}

impl ErrorCode {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x24 => Self::None,
            0x40 => Self::Crc,
            0x45 => Self::Invalid,
            0x48 => Self::Timeout,
            _ => return None,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pong {
    /// Always contains [`PongFlags::OK`] once encoded.
    pub flags: PongFlags,
    pub outputs: OutputBits,
    pub capabilities: Capabilities,
}

/// Every response carries the backend and capability bytes, errors included, so that a host
/// can read the device state from whatever frame it last received.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Response {
    Pong(Pong),
    Error {
        code: ErrorCode,
        outputs: OutputBits,
        capabilities: Capabilities,
    },
}

impl Response {
    /// An error with empty state bytes, for when no backend state is known yet.
    pub fn bare_error(code: ErrorCode) -> Self {
        Self::Error {
            code,
            outputs: OutputBits::default(),
            capabilities: Capabilities::empty(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Pong(_) => None,
            Self::Error { code, .. } => Some(*code),
        }
    }

    /// Bytes 2 and 3, whichever kind of response this is.
    pub fn state(&self) -> (OutputBits, Capabilities) {
        match self {
            Self::Pong(pong) => (pong.outputs, pong.capabilities),
            Self::Error {
                outputs,
                capabilities,
                ..
            } => (*outputs, *capabilities),
        }
    }

    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = RESPONSE_MAGIC;
        match self {
            Self::Pong(pong) => {
                frame[1] = (pong.flags | PongFlags::OK).bits();
                frame[2] = pong.outputs.0;
                frame[3] = pong.capabilities.bits();
            }
            Self::Error {
                code,
                outputs,
                capabilities,
            } => {
                frame[1] = *code as u8;
                frame[2] = outputs.0;
                frame[3] = capabilities.bits();
            }
        }
        seal(&mut frame);
        frame
    }

    /// Host-side parsing of a response frame.
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        check_crc(frame)?;
        if frame[0] != RESPONSE_MAGIC {
            return Err(FrameError::Magic(frame[0]));
        }
        let status = frame[1];
        let outputs = OutputBits(frame[2]);
        let capabilities = Capabilities::from_bits_truncate(frame[3]);
        if status & PongFlags::OK.bits() != 0 {
            return Ok(Self::Pong(Pong {
                flags: PongFlags::from_bits_truncate(status),
                outputs,
                capabilities,
            }));
        }
        // Unknown plain codes are surfaced as `Invalid` rather than failing the whole frame.
        Ok(Self::Error {
            code: ErrorCode::from_code(status).unwrap_or(ErrorCode::Invalid),
            outputs,
            capabilities,
        })
    }
}
