use crate::crc::merge8_i16;

/// Request command codes (byte 1 of a request frame).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Ping = 0x01,
    Repeat = 0x02,
    SetKeyboard = 0x03,
    SetMouse = 0x04,
    SetConnected = 0x05,
    ClearHid = 0x10,
    Key = 0x11,
    MouseMove = 0x12,
    MouseButton = 0x13,
    MouseWheel = 0x14,
    MouseRelative = 0x15,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::Ping,
            0x02 => Self::Repeat,
            0x03 => Self::SetKeyboard,
            0x04 => Self::SetMouse,
            0x05 => Self::SetConnected,
            0x10 => Self::ClearHid,
            0x11 => Self::Key,
            0x12 => Self::MouseMove,
            0x13 => Self::MouseButton,
            0x14 => Self::MouseWheel,
            0x15 => Self::MouseRelative,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Number of meaningful payload bytes. Anything past this is ignored.
    pub fn arity(self) -> usize {
        match self {
            Self::Ping | Self::Repeat | Self::ClearHid => 0,
            Self::SetKeyboard | Self::SetMouse | Self::SetConnected => 1,
            Self::Key | Self::MouseButton | Self::MouseWheel | Self::MouseRelative => 2,
            Self::MouseMove => 4,
        }
    }
}

/// Button changes carried by `MOUSE_BUTTON`. `None` leaves the button untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MouseButtons {
    pub left: Option<bool>,
    pub right: Option<bool>,
    pub middle: Option<bool>,
    pub extra_up: Option<bool>,
    pub extra_down: Option<bool>,
}

impl MouseButtons {
    const LEFT: (u8, u8) = (0b1000_0000, 0b0000_1000);
    const RIGHT: (u8, u8) = (0b0100_0000, 0b0000_0100);
    const MIDDLE: (u8, u8) = (0b0010_0000, 0b0000_0010);
    const EXTRA_UP: (u8, u8) = (0b1000_0000, 0b0000_1000);
    const EXTRA_DOWN: (u8, u8) = (0b0100_0000, 0b0000_0100);

    /// Decodes the two (select, state) bit-pair bytes of a `MOUSE_BUTTON` payload.
    pub fn from_payload(main: u8, extra: u8) -> Self {
        fn pair(byte: u8, (select, state): (u8, u8)) -> Option<bool> {
            (byte & select != 0).then_some(byte & state != 0)
        }
        Self {
            left: pair(main, Self::LEFT),
            right: pair(main, Self::RIGHT),
            middle: pair(main, Self::MIDDLE),
            extra_up: pair(extra, Self::EXTRA_UP),
            extra_down: pair(extra, Self::EXTRA_DOWN),
        }
    }

    pub fn to_payload(self) -> [u8; 2] {
        fn pair(value: Option<bool>, (select, state): (u8, u8)) -> u8 {
            match value {
                Some(true) => select | state,
                Some(false) => select,
                None => 0,
            }
        }
        [
            pair(self.left, Self::LEFT) | pair(self.right, Self::RIGHT) | pair(self.middle, Self::MIDDLE),
            pair(self.extra_up, Self::EXTRA_UP) | pair(self.extra_down, Self::EXTRA_DOWN),
        ]
    }
}

/// A fully decoded request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    Ping,
    Repeat,
    SetKeyboard(u8),
    SetMouse(u8),
    SetConnected(bool),
    ClearHid,
    Key { code: u8, pressed: bool },
    MouseButtons(MouseButtons),
    MouseMove { x: i16, y: i16 },
    MouseRelative { dx: i8, dy: i8 },
    /// Vertical component only; the horizontal payload byte is ignored.
    MouseWheel { dy: i8 },
}

impl Operation {
    pub(crate) fn parse(command: Command, payload: &[u8; 4]) -> Self {
        match command {
            Command::Ping => Self::Ping,
            Command::Repeat => Self::Repeat,
            Command::SetKeyboard => Self::SetKeyboard(payload[0]),
            Command::SetMouse => Self::SetMouse(payload[0]),
            Command::SetConnected => Self::SetConnected(payload[0] != 0),
            Command::ClearHid => Self::ClearHid,
            Command::Key => Self::Key {
                code: payload[0],
                pressed: payload[1] != 0,
            },
            Command::MouseButton => Self::MouseButtons(MouseButtons::from_payload(payload[0], payload[1])),
            Command::MouseMove => Self::MouseMove {
                x: merge8_i16(payload[0], payload[1]),
                y: merge8_i16(payload[2], payload[3]),
            },
            Command::MouseRelative => Self::MouseRelative {
                dx: payload[0] as i8,
                dy: payload[1] as i8,
            },
            Command::MouseWheel => Self::MouseWheel {
                dy: payload[1] as i8,
            },
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Self::Ping => Command::Ping,
            Self::Repeat => Command::Repeat,
            Self::SetKeyboard(_) => Command::SetKeyboard,
            Self::SetMouse(_) => Command::SetMouse,
            Self::SetConnected(_) => Command::SetConnected,
            Self::ClearHid => Command::ClearHid,
            Self::Key { .. } => Command::Key,
            Self::MouseButtons(_) => Command::MouseButton,
            Self::MouseMove { .. } => Command::MouseMove,
            Self::MouseRelative { .. } => Command::MouseRelative,
            Self::MouseWheel { .. } => Command::MouseWheel,
        }
    }

    /// Payload bytes for this operation, zero padded.
    pub fn payload(&self) -> [u8; 4] {
        match *self {
            Self::Ping | Self::Repeat | Self::ClearHid => [0; 4],
            Self::SetKeyboard(bits) | Self::SetMouse(bits) => [bits, 0, 0, 0],
            Self::SetConnected(connected) => [u8::from(connected), 0, 0, 0],
            Self::Key { code, pressed } => [code, u8::from(pressed), 0, 0],
            Self::MouseButtons(buttons) => {
                let [a, b] = buttons.to_payload();
                [a, b, 0, 0]
            }
            Self::MouseMove { x, y } => {
                let [x_hi, x_lo] = x.to_be_bytes();
                let [y_hi, y_lo] = y.to_be_bytes();
                [x_hi, x_lo, y_hi, y_lo]
            }
            Self::MouseRelative { dx, dy } => [dx as u8, dy as u8, 0, 0],
            Self::MouseWheel { dy } => [0, dy as u8, 0, 0],
        }
    }
}
