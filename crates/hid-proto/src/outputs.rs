use bitflags::bitflags;

bitflags! {
    /// Status byte of an `OK` response.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PongFlags: u8 {
        const CAPS = 1 << 0;
        const SCROLL = 1 << 1;
        const NUM = 1 << 2;
        const KEYBOARD_OFFLINE = 1 << 3;
        const MOUSE_OFFLINE = 1 << 4;
        const RESET_REQUIRED = 1 << 6;
        const OK = 1 << 7;
    }
}

bitflags! {
    /// Static capability byte (byte 3) of an `OK` response.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const HAS_USB = 1 << 0;
        const HAS_PS2 = 1 << 1;
        const HAS_USB_COMPAT = 1 << 2;
        const CONNECTED = 1 << 6;
        const CONNECTABLE = 1 << 7;
    }
}

/// Keyboard backend selector, stored in the low three bits of the outputs byte.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum KeyboardOutput {
    #[default]
    None = 0b0000_0000,
    Usb = 0b0000_0001,
    Ps2 = 0b0000_0011,
}

impl KeyboardOutput {
    pub const MASK: u8 = 0b0000_0111;

    /// Decodes the keyboard field of an outputs byte. Unassigned encodings select no backend.
    pub fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            x if x == Self::Usb as u8 => Self::Usb,
            x if x == Self::Ps2 as u8 => Self::Ps2,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Mouse backend selector, stored in bits 3..6 of the outputs byte.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MouseOutput {
    #[default]
    None = 0b0000_0000,
    UsbAbsolute = 0b0000_1000,
    UsbRelative = 0b0001_0000,
    Ps2 = 0b0001_1000,
    /// Absolute pointer with the alternate report descriptor some legacy hosts need.
    UsbCompat = 0b0010_0000,
}

impl MouseOutput {
    pub const MASK: u8 = 0b0011_1000;

    pub fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            x if x == Self::UsbAbsolute as u8 => Self::UsbAbsolute,
            x if x == Self::UsbRelative as u8 => Self::UsbRelative,
            x if x == Self::Ps2 as u8 => Self::Ps2,
            x if x == Self::UsbCompat as u8 => Self::UsbCompat,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The combined outputs byte: byte 2 of an `OK` response and the payload of the persisted
/// output record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct OutputBits(pub u8);

impl OutputBits {
    /// Set in responses when the firmware accepts `SET_KEYBOARD` / `SET_MOUSE`.
    pub const DYNAMIC: u8 = 0b1000_0000;

    pub fn new(keyboard: KeyboardOutput, mouse: MouseOutput) -> Self {
        Self(keyboard.bits() | mouse.bits())
    }

    pub fn keyboard(self) -> KeyboardOutput {
        KeyboardOutput::from_bits(self.0)
    }

    pub fn mouse(self) -> MouseOutput {
        MouseOutput::from_bits(self.0)
    }

    pub fn is_dynamic(self) -> bool {
        self.0 & Self::DYNAMIC != 0
    }
}
