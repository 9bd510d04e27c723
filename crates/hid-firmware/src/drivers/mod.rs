//! Uniform keyboard and mouse interface over every backend.
//!
//! The concrete driver is picked once at boot from the persisted outputs and
//! never swapped at runtime; a backend change only takes effect after a reset.

mod keyboard;
mod mouse;

use hid_proto::{KeyboardOutput, MouseButtons, MouseOutput};

pub use keyboard::KeyboardDriver;
pub use mouse::{apply_buttons, MouseDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Dummy,
    UsbBootKeyboard,
    UsbFullKeyboard,
    UsbMouseAbsolute,
    UsbMouseAbsoluteCompat,
    UsbMouseRelative,
    Ps2Keyboard,
    Ps2Mouse,
}

impl DriverKind {
    /// Selector reported in the outputs byte for a keyboard of this kind.
    pub fn keyboard_output(self) -> KeyboardOutput {
        match self {
            Self::UsbBootKeyboard | Self::UsbFullKeyboard => KeyboardOutput::Usb,
            Self::Ps2Keyboard => KeyboardOutput::Ps2,
            _ => KeyboardOutput::None,
        }
    }

    pub fn mouse_output(self) -> MouseOutput {
        match self {
            Self::UsbMouseAbsolute => MouseOutput::UsbAbsolute,
            Self::UsbMouseAbsoluteCompat => MouseOutput::UsbCompat,
            Self::UsbMouseRelative => MouseOutput::UsbRelative,
            Self::Ps2Mouse => MouseOutput::Ps2,
            _ => MouseOutput::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardLeds {
    pub caps: bool,
    pub num: bool,
    pub scroll: bool,
}

/// Key codes are HID usage IDs.
pub trait Keyboard {
    fn begin(&mut self);
    /// Releases every held key.
    fn clear(&mut self);
    fn send_key(&mut self, code: u8, pressed: bool);
    fn periodic(&mut self, now_us: u64);
    fn is_offline(&self) -> bool;
    fn leds(&self) -> KeyboardLeds;
    fn kind(&self) -> DriverKind;
}

/// Operations a backend cannot express are silently ignored.
pub trait Mouse {
    fn begin(&mut self);
    fn clear(&mut self);
    fn send_buttons(&mut self, buttons: MouseButtons);
    fn send_move(&mut self, x: i16, y: i16);
    fn send_relative(&mut self, dx: i8, dy: i8);
    fn send_wheel(&mut self, delta: i8);
    fn periodic(&mut self, now_us: u64);
    fn is_offline(&self) -> bool;
    fn kind(&self) -> DriverKind;
}
