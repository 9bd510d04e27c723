use hid_devices_input::{Ps2Lines, Ps2Mouse};
use hid_proto::MouseButtons;
use hid_usb::{
    HidInterface, MouseMode, UsbHidMouse, BUTTON_EXTRA_DOWN, BUTTON_EXTRA_UP, BUTTON_LEFT,
    BUTTON_MIDDLE, BUTTON_RIGHT,
};

use super::{DriverKind, Mouse};

/// Applies the selected button changes to a button mask. Both USB and PS/2 use this layout.
pub fn apply_buttons(mut mask: u8, buttons: MouseButtons) -> u8 {
    let changes = [
        (buttons.left, BUTTON_LEFT),
        (buttons.right, BUTTON_RIGHT),
        (buttons.middle, BUTTON_MIDDLE),
        (buttons.extra_up, BUTTON_EXTRA_UP),
        (buttons.extra_down, BUTTON_EXTRA_DOWN),
    ];
    for (change, bit) in changes {
        match change {
            Some(true) => mask |= bit,
            Some(false) => mask &= !bit,
            None => {}
        }
    }
    mask
}

pub enum MouseDriver {
    Dummy,
    Usb(UsbHidMouse<Box<dyn HidInterface>>),
    Ps2 {
        device: Ps2Mouse<Box<dyn Ps2Lines>>,
        now_us: u64,
    },
}

impl MouseDriver {
    pub fn usb(iface: Box<dyn HidInterface>, mode: MouseMode) -> Self {
        Self::Usb(UsbHidMouse::new(iface, mode))
    }

    pub fn ps2(lines: Box<dyn Ps2Lines>, half_period_us: u64) -> Self {
        Self::Ps2 {
            device: Ps2Mouse::with_half_period(lines, half_period_us),
            now_us: 0,
        }
    }
}

impl Mouse for MouseDriver {
    fn begin(&mut self) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => mouse.begin(),
            Self::Ps2 { device, .. } => device.begin(),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => mouse.clear(),
            Self::Ps2 { device, .. } => device.clear(),
        }
    }

    fn send_buttons(&mut self, buttons: MouseButtons) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => {
                let mask = apply_buttons(mouse.buttons(), buttons);
                mouse.send_buttons(mask);
            }
            Self::Ps2 { device, .. } => {
                let mask = apply_buttons(device.buttons(), buttons);
                device.set_buttons(mask);
            }
        }
    }

    fn send_move(&mut self, x: i16, y: i16) {
        if let Self::Usb(mouse) = self {
            mouse.send_move(x, y);
        }
    }

    fn send_relative(&mut self, dx: i8, dy: i8) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => mouse.send_relative(dx, dy),
            Self::Ps2 { device, .. } => device.send_relative(dx, dy),
        }
    }

    fn send_wheel(&mut self, delta: i8) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => mouse.send_wheel(delta),
            Self::Ps2 { device, .. } => device.send_wheel(delta),
        }
    }

    fn periodic(&mut self, now: u64) {
        match self {
            Self::Dummy => {}
            Self::Usb(mouse) => mouse.periodic(now),
            Self::Ps2 { device, now_us } => {
                *now_us = now;
                device.task(now);
            }
        }
    }

    fn is_offline(&self) -> bool {
        match self {
            Self::Dummy => false,
            Self::Usb(mouse) => mouse.is_offline(),
            Self::Ps2 { device, now_us } => !device.is_online(*now_us),
        }
    }

    fn kind(&self) -> DriverKind {
        match self {
            Self::Dummy => DriverKind::Dummy,
            Self::Usb(mouse) => match mouse.mode() {
                MouseMode::Absolute => DriverKind::UsbMouseAbsolute,
                MouseMode::AbsoluteCompat => DriverKind::UsbMouseAbsoluteCompat,
                MouseMode::Relative => DriverKind::UsbMouseRelative,
            },
            Self::Ps2 { .. } => DriverKind::Ps2Mouse,
        }
    }
}
