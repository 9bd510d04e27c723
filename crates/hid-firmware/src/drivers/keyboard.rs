use hid_devices_input::{Ps2Keyboard, Ps2Lines};
use hid_usb::{HidInterface, KeyboardMode, UsbHidKeyboard};

use super::{DriverKind, Keyboard, KeyboardLeds};

pub enum KeyboardDriver {
    Dummy,
    Usb(UsbHidKeyboard<Box<dyn HidInterface>>),
    Ps2 {
        device: Ps2Keyboard<Box<dyn Ps2Lines>>,
        /// Time of the last `periodic` call, for the inhibit check.
        now_us: u64,
    },
}

impl KeyboardDriver {
    pub fn usb(iface: Box<dyn HidInterface>, mode: KeyboardMode) -> Self {
        Self::Usb(UsbHidKeyboard::new(iface, mode))
    }

    pub fn ps2(lines: Box<dyn Ps2Lines>, half_period_us: u64) -> Self {
        Self::Ps2 {
            device: Ps2Keyboard::with_half_period(lines, half_period_us),
            now_us: 0,
        }
    }

    /// Non-modifier usages currently held by a USB keyboard.
    pub fn pressed_keys(&self) -> &[u8] {
        match self {
            Self::Usb(kbd) => kbd.pressed_keys(),
            Self::Dummy | Self::Ps2 { .. } => &[],
        }
    }
}

impl Keyboard for KeyboardDriver {
    fn begin(&mut self) {
        match self {
            Self::Dummy => {}
            Self::Usb(kbd) => kbd.begin(),
            Self::Ps2 { device, .. } => device.begin(),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Dummy => {}
            Self::Usb(kbd) => kbd.clear(),
            Self::Ps2 { device, .. } => device.clear(),
        }
    }

    fn send_key(&mut self, code: u8, pressed: bool) {
        match self {
            Self::Dummy => {}
            Self::Usb(kbd) => kbd.key_event(code, pressed),
            Self::Ps2 { device, .. } => device.send_key(code, pressed),
        }
    }

    fn periodic(&mut self, now: u64) {
        match self {
            Self::Dummy => {}
            Self::Usb(kbd) => kbd.periodic(now),
            Self::Ps2 { device, now_us } => {
                *now_us = now;
                device.task(now);
            }
        }
    }

    fn is_offline(&self) -> bool {
        match self {
            Self::Dummy => false,
            Self::Usb(kbd) => kbd.is_offline(),
            Self::Ps2 { device, now_us } => !device.is_online(*now_us),
        }
    }

    fn leds(&self) -> KeyboardLeds {
        match self {
            Self::Dummy => KeyboardLeds::default(),
            Self::Usb(kbd) => {
                let leds = kbd.leds();
                KeyboardLeds {
                    caps: leds & hid_usb::LED_CAPS_LOCK != 0,
                    num: leds & hid_usb::LED_NUM_LOCK != 0,
                    scroll: leds & hid_usb::LED_SCROLL_LOCK != 0,
                }
            }
            Self::Ps2 { device, .. } => {
                let leds = device.leds();
                KeyboardLeds {
                    caps: leds & hid_devices_input::LED_CAPS_LOCK != 0,
                    num: leds & hid_devices_input::LED_NUM_LOCK != 0,
                    scroll: leds & hid_devices_input::LED_SCROLL_LOCK != 0,
                }
            }
        }
    }

    fn kind(&self) -> DriverKind {
        match self {
            Self::Dummy => DriverKind::Dummy,
            Self::Usb(kbd) => match kbd.mode() {
                KeyboardMode::Boot => DriverKind::UsbBootKeyboard,
                KeyboardMode::Nkro => DriverKind::UsbFullKeyboard,
            },
            Self::Ps2 { .. } => DriverKind::Ps2Keyboard,
        }
    }
}
