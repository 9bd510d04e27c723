//! USB power and data switch between the bridge's USB port and the target.

use tracing::info;

/// Pins of the switch board.
pub trait AumPins {
    /// The target powers its USB port.
    fn target_usb_powered(&self) -> bool;
    /// Current level of the VBUS line presented to our USB controller.
    fn vbus(&self) -> bool;
    fn set_vbus(&mut self, on: bool);
    fn usb_connected(&self) -> bool;
    fn set_usb_connected(&mut self, connected: bool);
}

pub struct Aum {
    pins: Box<dyn AumPins>,
}

impl Aum {
    /// Takes over the pins and connects the data lines.
    pub fn new(mut pins: Box<dyn AumPins>) -> Self {
        pins.set_usb_connected(true);
        Self { pins }
    }

    /// Mirrors the target's USB power onto our VBUS so the USB stack sees plug events.
    pub fn proxy_vbus(&mut self) {
        let powered = self.pins.target_usb_powered();
        if self.pins.vbus() != powered {
            info!(powered, "target usb power changed");
            self.pins.set_vbus(powered);
        }
    }

    pub fn set_usb_connected(&mut self, connected: bool) {
        info!(connected, "switching usb data lines");
        self.pins.set_usb_connected(connected);
    }

    pub fn is_usb_connected(&self) -> bool {
        self.pins.usb_connected()
    }
}
