//! USB HID keyboard and mouse report models.
//!
//! Enumeration and endpoint handling belong to the device's USB stack; this
//! crate only builds the interrupt-IN reports, tracks link state and exposes
//! the report descriptors the stack has to serve.

#![forbid(unsafe_code)]

pub mod descriptors;

mod keyboard;
mod link;
mod mouse;

pub use keyboard::{KeyboardMode, UsbHidKeyboard, LED_CAPS_LOCK, LED_NUM_LOCK, LED_SCROLL_LOCK};
pub use link::{LinkMonitor, OFFLINE_AFTER_US, SAMPLE_INTERVAL_US};
pub use mouse::{
    MouseMode, UsbHidMouse, BUTTON_EXTRA_DOWN, BUTTON_EXTRA_UP, BUTTON_LEFT, BUTTON_MIDDLE,
    BUTTON_RIGHT,
};

/// One HID interface of the external USB stack.
pub trait HidInterface {
    /// Configured and able to accept an interrupt-IN report.
    fn is_ready(&self) -> bool;
    fn is_suspended(&self) -> bool;
    fn remote_wakeup(&mut self);
    /// Hands a report to the endpoint. `false` when the endpoint is still busy.
    fn send_report(&mut self, report: &[u8]) -> bool;
    /// Last output report received from the host (keyboard LEDs).
    fn led_report(&self) -> u8 {
        0
    }
}

impl<T: HidInterface + ?Sized> HidInterface for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn is_suspended(&self) -> bool {
        (**self).is_suspended()
    }

    fn remote_wakeup(&mut self) {
        (**self).remote_wakeup()
    }

    fn send_report(&mut self, report: &[u8]) -> bool {
        (**self).send_report(report)
    }

    fn led_report(&self) -> u8 {
        (**self).led_report()
    }
}

/// Device stack task, serviced once per main-loop iteration.
pub trait UsbStack {
    fn poll(&mut self);
}
