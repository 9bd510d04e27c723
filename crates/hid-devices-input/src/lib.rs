//! PS/2 keyboard and mouse emulation for the device side of the link.
//!
//! The crate is split the same way the signal path is: [`phy`] clocks bytes
//! over the two open-drain lines, [`queue`] carries bytes from the logical
//! devices to the phy, and [`Ps2Keyboard`] / [`Ps2Mouse`] implement the
//! host-command state machines and report encoding on top.

#![forbid(unsafe_code)]

pub mod phy;
pub mod queue;
pub mod scancode;

mod ps2_keyboard;
mod ps2_mouse;

pub use phy::{Ps2Lines, Ps2Phy, RxStage};
pub use ps2_keyboard::{Ps2Keyboard, LED_CAPS_LOCK, LED_NUM_LOCK, LED_SCROLL_LOCK};
pub use ps2_mouse::{
    Ps2Mouse, BUTTON_EXTRA_DOWN, BUTTON_EXTRA_UP, BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT,
};
pub use queue::{ByteQueue, PushError};

/// Per-channel transmit queue between a logical device and its phy.
pub type Ps2TxQueue = ByteQueue<64>;

pub(crate) const ACK: u8 = 0xFA;
pub(crate) const SELF_TEST_PASSED: u8 = 0xAA;

/// Time the host may hold the clock line low before the device is reported offline.
pub(crate) const OFFLINE_INHIBIT_US: u64 = 50_000;
