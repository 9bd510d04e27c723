//! Firmware core of the HID bridge: turns 8-byte request frames from the KVM
//! host into keyboard and mouse activity on the target machine.
//!
//! The crate is hardware-agnostic. Pins, the USB device stack, the UART/SPI
//! peripheral and non-volatile memory are reached through the traits in
//! [`storage`], [`transport`], [`aum`], [`hid_usb::HidInterface`] and
//! [`hid_devices_input::Ps2Lines`], so the same superloop runs on a
//! microcontroller and in the native simulator.

#![forbid(unsafe_code)]

pub mod aum;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod outputs;
pub mod storage;
pub mod transport;

pub use config::FirmwareConfig;
pub use controller::{Controller, ControllerState, Monotonic, Peripherals, StdClock};
pub use dispatch::{DispatchState, Dispatcher, Inbound};
pub use error::{ConfigError, StorageError};
pub use outputs::OutputRegistry;
pub use storage::{FileStorage, MemoryStorage, NonVolatileStorage, NullStorage};
