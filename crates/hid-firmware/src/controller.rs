//! Boot sequence and the cooperative superloop.

use std::time::Instant;

use hid_devices_input::Ps2Lines;
use hid_proto::{KeyboardOutput, MouseOutput, OutputBits};
use hid_usb::{HidInterface, KeyboardMode, MouseMode, UsbStack};
use tracing::{debug, info, warn};

use crate::aum::{Aum, AumPins};
use crate::config::{FirmwareConfig, UsbKeyboardFlavor};
use crate::dispatch::Dispatcher;
use crate::drivers::{Keyboard, KeyboardDriver, Mouse, MouseDriver};
use crate::error::ConfigError;
use crate::outputs::OutputRegistry;
use crate::storage::NonVolatileStorage;
use crate::transport::Transport;

/// Free-running microsecond counter.
pub trait Monotonic {
    fn now_us(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Monotonic for StdClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Hardware handed to the firmware at boot. Anything left `None` is absent on this board;
/// a backend selected without its hardware falls back to a dummy driver.
#[derive(Default)]
pub struct Peripherals {
    pub usb_keyboard: Option<Box<dyn HidInterface>>,
    pub usb_mouse: Option<Box<dyn HidInterface>>,
    pub ps2_keyboard: Option<Box<dyn Ps2Lines>>,
    pub ps2_mouse: Option<Box<dyn Ps2Lines>>,
    pub aum: Option<Box<dyn AumPins>>,
    pub usb_stack: Option<Box<dyn UsbStack>>,
}

/// Everything the dispatcher may read or mutate. Owned by the main loop.
pub struct ControllerState {
    pub config: FirmwareConfig,
    pub registry: OutputRegistry,
    pub keyboard: KeyboardDriver,
    pub mouse: MouseDriver,
    pub aum: Option<Aum>,
    /// Set by a backend change and only cleared by a restart.
    pub reset_required: bool,
    /// Outputs the drivers were built from.
    pub outputs: OutputBits,
}

impl ControllerState {
    pub fn new(
        config: FirmwareConfig,
        registry: OutputRegistry,
        keyboard: KeyboardDriver,
        mouse: MouseDriver,
        aum: Option<Aum>,
    ) -> Self {
        let outputs = OutputBits::new(
            keyboard.kind().keyboard_output(),
            mouse.kind().mouse_output(),
        );
        Self {
            config,
            registry,
            keyboard,
            mouse,
            aum,
            reset_required: false,
            outputs,
        }
    }
}

pub struct Controller<T, C> {
    state: ControllerState,
    dispatcher: Dispatcher,
    transport: T,
    clock: C,
    usb_stack: Option<Box<dyn UsbStack>>,
}

impl<T: Transport, C: Monotonic> Controller<T, C> {
    /// Resolves the outputs, builds and starts the drivers. Fails only on an invalid config.
    pub fn boot(
        config: FirmwareConfig,
        storage: Box<dyn NonVolatileStorage>,
        mut peripherals: Peripherals,
        transport: T,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut registry = OutputRegistry::new(storage);
        let outputs = if config.features.dynamic {
            registry.load_or_init(config.default_outputs())
        } else {
            config.default_outputs()
        };
        info!(
            keyboard = ?outputs.keyboard(),
            mouse = ?outputs.mouse(),
            "resolved outputs"
        );

        let mut keyboard = build_keyboard(&config, outputs.keyboard(), &mut peripherals);
        let mut mouse = build_mouse(&config, outputs.mouse(), &mut peripherals);
        let aum = if config.features.aum {
            match peripherals.aum.take() {
                Some(pins) => Some(Aum::new(pins)),
                None => {
                    warn!("aum enabled but no switch pins were provided");
                    None
                }
            }
        } else {
            None
        };

        keyboard.begin();
        mouse.begin();
        info!(keyboard = ?keyboard.kind(), mouse = ?mouse.kind(), "drivers started");

        let mut state = ControllerState::new(config, registry, keyboard, mouse, aum);
        state.outputs = outputs;
        Ok(Self {
            state,
            dispatcher: Dispatcher::new(),
            transport,
            clock,
            usb_stack: peripherals.usb_stack,
        })
    }

    /// One pass of the superloop. Never blocks.
    pub fn step(&mut self) {
        let now = self.clock.now_us();
        if let Some(stack) = &mut self.usb_stack {
            stack.poll();
        }
        if let Some(aum) = &mut self.state.aum {
            aum.proxy_vbus();
        }
        self.state.keyboard.periodic(now);
        self.state.mouse.periodic(now);

        if let Some(inbound) = self.transport.receive(now) {
            let response = self.dispatcher.handle(inbound, &mut self.state);
            self.transport.send(&response);
        }
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn build_keyboard(
    config: &FirmwareConfig,
    output: KeyboardOutput,
    peripherals: &mut Peripherals,
) -> KeyboardDriver {
    if !config.supports_keyboard(output) {
        warn!(?output, "stored keyboard output is not compiled in");
        return KeyboardDriver::Dummy;
    }
    match output {
        KeyboardOutput::None => {
            debug!("no keyboard output selected");
            KeyboardDriver::Dummy
        }
        KeyboardOutput::Usb => match peripherals.usb_keyboard.take() {
            Some(iface) => {
                let mode = match config.usb_keyboard {
                    UsbKeyboardFlavor::Boot => KeyboardMode::Boot,
                    UsbKeyboardFlavor::Nkro => KeyboardMode::Nkro,
                };
                KeyboardDriver::usb(iface, mode)
            }
            None => {
                warn!("usb keyboard selected but no hid interface was provided");
                KeyboardDriver::Dummy
            }
        },
        KeyboardOutput::Ps2 => match peripherals.ps2_keyboard.take() {
            Some(lines) => KeyboardDriver::ps2(lines, config.ps2_half_period_us),
            None => {
                warn!("ps/2 keyboard selected but no lines were provided");
                KeyboardDriver::Dummy
            }
        },
    }
}

fn build_mouse(
    config: &FirmwareConfig,
    output: MouseOutput,
    peripherals: &mut Peripherals,
) -> MouseDriver {
    if !config.supports_mouse(output) {
        warn!(?output, "stored mouse output is not compiled in");
        return MouseDriver::Dummy;
    }
    let mode = match output {
        MouseOutput::None => {
            debug!("no mouse output selected");
            return MouseDriver::Dummy;
        }
        MouseOutput::Ps2 => {
            return match peripherals.ps2_mouse.take() {
                Some(lines) => MouseDriver::ps2(lines, config.ps2_half_period_us),
                None => {
                    warn!("ps/2 mouse selected but no lines were provided");
                    MouseDriver::Dummy
                }
            };
        }
        MouseOutput::UsbAbsolute => MouseMode::Absolute,
        MouseOutput::UsbCompat => MouseMode::AbsoluteCompat,
        MouseOutput::UsbRelative => MouseMode::Relative,
    };
    match peripherals.usb_mouse.take() {
        Some(iface) => MouseDriver::usb(iface, mode),
        None => {
            warn!(?mode, "usb mouse selected but no hid interface was provided");
            MouseDriver::Dummy
        }
    }
}
