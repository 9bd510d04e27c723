//! Shared rig for the end-to-end tests: the firmware controller wired to a simulated USB
//! host, a simulated PS/2 host and a scripted transport, all on a manual clock.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use hid_devices_input::phy::odd_parity_bit;
use hid_devices_input::Ps2Lines;
use hid_firmware::config::FirmwareConfig;
use hid_firmware::transport::{Inbound, Transport};
use hid_firmware::{Controller, MemoryStorage, Monotonic, Peripherals};
use hid_proto::{Frame, Operation, Request, Response};
use hid_usb::HidInterface;

pub const STEP_US: u64 = 40;

#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn advance(&self, us: u64) {
        self.0.set(self.0.get() + us);
    }
}

impl Monotonic for ManualClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Default)]
pub struct Wire {
    pub inbound: VecDeque<Inbound>,
    pub sent: Vec<Frame>,
}

#[derive(Clone, Default)]
pub struct ScriptedTransport(pub Rc<RefCell<Wire>>);

impl Transport for ScriptedTransport {
    fn receive(&mut self, _now_us: u64) -> Option<Inbound> {
        self.0.borrow_mut().inbound.pop_front()
    }

    fn send(&mut self, frame: &Frame) {
        self.0.borrow_mut().sent.push(*frame);
    }
}

#[derive(Debug)]
pub struct Endpoint {
    pub ready: bool,
    pub leds: u8,
    pub reports: Vec<Vec<u8>>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            ready: true,
            leds: 0,
            reports: Vec::new(),
        }
    }
}

pub struct UsbHost(pub Rc<RefCell<Endpoint>>);

impl HidInterface for UsbHost {
    fn is_ready(&self) -> bool {
        self.0.borrow().ready
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn remote_wakeup(&mut self) {}

    fn send_report(&mut self, report: &[u8]) -> bool {
        self.0.borrow_mut().reports.push(report.to_vec());
        true
    }

    fn led_report(&self) -> u8 {
        self.0.borrow().leds
    }
}

/// Host end of a PS/2 port. Samples a bit on every falling edge of the device clock.
#[derive(Debug)]
pub struct Ps2Bus {
    pub host_clock_low: bool,
    dev_clock: bool,
    dev_data: bool,
    bits: Vec<bool>,
    pub received: Vec<u8>,
}

impl Default for Ps2Bus {
    fn default() -> Self {
        Self {
            host_clock_low: false,
            dev_clock: true,
            dev_data: true,
            bits: Vec::new(),
            received: Vec::new(),
        }
    }
}

impl Ps2Bus {
    fn sample(&mut self) {
        self.bits.push(self.dev_data);
        if self.bits.len() < 11 {
            return;
        }
        let bits = std::mem::take(&mut self.bits);
        assert!(!bits[0], "start bit must be low");
        assert!(bits[10], "stop bit must be high");
        let byte = bits[1..9]
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &b)| acc | (u8::from(b) << i));
        assert_eq!(bits[9], odd_parity_bit(byte), "bad parity for {byte:#04x}");
        self.received.push(byte);
    }
}

pub struct Ps2Port(pub Rc<RefCell<Ps2Bus>>);

impl Ps2Lines for Ps2Port {
    fn clock(&self) -> bool {
        let bus = self.0.borrow();
        bus.dev_clock && !bus.host_clock_low
    }

    fn data(&self) -> bool {
        self.0.borrow().dev_data
    }

    fn set_clock(&mut self, high: bool) {
        let mut bus = self.0.borrow_mut();
        if bus.dev_clock && !high && !bus.host_clock_low {
            bus.sample();
        }
        bus.dev_clock = high;
    }

    fn set_data(&mut self, high: bool) {
        self.0.borrow_mut().dev_data = high;
    }
}

pub struct Rig {
    pub controller: Controller<ScriptedTransport, ManualClock>,
    pub wire: Rc<RefCell<Wire>>,
    pub clock: ManualClock,
    pub usb_keyboard: Rc<RefCell<Endpoint>>,
    pub usb_mouse: Rc<RefCell<Endpoint>>,
    pub ps2_keyboard: Rc<RefCell<Ps2Bus>>,
    pub ps2_mouse: Rc<RefCell<Ps2Bus>>,
    pub storage: MemoryStorage,
}

impl Rig {
    pub fn boot(config: FirmwareConfig) -> Self {
        Self::boot_with_storage(config, MemoryStorage::new(64))
    }

    pub fn boot_with_storage(config: FirmwareConfig, storage: MemoryStorage) -> Self {
        let usb_keyboard = Rc::new(RefCell::new(Endpoint::default()));
        let usb_mouse = Rc::new(RefCell::new(Endpoint::default()));
        let ps2_keyboard = Rc::new(RefCell::new(Ps2Bus::default()));
        let ps2_mouse = Rc::new(RefCell::new(Ps2Bus::default()));
        let peripherals = Peripherals {
            usb_keyboard: Some(Box::new(UsbHost(Rc::clone(&usb_keyboard)))),
            usb_mouse: Some(Box::new(UsbHost(Rc::clone(&usb_mouse)))),
            ps2_keyboard: Some(Box::new(Ps2Port(Rc::clone(&ps2_keyboard)))),
            ps2_mouse: Some(Box::new(Ps2Port(Rc::clone(&ps2_mouse)))),
            ..Peripherals::default()
        };
        let transport = ScriptedTransport::default();
        let wire = Rc::clone(&transport.0);
        let clock = ManualClock::default();
        let controller = Controller::boot(
            config,
            Box::new(storage.clone()),
            peripherals,
            transport,
            clock.clone(),
        )
        .unwrap();
        Self {
            controller,
            wire,
            clock,
            usb_keyboard,
            usb_mouse,
            ps2_keyboard,
            ps2_mouse,
            storage,
        }
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.controller.step();
            self.clock.advance(STEP_US);
        }
    }

    /// Sends raw frame bytes and runs one loop pass; returns the response.
    pub fn exchange(&mut self, frame: Frame) -> Frame {
        let before = self.wire.borrow().sent.len();
        self.wire.borrow_mut().inbound.push_back(Inbound::Frame(frame));
        self.run(1);
        let wire = self.wire.borrow();
        assert_eq!(wire.sent.len(), before + 1, "exactly one response per request");
        wire.sent[before]
    }

    pub fn request(&mut self, operation: Operation) -> Frame {
        self.exchange(Request::new(operation).encode())
    }

    pub fn decode(frame: &Frame) -> Response {
        Response::decode(frame).unwrap()
    }
}
