//! Drives the PS/2 devices through their phy against a simulated host on the two lines.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use hid_devices_input::phy::{odd_parity_bit, DEFAULT_HALF_PERIOD_US};
use hid_devices_input::{Ps2Keyboard, Ps2Lines, Ps2Mouse, LED_CAPS_LOCK};

#[derive(Debug)]
struct HostState {
    host_clock_low: bool,
    host_data_low: bool,
    dev_clock: bool,
    dev_data: bool,
    rx_bits: Vec<bool>,
    received: Vec<u8>,
    tx_bits: VecDeque<bool>,
    sending: bool,
    acks: usize,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            host_clock_low: false,
            host_data_low: false,
            dev_clock: true,
            dev_data: true,
            rx_bits: Vec::new(),
            received: Vec::new(),
            tx_bits: VecDeque::new(),
            sending: false,
            acks: 0,
        }
    }
}

impl HostState {
    fn data_level(&self) -> bool {
        self.dev_data && !self.host_data_low
    }

    fn on_device_clock_falling(&mut self) {
        if self.sending {
            match self.tx_bits.pop_front() {
                Some(bit) => self.host_data_low = !bit,
                None => {
                    if !self.dev_data {
                        self.acks += 1;
                    }
                    self.sending = false;
                }
            }
            return;
        }

        self.rx_bits.push(self.data_level());
        if self.rx_bits.len() == 11 {
            let bits = std::mem::take(&mut self.rx_bits);
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
}

#[derive(Debug)]
struct DeviceSide(Rc<RefCell<HostState>>);

impl Ps2Lines for DeviceSide {
    fn clock(&self) -> bool {
        let s = self.0.borrow();
        s.dev_clock && !s.host_clock_low
    }

    fn data(&self) -> bool {
        self.0.borrow().data_level()
    }

    fn set_clock(&mut self, high: bool) {
        let mut s = self.0.borrow_mut();
        if s.dev_clock && !high && !s.host_clock_low {
            s.on_device_clock_falling();
        }
        s.dev_clock = high;
    }

    fn set_data(&mut self, high: bool) {
        self.0.borrow_mut().dev_data = high;
    }
}

struct SimHost {
    state: Rc<RefCell<HostState>>,
}

impl SimHost {
    fn new() -> (Self, DeviceSide) {
        let state = Rc::new(RefCell::new(HostState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            DeviceSide(state),
        )
    }

    /// Request-to-send followed by the frame bits, clocked in by the device.
    fn send(&self, byte: u8, parity: bool) {
        let mut s = self.state.borrow_mut();
        s.tx_bits = (0..8).map(|i| (byte >> i) & 1 != 0).collect();
        s.tx_bits.push_back(parity);
        s.tx_bits.push_back(true);
        s.sending = true;
        s.host_data_low = true;
        s.host_clock_low = false;
    }

    fn take_received(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().received)
    }

    fn acks(&self) -> usize {
        self.state.borrow().acks
    }

    fn inhibit(&self, low: bool) {
        self.state.borrow_mut().host_clock_low = low;
    }
}

fn run_keyboard(kbd: &mut Ps2Keyboard<DeviceSide>, t: &mut u64, steps: usize) {
    for _ in 0..steps {
        kbd.task(*t);
        *t += DEFAULT_HALF_PERIOD_US;
    }
}

fn run_mouse(mouse: &mut Ps2Mouse<DeviceSide>, t: &mut u64, steps: usize) {
    for _ in 0..steps {
        mouse.task(*t);
        *t += DEFAULT_HALF_PERIOD_US;
    }
}

#[test]
fn key_events_reach_the_host() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    kbd.send_key(0x50, true);
    kbd.send_key(0x50, false);
    run_keyboard(&mut kbd, &mut t, 200);
    assert_eq!(host.take_received(), vec![0xE0, 0x6B, 0xE0, 0xF0, 0x6B]);
}

#[test]
fn reset_command_is_acked_over_the_wire() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    host.send(0xFF, odd_parity_bit(0xFF));
    run_keyboard(&mut kbd, &mut t, 100);
    assert_eq!(host.acks(), 1);
    assert_eq!(host.take_received(), vec![0xFA, 0xAA]);
}

#[test]
fn led_command_with_parameter() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    host.send(0xED, odd_parity_bit(0xED));
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xFA]);

    host.send(LED_CAPS_LOCK, odd_parity_bit(LED_CAPS_LOCK));
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xFA]);
    assert_eq!(kbd.leds(), LED_CAPS_LOCK);
}

#[test]
fn parity_error_requests_resend() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    host.send(0xF2, !odd_parity_bit(0xF2));
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xFE]);
}

#[test]
fn host_resend_repeats_last_byte() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    kbd.begin();
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xAA]);

    host.send(0xFE, odd_parity_bit(0xFE));
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xAA]);
}

#[test]
fn inhibited_bus_holds_output_and_reports_offline() {
    let (host, lines) = SimHost::new();
    let mut kbd = Ps2Keyboard::new(lines);
    let mut t = 0;

    host.inhibit(true);
    kbd.send_key(0x04, true);
    run_keyboard(&mut kbd, &mut t, 2_000);
    assert!(host.take_received().is_empty());
    assert!(!kbd.is_online(t));

    host.inhibit(false);
    run_keyboard(&mut kbd, &mut t, 60);
    assert_eq!(host.take_received(), vec![0x1C]);
    assert!(kbd.is_online(t));
}

#[test]
fn mouse_enable_and_move() {
    let (host, lines) = SimHost::new();
    let mut mouse = Ps2Mouse::new(lines);
    let mut t = 0;

    host.send(0xF4, odd_parity_bit(0xF4));
    run_mouse(&mut mouse, &mut t, 60);
    assert_eq!(host.take_received(), vec![0xFA]);
    assert!(mouse.is_streaming());

    mouse.send_relative(3, -4);
    run_mouse(&mut mouse, &mut t, 120);
    assert_eq!(host.take_received(), vec![0x08, 0x03, 0x04]);
}
