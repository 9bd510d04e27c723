use tracing::{debug, warn};

use crate::phy::{Ps2Lines, Ps2Phy, DEFAULT_HALF_PERIOD_US};
use crate::{Ps2TxQueue, ACK, OFFLINE_INHIBIT_US, SELF_TEST_PASSED};

pub const BUTTON_LEFT: u8 = 1 << 0;
pub const BUTTON_RIGHT: u8 = 1 << 1;
pub const BUTTON_MIDDLE: u8 = 1 << 2;
pub const BUTTON_EXTRA_UP: u8 = 1 << 3;
pub const BUTTON_EXTRA_DOWN: u8 = 1 << 4;

const ID_STANDARD: u8 = 0x00;
const ID_WHEEL: u8 = 0x03;
const ID_FIVE_BUTTON: u8 = 0x04;

const DEFAULT_SAMPLE_RATE: u8 = 100;
const DEFAULT_RESOLUTION: u8 = 2;

#[derive(Debug, Clone, Copy)]
enum ExpectingData {
    SampleRate,
    Resolution,
}

/// PS/2 mouse device in stream mode, with IntelliMouse wheel and five-button extensions.
#[derive(Debug)]
pub struct Ps2Mouse<L> {
    phy: Ps2Phy<L>,
    out: Ps2TxQueue,
    device_id: u8,
    streaming: bool,
    sample_rate: u8,
    resolution: u8,
    scaling_2to1: bool,
    /// Last three sample rates, newest last, for extension detection.
    rate_history: [u8; 3],
    buttons: u8,
    expecting_data: Option<ExpectingData>,
}

impl<L: Ps2Lines> Ps2Mouse<L> {
    pub fn new(lines: L) -> Self {
        Self::with_half_period(lines, DEFAULT_HALF_PERIOD_US)
    }

    pub fn with_half_period(lines: L, half_period_us: u64) -> Self {
        Self {
            phy: Ps2Phy::with_half_period(lines, half_period_us),
            out: Ps2TxQueue::new(),
            device_id: ID_STANDARD,
            streaming: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
            resolution: DEFAULT_RESOLUTION,
            scaling_2to1: false,
            rate_history: [0; 3],
            buttons: 0,
            expecting_data: None,
        }
    }

    /// Power-on: self test passed, standard mouse id, reporting disabled until `F4`.
    pub fn begin(&mut self) {
        self.reset();
        self.out.clear();
        self.phy.discard_pending();
        self.push(SELF_TEST_PASSED);
        self.push(self.device_id);
    }

    pub fn phy(&self) -> &Ps2Phy<L> {
        &self.phy
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    pub fn is_online(&self, now_us: u64) -> bool {
        self.streaming && !self.phy.host_inhibited_for(now_us, OFFLINE_INHIBIT_US)
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    pub fn pop_output(&mut self) -> Option<u8> {
        self.out.pop()
    }

    fn push(&mut self, byte: u8) {
        if self.out.push(byte).is_err() {
            warn!(byte, "ps/2 mouse queue full, dropping byte");
        }
    }

    fn set_defaults(&mut self) {
        self.sample_rate = DEFAULT_SAMPLE_RATE;
        self.resolution = DEFAULT_RESOLUTION;
        self.scaling_2to1 = false;
        self.streaming = false;
        self.expecting_data = None;
    }

    fn reset(&mut self) {
        self.set_defaults();
        self.device_id = ID_STANDARD;
        self.rate_history = [0; 3];
        self.buttons = 0;
    }

    /// Replaces the whole button state and reports it.
    pub fn set_buttons(&mut self, buttons: u8) {
        self.buttons = buttons & 0x1F;
        self.send_packet(0, 0, 0);
    }

    pub fn send_relative(&mut self, dx: i8, dy: i8) {
        self.send_packet(i16::from(dx), i16::from(dy), 0);
    }

    pub fn send_wheel(&mut self, delta: i8) {
        self.send_packet(0, 0, delta);
    }

    /// Releases all buttons.
    pub fn clear(&mut self) {
        if self.buttons != 0 {
            self.set_buttons(0);
        }
    }

    /// Movement uses HID orientation (positive `dy` is down); PS/2 reports up as positive.
    fn send_packet(&mut self, dx: i16, dy: i16, wheel: i8) {
        if !self.streaming {
            return;
        }
        let y = -dy;
        let mut status = 0x08 | (self.buttons & 0x07);
        if dx < 0 {
            status |= 0x10;
        }
        if y < 0 {
            status |= 0x20;
        }
        let mut packet = [status, dx as u8, y as u8, 0];
        let len = match self.device_id {
            ID_WHEEL => {
                packet[3] = (-i16::from(wheel)).clamp(-128, 127) as u8;
                4
            }
            ID_FIVE_BUTTON => {
                let z = ((-i16::from(wheel)).clamp(-8, 7) as u8) & 0x0F;
                packet[3] = z | ((self.buttons << 1) & 0x30);
                4
            }
            _ => 3,
        };
        if self.out.free() < len {
            warn!(len, "ps/2 mouse queue full, dropping packet");
            return;
        }
        for &byte in &packet[..len] {
            self.push(byte);
        }
    }

    pub fn task(&mut self, now_us: u64) {
        if let Some(byte) = self.phy.poll(now_us, &self.out) {
            self.receive_byte(byte);
        }
    }

    /// Receives a byte from the host. Anything still queued for the host is dropped first.
    pub fn receive_byte(&mut self, byte: u8) {
        self.out.clear();
        self.phy.discard_pending();
        debug!(byte, "ps/2 mouse host byte");

        if let Some(expecting) = self.expecting_data.take() {
            self.handle_data_byte(expecting, byte);
            return;
        }

        match byte {
            0xFF => {
                self.reset();
                self.push(ACK);
                self.push(SELF_TEST_PASSED);
                self.push(self.device_id);
            }
            0xF6 => {
                self.set_defaults();
                self.push(ACK);
            }
            0xF5 | 0xEA => {
                self.streaming = false;
                self.push(ACK);
            }
            0xF4 => {
                self.streaming = true;
                self.push(ACK);
            }
            0xF3 => {
                self.push(ACK);
                self.expecting_data = Some(ExpectingData::SampleRate);
            }
            0xF2 => {
                self.push(ACK);
                self.push(self.device_id);
            }
            0xE9 => {
                // Status request.
                let mut status = 0;
                if self.buttons & BUTTON_LEFT != 0 {
                    status |= 0x04;
                }
                if self.buttons & BUTTON_MIDDLE != 0 {
                    status |= 0x02;
                }
                if self.buttons & BUTTON_RIGHT != 0 {
                    status |= 0x01;
                }
                if self.scaling_2to1 {
                    status |= 0x10;
                }
                if self.streaming {
                    status |= 0x20;
                }
                self.push(ACK);
                self.push(status);
                self.push(self.resolution);
                self.push(self.sample_rate);
            }
            0xE8 => {
                self.push(ACK);
                self.expecting_data = Some(ExpectingData::Resolution);
            }
            0xE7 => {
                self.scaling_2to1 = true;
                self.push(ACK);
            }
            0xE6 => {
                self.scaling_2to1 = false;
                self.push(ACK);
            }
            0xFE => {
                // Resend is answered by the phy.
            }
            _ => self.push(ACK),
        }
    }

    fn handle_data_byte(&mut self, expecting: ExpectingData, byte: u8) {
        match expecting {
            ExpectingData::SampleRate => {
                self.sample_rate = byte;
                self.rate_history = [self.rate_history[1], self.rate_history[2], byte];
                match self.rate_history {
                    [200, 100, 80] if self.device_id == ID_STANDARD => {
                        self.device_id = ID_WHEEL
                    }
                    [200, 200, 80] if self.device_id == ID_WHEEL => {
                        self.device_id = ID_FIVE_BUTTON
                    }
                    _ => {}
                }
                self.push(ACK);
            }
            ExpectingData::Resolution => {
                self.resolution = byte & 0x03;
                self.push(ACK);
            }
        }
    }
}
