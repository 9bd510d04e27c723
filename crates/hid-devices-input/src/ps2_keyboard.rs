use tracing::{debug, trace, warn};

use crate::phy::{Ps2Lines, Ps2Phy, DEFAULT_HALF_PERIOD_US};
use crate::scancode::{special_sequence, translate, USAGE_LEFT_CTRL, USAGE_RIGHT_CTRL};
use crate::{Ps2TxQueue, ACK, OFFLINE_INHIBIT_US, SELF_TEST_PASSED};

/// LED bits of the `ED` parameter byte.
pub const LED_SCROLL_LOCK: u8 = 1 << 0;
pub const LED_NUM_LOCK: u8 = 1 << 1;
pub const LED_CAPS_LOCK: u8 = 1 << 2;

/// Delay index 1 (500 ms), rate index 11 (10.9 cps).
const DEFAULT_TYPEMATIC: u8 = 0x2B;

/// Repeat period for each of the 32 rate values of the `F3` parameter.
#[rustfmt::skip]
const TYPEMATIC_REPEAT_US: [u64; 32] = [
    33_333, 37_453, 41_667, 45_872, 48_309, 54_054, 58_480, 62_500,
    66_667, 75_188, 83_333, 91_743, 100_000, 108_696, 116_279, 125_000,
    133_333, 149_254, 166_667, 181_818, 200_000, 217_391, 232_558, 250_000,
    270_270, 303_030, 333_333, 370_370, 400_000, 434_783, 476_190, 500_000,
];

const TYPEMATIC_DELAY_US: [u64; 4] = [250_000, 500_000, 750_000, 1_000_000];

#[derive(Debug, Clone, Copy)]
enum ExpectingData {
    LedState,
    Typematic,
    ScancodeSet,
}

#[derive(Debug, Clone, Copy)]
struct Repeat {
    usage: u8,
    /// Armed on the first `task` call after the press.
    due_us: Option<u64>,
}

/// PS/2 keyboard device: host command handling, Set-2 key reports and typematic repeat,
/// clocked out through its own [`Ps2Phy`].
#[derive(Debug)]
pub struct Ps2Keyboard<L> {
    phy: Ps2Phy<L>,
    out: Ps2TxQueue,
    scancode_set: u8,
    leds: u8,
    typematic: u8,
    scanning_enabled: bool,
    expecting_data: Option<ExpectingData>,
    held: [u32; 8],
    repeat: Option<Repeat>,
}

impl<L: Ps2Lines> Ps2Keyboard<L> {
    pub fn new(lines: L) -> Self {
        Self::with_half_period(lines, DEFAULT_HALF_PERIOD_US)
    }

    pub fn with_half_period(lines: L, half_period_us: u64) -> Self {
        Self {
            phy: Ps2Phy::with_half_period(lines, half_period_us),
            out: Ps2TxQueue::new(),
            scancode_set: 2,
            leds: 0,
            typematic: DEFAULT_TYPEMATIC,
            scanning_enabled: true,
            expecting_data: None,
            held: [0; 8],
            repeat: None,
        }
    }

    /// Power-on: restores defaults and announces a passed self test.
    pub fn begin(&mut self) {
        self.set_defaults();
        self.scanning_enabled = true;
        self.held = [0; 8];
        self.repeat = None;
        self.out.clear();
        self.phy.discard_pending();
        self.push(SELF_TEST_PASSED);
    }

    pub fn phy(&self) -> &Ps2Phy<L> {
        &self.phy
    }

    pub fn scancode_set(&self) -> u8 {
        self.scancode_set
    }

    /// Raw LED byte as last set by the host (see the `LED_*` constants).
    pub fn leds(&self) -> u8 {
        self.leds
    }

    pub fn typematic(&self) -> u8 {
        self.typematic
    }

    pub fn scanning_enabled(&self) -> bool {
        self.scanning_enabled
    }

    pub fn is_online(&self, now_us: u64) -> bool {
        self.scanning_enabled && !self.phy.host_inhibited_for(now_us, OFFLINE_INHIBIT_US)
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    /// Takes a byte straight from the transmit queue, bypassing the phy.
    pub fn pop_output(&mut self) -> Option<u8> {
        self.out.pop()
    }

    pub fn is_held(&self, usage: u8) -> bool {
        self.held[usize::from(usage / 32)] & (1 << (usage % 32)) != 0
    }

    fn set_held(&mut self, usage: u8, held: bool) {
        let word = &mut self.held[usize::from(usage / 32)];
        if held {
            *word |= 1 << (usage % 32);
        } else {
            *word &= !(1 << (usage % 32));
        }
    }

    fn push(&mut self, byte: u8) {
        if self.out.push(byte).is_err() {
            warn!(byte, "ps/2 keyboard queue full, dropping byte");
        }
    }

    /// Queues the whole make/break sequence or nothing; a partial one would desync the host.
    fn push_sequence(&mut self, usage: u8, pressed: bool) -> bool {
        let ctrl_held = self.is_held(USAGE_LEFT_CTRL) || self.is_held(USAGE_RIGHT_CTRL);
        let Some(seq) = translate(usage, pressed, ctrl_held) else {
            trace!(usage, "no set-2 code for usage");
            return false;
        };
        let bytes = seq.as_slice();
        if self.out.free() < bytes.len() {
            warn!(usage, pressed, "ps/2 keyboard queue full, dropping key event");
            return false;
        }
        for &byte in bytes {
            self.push(byte);
        }
        true
    }

    pub fn send_key(&mut self, usage: u8, pressed: bool) {
        if !self.scanning_enabled {
            return;
        }
        if self.scancode_set != 2 {
            // Only Set-2 is generated; other sets are accepted so the host can query them.
            return;
        }
        if !self.push_sequence(usage, pressed) {
            return;
        }
        self.set_held(usage, pressed);

        if pressed {
            self.repeat = special_sequence(usage).is_none().then_some(Repeat {
                usage,
                due_us: None,
            });
        } else if self.repeat.is_some_and(|r| r.usage == usage) {
            self.repeat = None;
        }
    }

    /// Releases every key that is still held.
    pub fn clear(&mut self) {
        self.repeat = None;
        for usage in 0..=u8::MAX {
            if self.is_held(usage) {
                self.set_held(usage, false);
                if self.scanning_enabled {
                    self.push_sequence(usage, false);
                }
            }
        }
    }

    /// Services the link and typematic repeat. Call as often as possible.
    pub fn task(&mut self, now_us: u64) {
        if let Some(byte) = self.phy.poll(now_us, &self.out) {
            self.receive_byte(byte);
        }
        self.typematic_tick(now_us);
    }

    fn typematic_tick(&mut self, now_us: u64) {
        let Some(repeat) = self.repeat else {
            return;
        };
        let Some(due) = repeat.due_us else {
            let delay = TYPEMATIC_DELAY_US[usize::from((self.typematic >> 5) & 0x03)];
            self.repeat = Some(Repeat {
                due_us: Some(now_us + delay),
                ..repeat
            });
            return;
        };
        if now_us < due || !self.scanning_enabled || !self.out.is_empty() {
            return;
        }
        self.push_sequence(repeat.usage, true);
        let period = TYPEMATIC_REPEAT_US[usize::from(self.typematic & 0x1F)];
        self.repeat = Some(Repeat {
            due_us: Some(now_us + period),
            ..repeat
        });
    }

    fn set_defaults(&mut self) {
        self.scancode_set = 2;
        self.typematic = DEFAULT_TYPEMATIC;
        self.leds = 0;
        self.expecting_data = None;
    }

    /// Receives a byte from the host. Anything still queued for the host is dropped first.
    pub fn receive_byte(&mut self, byte: u8) {
        self.out.clear();
        self.phy.discard_pending();
        debug!(byte, "ps/2 keyboard host byte");

        if let Some(expecting) = self.expecting_data.take() {
            self.handle_data_byte(expecting, byte);
            return;
        }

        match byte {
            0xED => {
                // Set LEDs (next byte contains LED state).
                self.push(ACK);
                self.expecting_data = Some(ExpectingData::LedState);
            }
            0xEE => {
                // Echo.
                self.push(0xEE);
            }
            0xF0 => {
                // Get/Set scancode set (next byte selects).
                self.push(ACK);
                self.expecting_data = Some(ExpectingData::ScancodeSet);
            }
            0xF2 => {
                // Identify: MF2 keyboard.
                self.push(ACK);
                self.push(0xAB);
                self.push(0x83);
            }
            0xF3 => {
                // Set typematic rate/delay.
                self.push(ACK);
                self.expecting_data = Some(ExpectingData::Typematic);
            }
            0xF4 => {
                self.scanning_enabled = true;
                self.push(ACK);
            }
            0xF5 => {
                // Disable scanning and restore defaults.
                self.set_defaults();
                self.scanning_enabled = false;
                self.repeat = None;
                self.push(ACK);
            }
            0xF6 => {
                self.set_defaults();
                self.scanning_enabled = true;
                self.push(ACK);
            }
            0xFE => {
                // Resend is answered by the phy from its last transmitted byte.
            }
            0xFF => {
                self.set_defaults();
                self.scanning_enabled = true;
                self.repeat = None;
                self.push(ACK);
                self.push(SELF_TEST_PASSED);
            }
            _ => {
                // Most commands are ACKed even if unsupported.
                self.push(ACK);
            }
        }
    }

    fn handle_data_byte(&mut self, expecting: ExpectingData, byte: u8) {
        match expecting {
            ExpectingData::LedState => {
                self.leds = byte & 0x07;
                self.push(ACK);
            }
            ExpectingData::Typematic => {
                self.typematic = byte & 0x7F;
                self.push(ACK);
            }
            ExpectingData::ScancodeSet => {
                if byte == 0 {
                    self.push(ACK);
                    self.push(self.scancode_set);
                    return;
                }
                if (1..=3).contains(&byte) {
                    self.scancode_set = byte;
                }
                self.push(ACK);
            }
        }
    }
}
