//! Device side of the PS/2 two-wire link.
//!
//! [`Ps2Phy`] never blocks: every call to [`Ps2Phy::poll`] advances the line
//! state machine by at most one half-bit step, so the main loop (or a timer
//! interrupt) can service several channels without busy-waiting.

use tracing::trace;

use crate::queue::ByteQueue;

pub const DEFAULT_HALF_PERIOD_US: u64 = 40;

/// Sent by either side to ask for the previous byte again.
pub const RESEND: u8 = 0xFE;

/// Open-drain clock and data lines. Writing `true` releases the line; the
/// sampled level is low whenever either side pulls it down.
pub trait Ps2Lines {
    fn clock(&self) -> bool;
    fn data(&self) -> bool;
    fn set_clock(&mut self, high: bool);
    fn set_data(&mut self, high: bool);
}

impl<T: Ps2Lines + ?Sized> Ps2Lines for Box<T> {
    fn clock(&self) -> bool {
        (**self).clock()
    }

    fn data(&self) -> bool {
        (**self).data()
    }

    fn set_clock(&mut self, high: bool) {
        (**self).set_clock(high)
    }

    fn set_data(&mut self, high: bool) {
        (**self).set_data(high)
    }
}

/// Position inside a host-to-device frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStage {
    StartBit,
    DataBits(u8),
    Parity,
    StopBit,
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhyState {
    Idle,
    Transmit {
        byte: u8,
        /// 0 = start, 1..=8 data, 9 parity, 10 stop.
        bit: u8,
        clock_low: bool,
    },
    Receive {
        stage: RxStage,
        clock_low: bool,
        data: u8,
        parity: bool,
        stop: bool,
    },
}

/// Level of the odd-parity bit for `byte`.
pub fn odd_parity_bit(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

fn frame_bit(byte: u8, bit: u8) -> bool {
    match bit {
        0 => false,
        1..=8 => (byte >> (bit - 1)) & 1 != 0,
        9 => odd_parity_bit(byte),
        _ => true,
    }
}

#[derive(Debug)]
pub struct Ps2Phy<L> {
    lines: L,
    state: PhyState,
    half_period_us: u64,
    next_step_us: u64,
    /// Byte to send before anything else in the queue: an aborted frame or a resend.
    pending: Option<u8>,
    last_tx: Option<u8>,
    inhibited_since: Option<u64>,
}

impl<L: Ps2Lines> Ps2Phy<L> {
    pub fn new(lines: L) -> Self {
        Self::with_half_period(lines, DEFAULT_HALF_PERIOD_US)
    }

    pub fn with_half_period(mut lines: L, half_period_us: u64) -> Self {
        lines.set_clock(true);
        lines.set_data(true);
        Self {
            lines,
            state: PhyState::Idle,
            half_period_us: half_period_us.max(1),
            next_step_us: 0,
            pending: None,
            last_tx: None,
            inhibited_since: None,
        }
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }

    pub fn is_idle(&self) -> bool {
        self.state == PhyState::Idle
    }

    pub fn is_receiving(&self) -> bool {
        matches!(self.state, PhyState::Receive { .. })
    }

    pub fn rx_stage(&self) -> Option<RxStage> {
        match self.state {
            PhyState::Receive { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Drops an aborted frame so it is not retransmitted.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// True once the host has held the clock line low for at least `window_us`.
    pub fn host_inhibited_for(&self, now_us: u64, window_us: u64) -> bool {
        self.inhibited_since
            .is_some_and(|since| now_us.saturating_sub(since) >= window_us)
    }

    /// Advances the link by one half-bit step if one is due. Returns a byte once the host
    /// has finished sending it.
    pub fn poll<const N: usize>(&mut self, now_us: u64, queue: &ByteQueue<N>) -> Option<u8> {
        self.track_inhibit(now_us);
        if now_us < self.next_step_us {
            return None;
        }
        self.next_step_us = now_us + self.half_period_us;

        match self.state {
            PhyState::Idle => {
                self.start(queue);
                None
            }
            PhyState::Transmit { .. } => {
                self.step_transmit();
                None
            }
            PhyState::Receive { .. } => self.step_receive(),
        }
    }

    fn track_inhibit(&mut self, now_us: u64) {
        if self.state != PhyState::Idle {
            return;
        }
        if self.lines.clock() {
            self.inhibited_since = None;
        } else if self.inhibited_since.is_none() {
            self.inhibited_since = Some(now_us);
        }
    }

    fn start<const N: usize>(&mut self, queue: &ByteQueue<N>) {
        if !self.lines.clock() {
            return;
        }
        if !self.lines.data() {
            // Request-to-send: the host released the clock with data held low.
            self.state = PhyState::Receive {
                stage: RxStage::StartBit,
                clock_low: false,
                data: 0,
                parity: false,
                stop: false,
            };
            return;
        }
        if let Some(byte) = self.pending.take().or_else(|| queue.pop()) {
            self.state = PhyState::Transmit {
                byte,
                bit: 0,
                clock_low: false,
            };
            self.step_transmit();
        }
    }

    fn step_transmit(&mut self) {
        let PhyState::Transmit {
            byte,
            bit,
            clock_low,
        } = self.state
        else {
            return;
        };

        if !clock_low {
            if !self.lines.clock() {
                trace!(byte, bit, "host inhibited transmission, will retry");
                self.lines.set_data(true);
                self.pending = Some(byte);
                self.state = PhyState::Idle;
                return;
            }
            self.lines.set_data(frame_bit(byte, bit));
            self.lines.set_clock(false);
            self.state = PhyState::Transmit {
                byte,
                bit,
                clock_low: true,
            };
            return;
        }

        self.lines.set_clock(true);
        let bit = bit + 1;
        if bit == 11 {
            self.lines.set_data(true);
            self.last_tx = Some(byte);
            self.state = PhyState::Idle;
        } else {
            self.state = PhyState::Transmit {
                byte,
                bit,
                clock_low: false,
            };
        }
    }

    fn step_receive(&mut self) -> Option<u8> {
        let PhyState::Receive {
            mut stage,
            clock_low,
            mut data,
            mut parity,
            mut stop,
        } = self.state
        else {
            return None;
        };

        if stage == RxStage::StartBit {
            if self.lines.data() {
                // Host gave up before we started clocking.
                self.state = PhyState::Idle;
            } else {
                self.state = PhyState::Receive {
                    stage: RxStage::DataBits(0),
                    clock_low: false,
                    data,
                    parity,
                    stop,
                };
            }
            return None;
        }

        if !clock_low {
            if stage == RxStage::Ack {
                self.lines.set_data(false);
            }
            self.lines.set_clock(false);
            self.state = PhyState::Receive {
                stage,
                clock_low: true,
                data,
                parity,
                stop,
            };
            return None;
        }

        self.lines.set_clock(true);
        if stage == RxStage::Ack {
            self.lines.set_data(true);
            self.state = PhyState::Idle;
            return self.finish_receive(data, parity, stop);
        }
        if !self.lines.clock() {
            trace!(?stage, "host aborted transmission");
            self.state = PhyState::Idle;
            return None;
        }

        let level = self.lines.data();
        stage = match stage {
            RxStage::DataBits(i) => {
                if level {
                    data |= 1 << i;
                }
                if i == 7 {
                    RxStage::Parity
                } else {
                    RxStage::DataBits(i + 1)
                }
            }
            RxStage::Parity => {
                parity = level;
                RxStage::StopBit
            }
            RxStage::StopBit => {
                stop = level;
                RxStage::Ack
            }
            RxStage::StartBit | RxStage::Ack => stage,
        };
        self.state = PhyState::Receive {
            stage,
            clock_low: false,
            data,
            parity,
            stop,
        };
        None
    }

    fn finish_receive(&mut self, data: u8, parity: bool, stop: bool) -> Option<u8> {
        if !stop || parity != odd_parity_bit(data) {
            trace!(data, parity, stop, "framing error, requesting resend");
            self.pending = Some(RESEND);
            return None;
        }
        if data == RESEND {
            self.pending = self.last_tx;
            return None;
        }
        self.pending = None;
        Some(data)
    }
}
