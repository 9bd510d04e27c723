use tracing::trace;

use crate::descriptors::{BOOT_KEYBOARD_REPORT_DESCRIPTOR, NKRO_KEYBOARD_REPORT_DESCRIPTOR};
use crate::link::LinkMonitor;
use crate::HidInterface;

/// LED bits of the keyboard output report.
pub const LED_NUM_LOCK: u8 = 1 << 0;
pub const LED_CAPS_LOCK: u8 = 1 << 1;
pub const LED_SCROLL_LOCK: u8 = 1 << 2;

const BOOT_REPORT_LEN: usize = 8;
const NKRO_REPORT_LEN: usize = 1 + 28;
const NKRO_MAX_USAGE: u8 = 0xDF;
const ERROR_ROLL_OVER: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardMode {
    /// Six-key boot protocol report.
    Boot,
    /// Bitmap report, every usage up to `0xDF` at once.
    Nkro,
}

impl KeyboardMode {
    pub fn report_descriptor(self) -> &'static [u8] {
        match self {
            Self::Boot => BOOT_KEYBOARD_REPORT_DESCRIPTOR,
            Self::Nkro => NKRO_KEYBOARD_REPORT_DESCRIPTOR,
        }
    }

    pub fn report_len(self) -> usize {
        match self {
            Self::Boot => BOOT_REPORT_LEN,
            Self::Nkro => NKRO_REPORT_LEN,
        }
    }
}

fn keyboard_modifier_bit(usage: u8) -> Option<u8> {
    if (0xE0..=0xE7).contains(&usage) {
        Some(1u8 << (usage - 0xE0))
    } else {
        None
    }
}

/// USB keyboard. Only the latest state matters, so reports are coalesced: an unsent state
/// is retried from [`UsbHidKeyboard::periodic`] instead of being queued.
#[derive(Debug)]
pub struct UsbHidKeyboard<I> {
    iface: I,
    mode: KeyboardMode,
    modifiers: u8,
    pressed_keys: Vec<u8>,
    dirty: bool,
    link: LinkMonitor,
}

impl<I: HidInterface> UsbHidKeyboard<I> {
    pub fn new(iface: I, mode: KeyboardMode) -> Self {
        Self {
            iface,
            mode,
            modifiers: 0,
            pressed_keys: Vec::new(),
            dirty: false,
            link: LinkMonitor::new(),
        }
    }

    pub fn mode(&self) -> KeyboardMode {
        self.mode
    }

    pub fn interface(&self) -> &I {
        &self.iface
    }

    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    /// Non-modifier usages currently held, in press order.
    pub fn pressed_keys(&self) -> &[u8] {
        &self.pressed_keys
    }

    pub fn begin(&mut self) {
        self.modifiers = 0;
        self.pressed_keys.clear();
        self.dirty = false;
        self.link = LinkMonitor::new();
    }

    pub fn clear(&mut self) {
        if self.modifiers == 0 && self.pressed_keys.is_empty() {
            return;
        }
        self.modifiers = 0;
        self.pressed_keys.clear();
        self.dirty = true;
        self.flush();
    }

    pub fn key_event(&mut self, usage: u8, pressed: bool) {
        if usage == 0 {
            return;
        }
        if self.mode == KeyboardMode::Nkro
            && usage > NKRO_MAX_USAGE
            && keyboard_modifier_bit(usage).is_none()
        {
            trace!(usage, "usage outside the nkro bitmap");
            return;
        }

        let mut changed = false;
        if let Some(bit) = keyboard_modifier_bit(usage) {
            let before = self.modifiers;
            if pressed {
                self.modifiers |= bit;
            } else {
                self.modifiers &= !bit;
            }
            changed = before != self.modifiers;
        } else if pressed {
            if !self.pressed_keys.iter().any(|&k| k == usage) {
                self.pressed_keys.push(usage);
                changed = true;
            }
        } else {
            let before_len = self.pressed_keys.len();
            self.pressed_keys.retain(|&k| k != usage);
            changed = before_len != self.pressed_keys.len();
        }

        if changed {
            self.dirty = true;
            self.flush();
        }
    }

    /// Samples the link and retries an unsent report.
    pub fn periodic(&mut self, now_us: u64) {
        let ready = self.iface.is_ready();
        if self.link.sample(now_us, ready) {
            // The host may have lost our state while the link was down.
            self.dirty = true;
        }
        if self.dirty {
            self.flush();
        }
    }

    pub fn is_offline(&self) -> bool {
        !self.link.is_online()
    }

    /// `LED_*` bits from the host's last output report.
    pub fn leds(&self) -> u8 {
        self.iface.led_report() & (LED_NUM_LOCK | LED_CAPS_LOCK | LED_SCROLL_LOCK)
    }

    pub fn report(&self) -> Vec<u8> {
        let mut report = vec![0u8; self.mode.report_len()];
        report[0] = self.modifiers;
        match self.mode {
            KeyboardMode::Boot => {
                let keys = &mut report[2..];
                if self.pressed_keys.len() > keys.len() {
                    keys.fill(ERROR_ROLL_OVER);
                } else {
                    keys[..self.pressed_keys.len()].copy_from_slice(&self.pressed_keys);
                }
            }
            KeyboardMode::Nkro => {
                let bitmap = &mut report[1..];
                for &usage in &self.pressed_keys {
                    bitmap[usize::from(usage / 8)] |= 1 << (usage % 8);
                }
            }
        }
        report
    }

    fn flush(&mut self) {
        if self.iface.is_suspended() {
            self.iface.remote_wakeup();
            return;
        }
        if !self.iface.is_ready() {
            return;
        }
        let report = self.report();
        if self.iface.send_report(&report) {
            self.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Endpoint {
        ready: bool,
        suspended: bool,
        busy: bool,
        wakeups: usize,
        leds: u8,
        sent: Vec<Vec<u8>>,
    }

    #[derive(Debug, Clone)]
    struct TestIface(Rc<RefCell<Endpoint>>);

    impl HidInterface for TestIface {
        fn is_ready(&self) -> bool {
            self.0.borrow().ready
        }

        fn is_suspended(&self) -> bool {
            self.0.borrow().suspended
        }

        fn remote_wakeup(&mut self) {
            self.0.borrow_mut().wakeups += 1;
        }

        fn send_report(&mut self, report: &[u8]) -> bool {
            let mut ep = self.0.borrow_mut();
            if ep.busy {
                return false;
            }
            ep.sent.push(report.to_vec());
            true
        }

        fn led_report(&self) -> u8 {
            self.0.borrow().leds
        }
    }

    fn keyboard(mode: KeyboardMode) -> (UsbHidKeyboard<TestIface>, Rc<RefCell<Endpoint>>) {
        let ep = Rc::new(RefCell::new(Endpoint {
            ready: true,
            ..Endpoint::default()
        }));
        (UsbHidKeyboard::new(TestIface(ep.clone()), mode), ep)
    }

    #[test]
    fn boot_report_layout() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        kbd.key_event(0xE1, true);
        kbd.key_event(0x04, true);
        assert_eq!(
            ep.borrow().sent.last().unwrap(),
            &vec![0x02, 0, 0x04, 0, 0, 0, 0, 0]
        );
        assert_eq!(kbd.pressed_keys(), &[0x04]);
        assert_eq!(ep.borrow().sent.len(), 2);
    }

    #[test]
    fn boot_rollover() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        for usage in 0x04..0x0B {
            kbd.key_event(usage, true);
        }
        assert_eq!(
            ep.borrow().sent.last().unwrap(),
            &vec![0, 0, 1, 1, 1, 1, 1, 1]
        );
        kbd.key_event(0x04, false);
        assert_eq!(
            ep.borrow().sent.last().unwrap(),
            &vec![0, 0, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]
        );
    }

    #[test]
    fn repeated_press_is_not_resent() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        kbd.key_event(0x04, true);
        kbd.key_event(0x04, true);
        kbd.key_event(0x05, false);
        assert_eq!(ep.borrow().sent.len(), 1);
    }

    #[test]
    fn nkro_bitmap() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Nkro);
        for usage in [0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0xDF] {
            kbd.key_event(usage, true);
        }
        kbd.key_event(0xE0, true);
        let sent = ep.borrow().sent.last().cloned().unwrap();
        assert_eq!(sent.len(), 29);
        assert_eq!(sent[0], 0x01);
        assert_eq!(sent[1], 0b1111_0000);
        assert_eq!(sent[2], 0b0000_0111);
        assert_eq!(sent[28], 0b1000_0000);

        kbd.key_event(0xF0, true);
        assert!(!kbd.pressed_keys().contains(&0xF0));
    }

    #[test]
    fn busy_endpoint_coalesces_and_retries() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        ep.borrow_mut().busy = true;
        kbd.key_event(0x04, true);
        kbd.key_event(0x05, true);
        assert!(ep.borrow().sent.is_empty());

        ep.borrow_mut().busy = false;
        kbd.periodic(0);
        kbd.periodic(1_000);
        assert_eq!(
            ep.borrow().sent.as_slice(),
            &[vec![0, 0, 0x04, 0x05, 0, 0, 0, 0]]
        );
    }

    #[test]
    fn suspended_bus_requests_wakeup() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        ep.borrow_mut().suspended = true;
        kbd.key_event(0x04, true);
        assert_eq!(ep.borrow().wakeups, 1);
        assert!(ep.borrow().sent.is_empty());

        ep.borrow_mut().suspended = false;
        kbd.periodic(0);
        assert_eq!(ep.borrow().sent.len(), 1);
    }

    #[test]
    fn offline_after_debounce_and_resync_on_return() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        kbd.key_event(0x04, true);
        ep.borrow_mut().ready = false;
        for ms in 0..=60 {
            kbd.periodic(ms * 1_000);
        }
        assert!(kbd.is_offline());

        ep.borrow_mut().ready = true;
        kbd.periodic(61_000);
        assert!(!kbd.is_offline());
        assert_eq!(ep.borrow().sent.len(), 2);
        assert_eq!(ep.borrow().sent[1], vec![0, 0, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn leds_are_masked() {
        let (kbd, ep) = keyboard(KeyboardMode::Boot);
        ep.borrow_mut().leds = 0xFF;
        assert_eq!(kbd.leds(), 0x07);
    }

    #[test]
    fn clear_releases_everything() {
        let (mut kbd, ep) = keyboard(KeyboardMode::Boot);
        kbd.key_event(0xE0, true);
        kbd.key_event(0x04, true);
        kbd.clear();
        assert_eq!(ep.borrow().sent.last().unwrap(), &vec![0u8; 8]);
        assert!(kbd.pressed_keys().is_empty());
    }
}
