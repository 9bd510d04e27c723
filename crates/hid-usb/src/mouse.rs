use std::collections::VecDeque;

use tracing::trace;

use crate::descriptors::{
    ABSOLUTE_COMPAT_MOUSE_REPORT_DESCRIPTOR, ABSOLUTE_MOUSE_REPORT_DESCRIPTOR,
    RELATIVE_MOUSE_REPORT_DESCRIPTOR,
};
use crate::link::LinkMonitor;
use crate::HidInterface;

pub const BUTTON_LEFT: u8 = 1 << 0;
pub const BUTTON_RIGHT: u8 = 1 << 1;
pub const BUTTON_MIDDLE: u8 = 1 << 2;
pub const BUTTON_EXTRA_UP: u8 = 1 << 3;
pub const BUTTON_EXTRA_DOWN: u8 = 1 << 4;

const MAX_PENDING_REPORTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMode {
    Absolute,
    /// Absolute pointer reporting the full unsigned 16-bit range.
    AbsoluteCompat,
    Relative,
}

impl MouseMode {
    pub fn report_descriptor(self) -> &'static [u8] {
        match self {
            Self::Absolute => ABSOLUTE_MOUSE_REPORT_DESCRIPTOR,
            Self::AbsoluteCompat => ABSOLUTE_COMPAT_MOUSE_REPORT_DESCRIPTOR,
            Self::Relative => RELATIVE_MOUSE_REPORT_DESCRIPTOR,
        }
    }

    pub fn report_len(self) -> usize {
        match self {
            Self::Absolute | Self::AbsoluteCompat => 6,
            Self::Relative => 4,
        }
    }

    pub fn is_absolute(self) -> bool {
        !matches!(self, Self::Relative)
    }
}

/// Maps a signed host coordinate onto the descriptor's logical range.
fn scale_axis(value: i16, mode: MouseMode) -> u16 {
    let scaled = ((i32::from(value) + 32768) / 2) as u16;
    match mode {
        MouseMode::AbsoluteCompat => scaled << 1,
        _ => scaled,
    }
}

/// USB mouse. Every movement matters, so reports queue (bounded) while the endpoint is busy.
#[derive(Debug)]
pub struct UsbHidMouse<I> {
    iface: I,
    mode: MouseMode,
    buttons: u8,
    x: u16,
    y: u16,
    pending_reports: VecDeque<[u8; 6]>,
    link: LinkMonitor,
}

impl<I: HidInterface> UsbHidMouse<I> {
    pub fn new(iface: I, mode: MouseMode) -> Self {
        Self {
            iface,
            mode,
            buttons: 0,
            x: scale_axis(0, mode),
            y: scale_axis(0, mode),
            pending_reports: VecDeque::new(),
            link: LinkMonitor::new(),
        }
    }

    pub fn mode(&self) -> MouseMode {
        self.mode
    }

    pub fn interface(&self) -> &I {
        &self.iface
    }

    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    pub fn pending_reports(&self) -> usize {
        self.pending_reports.len()
    }

    pub fn begin(&mut self) {
        self.buttons = 0;
        self.pending_reports.clear();
        self.link = LinkMonitor::new();
    }

    pub fn clear(&mut self) {
        if self.buttons != 0 {
            self.send_buttons(0);
        }
    }

    /// Replaces the whole button state.
    pub fn send_buttons(&mut self, buttons: u8) {
        self.buttons = buttons & 0x1F;
        self.push_report(0, 0, 0);
    }

    /// Absolute move. No-op on a relative mouse.
    pub fn send_move(&mut self, x: i16, y: i16) {
        if !self.mode.is_absolute() {
            return;
        }
        self.x = scale_axis(x, self.mode);
        self.y = scale_axis(y, self.mode);
        self.push_report(0, 0, 0);
    }

    /// Relative move. No-op on an absolute mouse.
    pub fn send_relative(&mut self, dx: i8, dy: i8) {
        if self.mode.is_absolute() {
            return;
        }
        self.push_report(dx, dy, 0);
    }

    pub fn send_wheel(&mut self, delta: i8) {
        self.push_report(0, 0, delta);
    }

    pub fn periodic(&mut self, now_us: u64) {
        let ready = self.iface.is_ready();
        self.link.sample(now_us, ready);
        self.flush();
    }

    pub fn is_offline(&self) -> bool {
        !self.link.is_online()
    }

    fn build_report(&self, dx: i8, dy: i8, wheel: i8) -> [u8; 6] {
        match self.mode {
            MouseMode::Absolute | MouseMode::AbsoluteCompat => {
                let [x_lo, x_hi] = self.x.to_le_bytes();
                let [y_lo, y_hi] = self.y.to_le_bytes();
                [self.buttons, x_lo, x_hi, y_lo, y_hi, wheel as u8]
            }
            MouseMode::Relative => [self.buttons, dx as u8, dy as u8, wheel as u8, 0, 0],
        }
    }

    fn push_report(&mut self, dx: i8, dy: i8, wheel: i8) {
        if self.iface.is_suspended() {
            self.iface.remote_wakeup();
            trace!("bus suspended, dropping mouse report");
            return;
        }
        let report = self.build_report(dx, dy, wheel);
        self.pending_reports.push_back(report);
        if self.pending_reports.len() > MAX_PENDING_REPORTS {
            self.pending_reports.pop_front();
        }
        self.flush();
    }

    fn flush(&mut self) {
        if self.iface.is_suspended() || !self.iface.is_ready() {
            return;
        }
        let len = self.mode.report_len();
        while let Some(report) = self.pending_reports.front() {
            if !self.iface.send_report(&report[..len]) {
                break;
            }
            self.pending_reports.pop_front();
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
        sent: Vec<Vec<u8>>,
    }

    #[derive(Debug)]
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
    }

    fn mouse(mode: MouseMode) -> (UsbHidMouse<TestIface>, Rc<RefCell<Endpoint>>) {
        let ep = Rc::new(RefCell::new(Endpoint {
            ready: true,
            ..Endpoint::default()
        }));
        (UsbHidMouse::new(TestIface(Rc::clone(&ep)), mode), ep)
    }

    #[test]
    fn absolute_axes_are_rescaled() {
        let (mut m, ep) = mouse(MouseMode::Absolute);
        m.send_move(i16::MIN, i16::MAX);
        assert_eq!(ep.borrow().sent[0], vec![0, 0x00, 0x00, 0xFF, 0x7F, 0]);
        m.send_move(0, 0);
        assert_eq!(ep.borrow().sent[1], vec![0, 0x00, 0x40, 0x00, 0x40, 0]);
    }

    #[test]
    fn compat_mode_doubles_the_range() {
        let (mut m, ep) = mouse(MouseMode::AbsoluteCompat);
        m.send_move(i16::MAX, 0);
        assert_eq!(ep.borrow().sent[0], vec![0, 0xFE, 0xFF, 0x00, 0x80, 0]);
    }

    #[test]
    fn buttons_keep_last_absolute_position() {
        let (mut m, ep) = mouse(MouseMode::Absolute);
        m.send_move(100, 200);
        m.send_buttons(BUTTON_LEFT | BUTTON_EXTRA_DOWN);
        let ep = ep.borrow();
        let sent = &ep.sent;
        assert_eq!(sent[1][0], 0x11);
        assert_eq!(sent[1][1..5], sent[0][1..5]);
    }

    #[test]
    fn relative_reports() {
        let (mut m, ep) = mouse(MouseMode::Relative);
        m.send_relative(-5, 7);
        m.send_wheel(-1);
        m.send_move(1000, 1000);
        assert_eq!(
            ep.borrow().sent.as_slice(),
            &[vec![0, 0xFB, 0x07, 0], vec![0, 0, 0, 0xFF]]
        );
    }

    #[test]
    fn absolute_mouse_ignores_relative_moves() {
        let (mut m, ep) = mouse(MouseMode::Absolute);
        m.send_relative(1, 1);
        assert!(ep.borrow().sent.is_empty());
    }

    #[test]
    fn busy_endpoint_queues_in_order() {
        let (mut m, ep) = mouse(MouseMode::Relative);
        ep.borrow_mut().busy = true;
        m.send_relative(1, 0);
        m.send_relative(2, 0);
        assert_eq!(m.pending_reports(), 2);

        ep.borrow_mut().busy = false;
        m.periodic(0);
        assert_eq!(
            ep.borrow().sent.as_slice(),
            &[vec![0, 1, 0, 0], vec![0, 2, 0, 0]]
        );
        assert_eq!(m.pending_reports(), 0);
    }

    #[test]
    fn queue_is_bounded() {
        let (mut m, ep) = mouse(MouseMode::Relative);
        ep.borrow_mut().busy = true;
        for _ in 0..(MAX_PENDING_REPORTS + 16) {
            m.send_relative(1, 1);
        }
        assert_eq!(m.pending_reports(), MAX_PENDING_REPORTS);
    }

    #[test]
    fn suspended_bus_drops_reports_and_wakes_host() {
        let (mut m, ep) = mouse(MouseMode::Relative);
        ep.borrow_mut().suspended = true;
        m.send_relative(1, 1);
        assert_eq!(m.pending_reports(), 0);
        assert_eq!(ep.borrow().wakeups, 1);
    }

    #[test]
    fn clear_releases_buttons_once() {
        let (mut m, ep) = mouse(MouseMode::Relative);
        m.send_buttons(BUTTON_RIGHT);
        m.clear();
        m.clear();
        assert_eq!(
            ep.borrow().sent.as_slice(),
            &[vec![BUTTON_RIGHT, 0, 0, 0], vec![0, 0, 0, 0]]
        );
    }
}
