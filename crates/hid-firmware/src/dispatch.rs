//! Request handling: one inbound frame in, exactly one response frame out.

use hid_proto::{
    decode_request, Capabilities, ErrorCode, Frame, KeyboardOutput, MouseOutput, Operation,
    OutputBits, Pong, PongFlags, Response,
};
use tracing::{debug, info, trace};

use crate::controller::ControllerState;
use crate::drivers::{DriverKind, Keyboard, Mouse};

pub use crate::transport::Inbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Responding,
}

#[derive(Debug)]
pub struct Dispatcher {
    state: DispatchState,
    /// Encoded bytes of the last composed response; `REPEAT` answers with these.
    last: Frame,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Idle,
            last: Response::bare_error(ErrorCode::None).encode(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn repeat_last(&self) -> Frame {
        self.last
    }

    pub fn handle(&mut self, inbound: Inbound, ctl: &mut ControllerState) -> Frame {
        self.state = DispatchState::Dispatching;
        let response = match inbound {
            Inbound::Timeout => Some(compose_error(ErrorCode::Timeout, ctl)),
            Inbound::Frame(frame) => self.dispatch_frame(&frame, ctl),
        };

        self.state = DispatchState::Responding;
        if let Some(response) = response {
            self.last = response.encode();
        }
        self.state = DispatchState::Idle;
        self.last
    }

    /// `None` means "answer with the cached response".
    fn dispatch_frame(&mut self, frame: &Frame, ctl: &mut ControllerState) -> Option<Response> {
        let request = match decode_request(frame) {
            Ok(request) => request,
            Err(err) => {
                debug!(%err, "rejecting request");
                return Some(compose_error(ErrorCode::Crc, ctl));
            }
        };
        let Some(operation) = request.operation() else {
            debug!(code = request.code, "unknown command");
            return Some(compose_error(ErrorCode::Invalid, ctl));
        };
        trace!(?operation, "dispatching");

        match operation {
            Operation::Repeat => return None,
            Operation::Ping => {}
            Operation::SetKeyboard(bits) => set_output(ctl, KeyboardOutput::MASK, bits),
            Operation::SetMouse(bits) => set_output(ctl, MouseOutput::MASK, bits),
            Operation::SetConnected(connected) => match &mut ctl.aum {
                Some(aum) => aum.set_usb_connected(connected),
                None => debug!("usb switch not available"),
            },
            Operation::ClearHid => {
                ctl.keyboard.clear();
                ctl.mouse.clear();
            }
            Operation::Key { code, pressed } => ctl.keyboard.send_key(code, pressed),
            Operation::MouseButtons(buttons) => ctl.mouse.send_buttons(buttons),
            Operation::MouseMove { x, y } => ctl.mouse.send_move(x, y),
            Operation::MouseRelative { dx, dy } => ctl.mouse.send_relative(dx, dy),
            Operation::MouseWheel { dy } => ctl.mouse.send_wheel(dy),
        }
        Some(Response::Pong(compose_pong(ctl)))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Persists a backend change. Drivers keep running until the next boot.
fn set_output(ctl: &mut ControllerState, mask: u8, bits: u8) {
    if !ctl.config.features.dynamic {
        debug!(mask, bits, "runtime output changes are not compiled in");
        return;
    }
    ctl.registry.update(mask, bits, false);
    if !ctl.reset_required {
        info!(mask, bits, "outputs changed, reset required");
    }
    ctl.reset_required = true;
}

pub fn compose_pong(ctl: &ControllerState) -> Pong {
    let mut flags = PongFlags::OK;
    if ctl.reset_required {
        flags |= PongFlags::RESET_REQUIRED;
    }
    if ctl.keyboard.kind() != DriverKind::Dummy {
        if ctl.keyboard.is_offline() {
            flags |= PongFlags::KEYBOARD_OFFLINE;
        }
        let leds = ctl.keyboard.leds();
        flags.set(PongFlags::CAPS, leds.caps);
        flags.set(PongFlags::SCROLL, leds.scroll);
        flags.set(PongFlags::NUM, leds.num);
    }
    if ctl.mouse.kind() != DriverKind::Dummy && ctl.mouse.is_offline() {
        flags |= PongFlags::MOUSE_OFFLINE;
    }

    let (outputs, capabilities) = state_bytes(ctl);
    Pong {
        flags,
        outputs,
        capabilities,
    }
}

/// Error responses report the same backend and capability bytes as a `PING` would.
pub fn compose_error(code: ErrorCode, ctl: &ControllerState) -> Response {
    let (outputs, capabilities) = state_bytes(ctl);
    Response::Error {
        code,
        outputs,
        capabilities,
    }
}

/// Bytes 2 and 3 of every response.
fn state_bytes(ctl: &ControllerState) -> (OutputBits, Capabilities) {
    let mut outputs = if ctl.config.features.dynamic {
        OutputBits::DYNAMIC
    } else {
        0
    };
    let keyboard = ctl.keyboard.kind();
    if keyboard != DriverKind::Dummy {
        outputs |= keyboard.keyboard_output().bits();
    }
    let mouse = ctl.mouse.kind();
    if mouse != DriverKind::Dummy {
        outputs |= mouse.mouse_output().bits();
    }

    let mut capabilities = ctl.config.capabilities();
    // Only a switch that was actually brought up can be driven by SET_CONNECTED.
    if let Some(aum) = &ctl.aum {
        capabilities |= Capabilities::CONNECTABLE;
        if aum.is_usb_connected() {
            capabilities |= Capabilities::CONNECTED;
        }
    }
    (OutputBits(outputs), capabilities)
}
