//! Build-time choices of a firmware image, as one serializable value.

use hid_proto::{Capabilities, KeyboardOutput, MouseOutput, OutputBits};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SERIAL_TIMEOUT_US: u64 = 100_000;
pub const MAX_PS2_HALF_PERIOD_US: u64 = 1_000;

fn default_serial_timeout_us() -> u64 {
    DEFAULT_SERIAL_TIMEOUT_US
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Serial {
        /// A partially received frame older than this is dropped.
        #[serde(default = "default_serial_timeout_us")]
        timeout_us: u64,
    },
    Spi,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Serial {
            timeout_us: DEFAULT_SERIAL_TIMEOUT_US,
        }
    }
}

/// Optional parts compiled into the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub usb: bool,
    pub usb_compat: bool,
    pub ps2: bool,
    /// USB power/data switch between the bridge and the target.
    pub aum: bool,
    /// Backends can be changed at runtime and are persisted.
    pub dynamic: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            usb: true,
            usb_compat: false,
            ps2: true,
            aum: false,
            dynamic: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsbKeyboardFlavor {
    #[default]
    Boot,
    Nkro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardBackend {
    None,
    #[default]
    Usb,
    Ps2,
}

impl From<KeyboardBackend> for KeyboardOutput {
    fn from(value: KeyboardBackend) -> Self {
        match value {
            KeyboardBackend::None => Self::None,
            KeyboardBackend::Usb => Self::Usb,
            KeyboardBackend::Ps2 => Self::Ps2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseBackend {
    None,
    #[default]
    UsbAbsolute,
    UsbRelative,
    UsbCompat,
    Ps2,
}

impl From<MouseBackend> for MouseOutput {
    fn from(value: MouseBackend) -> Self {
        match value {
            MouseBackend::None => Self::None,
            MouseBackend::UsbAbsolute => Self::UsbAbsolute,
            MouseBackend::UsbRelative => Self::UsbRelative,
            MouseBackend::UsbCompat => Self::UsbCompat,
            MouseBackend::Ps2 => Self::Ps2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    pub transport: TransportConfig,
    pub features: Features,
    pub usb_keyboard: UsbKeyboardFlavor,
    pub default_keyboard: KeyboardBackend,
    pub default_mouse: MouseBackend,
    pub ps2_half_period_us: u64,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            features: Features::default(),
            usb_keyboard: UsbKeyboardFlavor::default(),
            default_keyboard: KeyboardBackend::default(),
            default_mouse: MouseBackend::default(),
            ps2_half_period_us: hid_devices_input::phy::DEFAULT_HALF_PERIOD_US,
        }
    }
}

impl FirmwareConfig {
    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let keyboard = KeyboardOutput::from(self.default_keyboard);
        if !self.supports_keyboard(keyboard) {
            return Err(ConfigError::KeyboardUnavailable(keyboard));
        }
        let mouse = MouseOutput::from(self.default_mouse);
        if !self.supports_mouse(mouse) {
            return Err(ConfigError::MouseUnavailable(mouse));
        }
        if !(1..=MAX_PS2_HALF_PERIOD_US).contains(&self.ps2_half_period_us) {
            return Err(ConfigError::HalfPeriod {
                value: self.ps2_half_period_us,
                max: MAX_PS2_HALF_PERIOD_US,
            });
        }
        if let TransportConfig::Serial { timeout_us: 0 } = self.transport {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn supports_keyboard(&self, output: KeyboardOutput) -> bool {
        match output {
            KeyboardOutput::None => true,
            KeyboardOutput::Usb => self.features.usb,
            KeyboardOutput::Ps2 => self.features.ps2,
        }
    }

    pub fn supports_mouse(&self, output: MouseOutput) -> bool {
        match output {
            MouseOutput::None => true,
            MouseOutput::UsbAbsolute | MouseOutput::UsbRelative => self.features.usb,
            MouseOutput::UsbCompat => self.features.usb && self.features.usb_compat,
            MouseOutput::Ps2 => self.features.ps2,
        }
    }

    pub fn default_outputs(&self) -> OutputBits {
        OutputBits::new(self.default_keyboard.into(), self.default_mouse.into())
    }

    /// Backends this build can drive. The switch bits depend on whether the switch came up,
    /// so they are added at runtime.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        if self.features.usb {
            caps |= Capabilities::HAS_USB;
            if self.features.usb_compat {
                caps |= Capabilities::HAS_USB_COMPAT;
            }
        }
        if self.features.ps2 {
            caps |= Capabilities::HAS_PS2;
        }
        caps
    }
}
