#![forbid(unsafe_code)]

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use hid_devices_input::Ps2Lines;
use hid_firmware::config::{FirmwareConfig, TransportConfig, DEFAULT_SERIAL_TIMEOUT_US};
use hid_firmware::transport::{IsrSerialPort, SerialLink, SpiExchange, SpiLink, Transport};
use hid_firmware::{Controller, FileStorage, NonVolatileStorage, Peripherals, StdClock};
use hid_usb::HidInterface;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Size of the emulated EEPROM backing the output record.
const STORAGE_SIZE: usize = 256;
const IDLE_SLEEP: Duration = Duration::from_micros(200);
/// Loop passes after end of input, enough to answer everything still queued.
const DRAIN_STEPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    Serial,
    Spi,
}

#[derive(Debug, Parser)]
#[command(
    name = "hid-bridge",
    about = "Runs the HID bridge firmware natively, speaking the 8-byte frame protocol over stdio or a device node."
)]
struct Args {
    /// Firmware configuration (JSON). Built-in defaults when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured transport.
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,

    /// Serial inter-byte timeout in microseconds.
    #[arg(long, value_name = "US")]
    serial_timeout_us: Option<u64>,

    /// Device node (tty, fifo) to talk to instead of stdin/stdout.
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// File emulating the non-volatile memory that holds the selected outputs.
    #[arg(long, value_name = "PATH", default_value = "hid-bridge-nv.bin")]
    storage: PathBuf,

    /// Print the effective configuration as JSON and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    print_config: bool,
}

fn main() -> Result<()> {
    // Stdout may carry protocol frames.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_json().context("failed to serialize configuration")?);
        return Ok(());
    }

    let storage: Box<dyn NonVolatileStorage> =
        Box::new(FileStorage::new(&args.storage, STORAGE_SIZE));
    let host = open_host_io(args.device.as_deref())?;
    info!(
        transport = ?config.transport,
        storage = %args.storage.display(),
        "starting firmware"
    );

    match config.transport {
        TransportConfig::Serial { timeout_us } => run_serial(config, storage, host, timeout_us),
        TransportConfig::Spi => run_spi(config, storage, host),
    }
}

fn load_config(args: &Args) -> Result<FirmwareConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            FirmwareConfig::from_json(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => FirmwareConfig::default(),
    };

    let configured_timeout = match config.transport {
        TransportConfig::Serial { timeout_us } => timeout_us,
        TransportConfig::Spi => DEFAULT_SERIAL_TIMEOUT_US,
    };
    let transport = args.transport.unwrap_or(match config.transport {
        TransportConfig::Serial { .. } => TransportArg::Serial,
        TransportConfig::Spi => TransportArg::Spi,
    });
    config.transport = match transport {
        TransportArg::Serial => TransportConfig::Serial {
            timeout_us: args.serial_timeout_us.unwrap_or(configured_timeout),
        },
        TransportArg::Spi => {
            if args.serial_timeout_us.is_some() {
                warn!("--serial-timeout-us has no effect on the spi transport");
            }
            TransportConfig::Spi
        }
    };

    config.validate().context("invalid configuration")?;
    Ok(config)
}

struct HostIo {
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

fn open_host_io(device: Option<&Path>) -> Result<HostIo> {
    match device {
        Some(path) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("failed to open device {}", path.display()))?;
            let reader = file
                .try_clone()
                .with_context(|| format!("failed to clone handle for {}", path.display()))?;
            Ok(HostIo {
                input: Box::new(reader),
                output: Box::new(file),
            })
        }
        None => Ok(HostIo {
            input: Box::new(io::stdin()),
            output: Box::new(io::stdout()),
        }),
    }
}

/// Stands in for an interrupt source: feeds every byte from the host to `on_byte`, then
/// raises `done` at end of input.
fn spawn_reader<F>(
    mut input: Box<dyn Read + Send>,
    done: Arc<AtomicBool>,
    mut on_byte: F,
) -> thread::JoinHandle<()>
where
    F: FnMut(u8) + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 64];
        loop {
            match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => buf[..n].iter().for_each(|&byte| on_byte(byte)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "host input failed");
                    break;
                }
            }
        }
        debug!("host input closed");
        done.store(true, Ordering::Release);
    })
}

fn run_serial(
    config: FirmwareConfig,
    storage: Box<dyn NonVolatileStorage>,
    host: HostIo,
    timeout_us: u64,
) -> Result<()> {
    let port = IsrSerialPort::new(host.output);
    let rx = port.rx_queue();
    let done = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(host.input, Arc::clone(&done), move |byte| {
        // A pipe can outrun the loop; unlike a UART it can be made to wait.
        while rx.push(byte).is_err() {
            thread::yield_now();
        }
    });

    let link = SerialLink::new(port, timeout_us);
    let controller = Controller::boot(config, storage, simulated_peripherals(), link, StdClock::new())
        .context("failed to boot firmware")?;
    drive(controller, &done);
    reader
        .join()
        .map_err(|_| anyhow!("host reader thread panicked"))
}

fn run_spi(
    config: FirmwareConfig,
    storage: Box<dyn NonVolatileStorage>,
    host: HostIo,
) -> Result<()> {
    let exchange = Arc::new(SpiExchange::new());
    let isr = Arc::clone(&exchange);
    let mut output = host.output;
    let done = Arc::new(AtomicBool::new(false));
    // Every byte in clocks one byte out, as on the wire.
    let reader = spawn_reader(host.input, Arc::clone(&done), move |byte| {
        let reply = isr.isr_exchange(byte);
        if let Err(err) = output.write_all(&[reply]).and_then(|()| output.flush()) {
            warn!(%err, "failed to write spi byte");
        }
    });

    let link = SpiLink::new(exchange);
    let controller = Controller::boot(config, storage, simulated_peripherals(), link, StdClock::new())
        .context("failed to boot firmware")?;
    drive(controller, &done);
    reader
        .join()
        .map_err(|_| anyhow!("host reader thread panicked"))
}

fn drive<T: Transport>(mut controller: Controller<T, StdClock>, done: &AtomicBool) {
    while !done.load(Ordering::Acquire) {
        controller.step();
        thread::sleep(IDLE_SLEEP);
    }
    for _ in 0..DRAIN_STEPS {
        controller.step();
    }
    info!("host disconnected");
}

fn simulated_peripherals() -> Peripherals {
    Peripherals {
        usb_keyboard: Some(Box::new(LoggingHid { name: "keyboard" })),
        usb_mouse: Some(Box::new(LoggingHid { name: "mouse" })),
        ps2_keyboard: Some(Box::new(FloatingBus::default())),
        ps2_mouse: Some(Box::new(FloatingBus::default())),
        ..Peripherals::default()
    }
}

/// Always-ready USB endpoint that logs each report.
struct LoggingHid {
    name: &'static str,
}

impl HidInterface for LoggingHid {
    fn is_ready(&self) -> bool {
        true
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn remote_wakeup(&mut self) {
        debug!(interface = self.name, "remote wakeup");
    }

    fn send_report(&mut self, report: &[u8]) -> bool {
        info!(interface = self.name, report = ?report, "hid report");
        true
    }
}

/// PS/2 port with no host attached: lines read back whatever the device drives.
struct FloatingBus {
    clock: bool,
    data: bool,
}

impl Default for FloatingBus {
    fn default() -> Self {
        Self {
            clock: true,
            data: true,
        }
    }
}

impl Ps2Lines for FloatingBus {
    fn clock(&self) -> bool {
        self.clock
    }

    fn data(&self) -> bool {
        self.data
    }

    fn set_clock(&mut self, high: bool) {
        self.clock = high;
    }

    fn set_data(&mut self, high: bool) {
        self.data = high;
    }
}
