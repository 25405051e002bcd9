//! # Modbus I/O Bridge
//!
//! Exposes the I/O channels of a Linux board to Modbus TCP clients.
//!
//! ## Overview
//!
//! This binary combines [`modbus_io_server`] with concrete hardware backends.
//! Digital channels are GPIO lines of a character device, pulse-width outputs are
//! sysfs PWM channels and analog inputs are IIO voltage channels. A simulated board
//! without any hardware is available for testing clients.
//!
//! The server runs until it receives SIGINT or SIGTERM. It then closes the listener,
//! every client connection and finally releases the hardware.
pub mod backends;

use std::error::Error;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap_num::{maybe_hex, number_range};
use env_logger::Env;
use modbus_io_server::{ChannelCounts, HardwareBinding, memory::MemoryBoard, server::Builder};
use nix::sys::{
    signal::{SigSet, Signal},
    signalfd::{SfdFlags, SignalFd},
};

use crate::backends::board::{
    BoardConfig, DEFAULT_ANALOG_CHANNELS, DEFAULT_COIL_LINES, DEFAULT_DISCRETE_LINES,
    DEFAULT_GPIOCHIP, DEFAULT_IIO_DEVICE, DEFAULT_PWM_CHANNELS, DEFAULT_PWM_PERIOD_NS,
    DEFAULT_PWMCHIP, LinuxBoard,
};

fn pwm_period(s: &str) -> Result<u64, String> {
    number_range(s, 1_000, 1_000_000_000)
}

#[derive(Parser, Eq, PartialEq, Clone, Debug)]
enum DeviceImpl {
    /// GPIO character device, sysfs PWM and IIO channels
    Linux {
        #[arg(long, default_value = DEFAULT_GPIOCHIP)]
        gpiochip: PathBuf,
        #[arg(long, default_value = DEFAULT_PWMCHIP)]
        pwmchip: PathBuf,
        #[arg(long, default_value = DEFAULT_IIO_DEVICE)]
        iio_device: PathBuf,
        #[arg(
            long,
            help = "The PWM period in nanoseconds",
            default_value_t = DEFAULT_PWM_PERIOD_NS,
            value_parser = pwm_period
        )]
        pwm_period_ns: u64,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_DISCRETE_LINES)]
        discrete_lines: Vec<u32>,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_COIL_LINES)]
        coil_lines: Vec<u32>,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_PWM_CHANNELS)]
        pwm_channels: Vec<u32>,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_ANALOG_CHANNELS)]
        analog_channels: Vec<u32>,
    },
    /// In-memory channels, for testing clients without hardware
    Simulated,
}

impl DeviceImpl {
    fn linux(config: BoardConfig) -> DeviceImpl {
        DeviceImpl::Linux {
            gpiochip: config.gpiochip,
            pwmchip: config.pwmchip,
            iio_device: config.iio_device,
            pwm_period_ns: config.pwm_period_ns,
            discrete_lines: config.discrete_lines,
            coil_lines: config.coil_lines,
            pwm_channels: config.pwm_channels,
            analog_channels: config.analog_channels,
        }
    }
}

#[derive(Parser)]
#[command(about = "Modbus TCP server for digital, pulse-width and analog I/O", long_about=None)]
struct Args {
    #[arg(short, long, default_value = "502")]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(
        long,
        help = "Drop clients that stall a request or reply for longer than this many milliseconds"
    )]
    frame_timeout_ms: Option<u64>,

    #[arg(long, default_value = "0xFF", value_parser = maybe_hex::<u8>)]
    server_id: u8,

    #[clap(subcommand)]
    device: Option<DeviceImpl>,
}

/// Attempts to automatically find a GPIO chip
fn gpiochip_path() -> Option<PathBuf> {
    let p = PathBuf::from(DEFAULT_GPIOCHIP);
    if p.exists() { Some(p) } else { None }
}

/// SIGINT and SIGTERM are delivered through the returned descriptor instead of interrupting the process.
fn shutdown_signals() -> nix::Result<SignalFd> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()?;
    SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC)
}

fn serve(
    binding: impl HardwareBinding,
    builder: Builder,
    addr: SocketAddr,
    shutdown: &mut SignalFd,
) -> Result<(), Box<dyn Error>> {
    let mut server = builder.build(binding);
    let listener = TcpListener::bind(addr)?;
    log::info!("Server listening for connections on {}", addr);
    server.serve_until(listener, &*shutdown)?;

    match shutdown.read_signal() {
        Ok(Some(info)) => log::info!(
            "Received {}, releasing hardware",
            Signal::try_from(info.ssi_signo as i32)
                .map(Signal::as_str)
                .unwrap_or("signal")
        ),
        _ => log::info!("Releasing hardware"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting Modbus I/O server");

    let args = Args::parse();
    log::debug!("Parsed arguments: ip={}, port={}", args.ip, args.port);

    let mut builder = Builder::new().server_id(args.server_id);
    if let Some(timeout_ms) = args.frame_timeout_ms {
        builder = builder.frame_timeout(Duration::from_millis(timeout_ms));
    }
    log::debug!(
        "Server config: server_id=0x{:02X}, frame_timeout_ms={:?}",
        args.server_id,
        args.frame_timeout_ms
    );

    let addr = SocketAddr::new(args.ip, args.port);
    let mut shutdown = shutdown_signals()?;

    let device_impl = args.device.or_else(|| {
        let path = gpiochip_path()?;
        log::info!("Auto-detected GPIO chip at {}", path.display());
        Some(DeviceImpl::linux(BoardConfig {
            gpiochip: path,
            ..BoardConfig::default()
        }))
    });

    match device_impl {
        Some(DeviceImpl::Linux {
            gpiochip,
            pwmchip,
            iio_device,
            pwm_period_ns,
            discrete_lines,
            coil_lines,
            pwm_channels,
            analog_channels,
        }) => {
            if !gpiochip.exists() {
                println!(
                    "GPIO chip {} does not exist. Use modbus-io-bridge linux --gpiochip <path> to specify a GPIO chip.",
                    gpiochip.display()
                );
                return Ok(());
            }
            let config = BoardConfig {
                gpiochip,
                pwmchip,
                iio_device,
                pwm_period_ns,
                discrete_lines,
                coil_lines,
                pwm_channels,
                analog_channels,
            };
            log::info!("Initializing Linux board from {:?}", config);
            let board = LinuxBoard::new(&config)?;
            serve(board, builder, addr, &mut shutdown)?;
        }
        Some(DeviceImpl::Simulated) => {
            let counts = ChannelCounts {
                coils: DEFAULT_COIL_LINES.len(),
                discretes: DEFAULT_DISCRETE_LINES.len(),
                pwms: DEFAULT_PWM_CHANNELS.len(),
                analogs: DEFAULT_ANALOG_CHANNELS.len(),
            };
            log::info!("Initializing simulated board with {:?}", counts);
            serve(MemoryBoard::new(counts), builder, addr, &mut shutdown)?;
        }
        None => {
            println!(
                "No GPIO chip could be auto detected. Use modbus-io-bridge linux --gpiochip <path> or modbus-io-bridge simulated to manually specify a board."
            )
        }
    }
    log::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{Args, DeviceImpl};
    use crate::backends::board::BoardConfig;
    use clap::Parser;

    #[test]
    fn linux_defaults() {
        let args = Args::try_parse_from(["modbus-io-bridge", "linux"]).unwrap();
        assert_eq!(args.port, 502);
        assert_eq!(args.server_id, 0xFF);
        assert_eq!(args.device, Some(DeviceImpl::linux(BoardConfig::default())));
    }

    #[test]
    fn line_tables_and_period() {
        let args = Args::try_parse_from([
            "modbus-io-bridge",
            "--server-id",
            "0x11",
            "linux",
            "--coil-lines",
            "20,21",
            "--pwm-period-ns",
            "20000",
        ])
        .unwrap();
        assert_eq!(args.server_id, 0x11);
        let Some(DeviceImpl::Linux {
            coil_lines,
            pwm_period_ns,
            discrete_lines,
            ..
        }) = args.device
        else {
            panic!("Expected linux backend");
        };
        assert_eq!(coil_lines, vec![20, 21]);
        assert_eq!(pwm_period_ns, 20_000);
        assert_eq!(discrete_lines, vec![0, 1, 2, 4, 7]);
    }

    #[test]
    fn pwm_period_out_of_range() {
        assert!(
            Args::try_parse_from(["modbus-io-bridge", "linux", "--pwm-period-ns", "10"]).is_err()
        );
    }

    #[test]
    fn simulated_without_device() {
        let args =
            Args::try_parse_from(["modbus-io-bridge", "--frame-timeout-ms", "500", "simulated"])
                .unwrap();
        assert_eq!(args.frame_timeout_ms, Some(500));
        assert_eq!(args.device, Some(DeviceImpl::Simulated));
    }
}
