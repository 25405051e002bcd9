//! # Linux Board
//!
//! Combines GPIO lines, sysfs PWM channels and IIO inputs into a single
//! [`HardwareBinding`]. Channels are acquired in [`LinuxBoard::new`] and released
//! when the board is dropped.
//!
//! ## Example Usage
//!
//! ```ignore
//! use modbus_io_server::server::{Server, Config};
//!
//! let board = LinuxBoard::new(&BoardConfig::default())?;
//! let mut server = Server::new(board, Config::default());
//! server.listen("0.0.0.0:502")?;
//! ```
use std::{io, path::PathBuf};

use modbus_io_server::{ChannelCounts, HardwareBinding};

use super::{
    gpio_cdev::{Direction, GpioChip, GpioLine},
    iio::AnalogInput,
    pwm_sysfs::PwmChannel,
};

pub const DEFAULT_GPIOCHIP: &str = "/dev/gpiochip0";
pub const DEFAULT_PWMCHIP: &str = "/sys/class/pwm/pwmchip0";
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";
pub const DEFAULT_PWM_PERIOD_NS: u64 = 1_000_000;

pub const DEFAULT_DISCRETE_LINES: [u32; 5] = [0, 1, 2, 4, 7];
pub const DEFAULT_COIL_LINES: [u32; 5] = [8, 10, 11, 12, 13];
pub const DEFAULT_PWM_CHANNELS: [u32; 4] = [3, 5, 6, 9];
pub const DEFAULT_ANALOG_CHANNELS: [u32; 6] = [0, 1, 2, 3, 4, 5];

const CONSUMER: &str = "modbus-io";

/// Where the channels of a [`LinuxBoard`] are found.
///
/// The position of a pin in one of the tables is the logical channel index,
/// the value is the line or channel number of the device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoardConfig {
    pub gpiochip: PathBuf,
    pub pwmchip: PathBuf,
    pub iio_device: PathBuf,
    pub pwm_period_ns: u64,
    pub discrete_lines: Vec<u32>,
    pub coil_lines: Vec<u32>,
    pub pwm_channels: Vec<u32>,
    pub analog_channels: Vec<u32>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            gpiochip: PathBuf::from(DEFAULT_GPIOCHIP),
            pwmchip: PathBuf::from(DEFAULT_PWMCHIP),
            iio_device: PathBuf::from(DEFAULT_IIO_DEVICE),
            pwm_period_ns: DEFAULT_PWM_PERIOD_NS,
            discrete_lines: DEFAULT_DISCRETE_LINES.to_vec(),
            coil_lines: DEFAULT_COIL_LINES.to_vec(),
            pwm_channels: DEFAULT_PWM_CHANNELS.to_vec(),
            analog_channels: DEFAULT_ANALOG_CHANNELS.to_vec(),
        }
    }
}

fn init_error(class: &str, index: usize, pin: u32, err: io::Error) -> io::Error {
    io::Error::new(
        err.kind(),
        format!(
            "Failed to initialize {} {} on pin {}: {}",
            class, index, pin, err
        ),
    )
}

/// Acquires one channel per pin and stops at the first failure.
/// Channels acquired before the failure are released again.
fn acquire<T>(
    class: &str,
    pins: &[u32],
    mut open: impl FnMut(u32) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    pins.iter()
        .enumerate()
        .map(|(index, &pin)| open(pin).map_err(|err| init_error(class, index, pin, err)))
        .collect()
}

fn channel<'a, T>(channels: &'a [T], index: usize, class: &str) -> io::Result<&'a T> {
    channels.get(index).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No {} channel with index {}", class, index),
        )
    })
}

/// Hardware binding for a Linux board with GPIO, PWM and IIO drivers.
#[derive(Debug)]
pub struct LinuxBoard {
    discretes: Vec<GpioLine>,
    coils: Vec<GpioLine>,
    pwms: Vec<PwmChannel>,
    analogs: Vec<AnalogInput>,
}

impl LinuxBoard {
    pub fn new(config: &BoardConfig) -> io::Result<LinuxBoard> {
        let chip = GpioChip::open(&config.gpiochip)?;
        let discretes = acquire("digital input", &config.discrete_lines, |line| {
            chip.request_line(line, Direction::Input, CONSUMER)
        })?;
        let coils = acquire("digital output", &config.coil_lines, |line| {
            chip.request_line(line, Direction::Output, CONSUMER)
        })?;
        let pwms = acquire("pulse-width output", &config.pwm_channels, |channel| {
            PwmChannel::export(&config.pwmchip, channel, config.pwm_period_ns)
        })?;
        let analogs = acquire("analog input", &config.analog_channels, |channel| {
            AnalogInput::open(&config.iio_device, channel)
        })?;

        log::info!(
            "Initialized {} digital inputs and {} digital outputs on {}, {} pulse-width outputs, {} analog inputs",
            discretes.len(),
            coils.len(),
            chip.path().display(),
            pwms.len(),
            analogs.len()
        );
        Ok(LinuxBoard {
            discretes,
            coils,
            pwms,
            analogs,
        })
    }
}

impl HardwareBinding for LinuxBoard {
    fn channel_counts(&self) -> ChannelCounts {
        ChannelCounts {
            coils: self.coils.len(),
            discretes: self.discretes.len(),
            pwms: self.pwms.len(),
            analogs: self.analogs.len(),
        }
    }

    fn read_coil(&self, index: usize) -> io::Result<bool> {
        channel(&self.coils, index, "digital output")?.value()
    }

    fn write_coil(&self, index: usize, value: bool) -> io::Result<()> {
        channel(&self.coils, index, "digital output")?.set_value(value)
    }

    fn read_discrete(&self, index: usize) -> io::Result<bool> {
        channel(&self.discretes, index, "digital input")?.value()
    }

    fn read_pwm(&self, index: usize) -> io::Result<f64> {
        channel(&self.pwms, index, "pulse-width output")?.duty()
    }

    fn write_pwm(&self, index: usize, duty: f64) -> io::Result<()> {
        channel(&self.pwms, index, "pulse-width output")?.set_duty(duty)
    }

    fn read_analog(&self, index: usize) -> io::Result<u16> {
        channel(&self.analogs, index, "analog input")?.read()
    }
}

#[cfg(test)]
mod test {
    use super::{BoardConfig, LinuxBoard, acquire};
    use std::io;

    #[test]
    fn acquire_names_failing_channel() {
        let err = acquire("pulse-width output", &[3, 5, 6], |pin| {
            if pin == 6 {
                Err(io::Error::from(io::ErrorKind::NotFound))
            } else {
                Ok(pin)
            }
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let message = err.to_string();
        assert!(message.contains("pulse-width output 2 on pin 6"), "{}", message);
    }

    #[test]
    fn acquire_keeps_table_order() {
        let lines = acquire("digital input", &[7, 0, 4], Ok).unwrap();
        assert_eq!(lines, vec![7, 0, 4]);
    }

    #[test]
    fn missing_gpio_chip() {
        let config = BoardConfig {
            gpiochip: "/nonexistent/gpiochip".into(),
            ..BoardConfig::default()
        };
        assert!(LinuxBoard::new(&config).is_err());
    }
}
