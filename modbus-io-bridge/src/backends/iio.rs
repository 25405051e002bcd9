//! # IIO Analog Inputs
//!
//! Raw samples of an industrial I/O device, read from
//! `/sys/bus/iio/devices/iio:deviceN/in_voltageM_raw`.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

fn parse_raw(text: &str) -> io::Result<u16> {
    text.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Not a raw sample: {:?}", text.trim()),
        )
    })
}

#[derive(Debug)]
pub struct AnalogInput {
    path: PathBuf,
}

impl AnalogInput {
    /// Opens a voltage channel of an IIO device and takes one sample to make sure it works.
    pub fn open(device: impl AsRef<Path>, channel: u32) -> io::Result<AnalogInput> {
        let path = device
            .as_ref()
            .join(format!("in_voltage{}_raw", channel));
        let input = AnalogInput { path };
        let sample = input.read()?;
        log::debug!("{}: initial sample {}", input.path.display(), sample);
        Ok(input)
    }

    pub fn read(&self) -> io::Result<u16> {
        parse_raw(&fs::read_to_string(&self.path)?)
    }
}
