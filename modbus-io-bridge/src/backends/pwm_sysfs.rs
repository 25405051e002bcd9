//! # Sysfs PWM
//!
//! Pulse-width outputs of `/sys/class/pwm/pwmchipN`. A channel is exported and enabled
//! with a fixed period when it is opened, the duty cycle is the only thing that changes
//! afterwards.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Converts a duty cycle fraction to nanoseconds of `period_ns`. The fraction is clamped to 0.0..=1.0.
pub fn duty_cycle_ns(fraction: f64, period_ns: u64) -> u64 {
    (fraction.clamp(0.0, 1.0) * period_ns as f64).round() as u64
}

fn read_attr(path: &Path) -> io::Result<u64> {
    let text = fs::read_to_string(path)?;
    text.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unexpected content {:?} in {}", text.trim(), path.display()),
        )
    })
}

/// An exported PWM channel. Disabled and unexported on drop.
#[derive(Debug)]
pub struct PwmChannel {
    chip: PathBuf,
    channel: u32,
    dir: PathBuf,
    period_ns: u64,
}

impl PwmChannel {
    /// # Arguments
    ///
    /// * `chip` - The chip directory, e.g. `/sys/class/pwm/pwmchip0`
    /// * `channel` - Channel number within the chip
    /// * `period_ns` - Period that is programmed before the channel is enabled
    pub fn export(chip: impl AsRef<Path>, channel: u32, period_ns: u64) -> io::Result<PwmChannel> {
        let chip = chip.as_ref().to_owned();
        let dir = chip.join(format!("pwm{}", channel));
        if !dir.exists() {
            log::debug!("Exporting PWM channel {} of {}", channel, chip.display());
            fs::write(chip.join("export"), channel.to_string())?;
        }
        let pwm = PwmChannel {
            chip,
            channel,
            dir,
            period_ns,
        };
        // The duty cycle may never exceed the period, so it is reset first
        pwm.write_attr("duty_cycle", 0)?;
        pwm.write_attr("period", period_ns)?;
        pwm.write_attr("enable", 1)?;
        log::debug!(
            "Enabled PWM channel {} with a period of {}ns",
            channel,
            period_ns
        );
        Ok(pwm)
    }

    fn write_attr(&self, name: &str, value: u64) -> io::Result<()> {
        fs::write(self.dir.join(name), value.to_string())
    }

    /// The current duty cycle as fraction of the period
    pub fn duty(&self) -> io::Result<f64> {
        let duty_ns = read_attr(&self.dir.join("duty_cycle"))?;
        Ok(duty_ns as f64 / self.period_ns as f64)
    }

    pub fn set_duty(&self, fraction: f64) -> io::Result<()> {
        self.write_attr("duty_cycle", duty_cycle_ns(fraction, self.period_ns))
    }
}

impl Drop for PwmChannel {
    fn drop(&mut self) {
        if let Err(err) = self.write_attr("enable", 0) {
            log::warn!("Failed to disable PWM channel {}: {}", self.channel, err);
        }
        if let Err(err) = fs::write(self.chip.join("unexport"), self.channel.to_string()) {
            log::warn!("Failed to unexport PWM channel {}: {}", self.channel, err);
        }
    }
}
