pub mod board;
pub mod gpio_cdev;
pub mod iio;
pub mod pwm_sysfs;

/// A directory below the system temp dir that is unique to the test process.
#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("modbus-io-{}-{}", name, std::process::id()))
}
