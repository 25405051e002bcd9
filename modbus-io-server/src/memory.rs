//! # In-memory Board
//!
//! A [`HardwareBinding`] without hardware. Outputs keep what was last written to them,
//! inputs keep what was last set through the setters on [`MemoryBoard`].
//!
//! The board is cheap to clone and all clones share the same channels, so a test can keep
//! a handle while the server owns another one.
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{ChannelCounts, HardwareBinding};

#[derive(Debug)]
struct Channels {
    coils: Vec<bool>,
    discretes: Vec<bool>,
    pwms: Vec<f64>,
    analogs: Vec<u16>,
    coil_writes: usize,
    pwm_writes: usize,
    failing: bool,
}

/// Shared in-memory channel bank
#[derive(Clone, Debug)]
pub struct MemoryBoard {
    channels: Arc<Mutex<Channels>>,
}

fn channel<T: Copy>(values: &[T], index: usize, class: &str) -> io::Result<T> {
    values.get(index).copied().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No {} channel with index {}", class, index),
        )
    })
}

fn channel_mut<'a, T>(values: &'a mut [T], index: usize, class: &str) -> io::Result<&'a mut T> {
    values.get_mut(index).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("No {} channel with index {}", class, index),
        )
    })
}

impl MemoryBoard {
    pub fn new(counts: ChannelCounts) -> MemoryBoard {
        MemoryBoard {
            channels: Arc::new(Mutex::new(Channels {
                coils: vec![false; counts.coils],
                discretes: vec![false; counts.discretes],
                pwms: vec![0.0; counts.pwms],
                analogs: vec![0; counts.analogs],
                coil_writes: 0,
                pwm_writes: 0,
                failing: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failing(channels: &Channels) -> io::Result<()> {
        if channels.failing {
            Err(io::Error::other("Simulated hardware failure"))
        } else {
            Ok(())
        }
    }

    /// Set the level seen on a digital input.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid digital input.
    pub fn set_discrete(&self, index: usize, value: bool) {
        self.lock().discretes[index] = value;
    }

    /// Set the sample seen on an analog input.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid analog input.
    pub fn set_analog(&self, index: usize, value: u16) {
        self.lock().analogs[index] = value;
    }

    /// Change a digital output behind the server's back.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid digital output.
    pub fn set_coil(&self, index: usize, value: bool) {
        self.lock().coils[index] = value;
    }

    /// Change a pulse-width output behind the server's back.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid pulse-width output.
    pub fn set_pwm(&self, index: usize, duty: f64) {
        self.lock().pwms[index] = duty;
    }

    /// Current level of a digital output.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid digital output.
    pub fn coil(&self, index: usize) -> bool {
        self.lock().coils[index]
    }

    /// Current duty cycle of a pulse-width output.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid pulse-width output.
    pub fn pwm(&self, index: usize) -> f64 {
        self.lock().pwms[index]
    }

    /// Total number of digital output writes so far
    pub fn coil_writes(&self) -> usize {
        self.lock().coil_writes
    }

    /// Total number of pulse-width output writes so far
    pub fn pwm_writes(&self) -> usize {
        self.lock().pwm_writes
    }

    /// Let every subsequent read fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }
}

impl HardwareBinding for MemoryBoard {
    fn channel_counts(&self) -> ChannelCounts {
        let channels = self.lock();
        ChannelCounts {
            coils: channels.coils.len(),
            discretes: channels.discretes.len(),
            pwms: channels.pwms.len(),
            analogs: channels.analogs.len(),
        }
    }

    fn read_coil(&self, index: usize) -> io::Result<bool> {
        let channels = self.lock();
        Self::check_failing(&channels)?;
        channel(&channels.coils, index, "digital output")
    }

    fn write_coil(&self, index: usize, value: bool) -> io::Result<()> {
        let mut channels = self.lock();
        *channel_mut(&mut channels.coils, index, "digital output")? = value;
        channels.coil_writes += 1;
        Ok(())
    }

    fn read_discrete(&self, index: usize) -> io::Result<bool> {
        let channels = self.lock();
        Self::check_failing(&channels)?;
        channel(&channels.discretes, index, "digital input")
    }

    fn read_pwm(&self, index: usize) -> io::Result<f64> {
        let channels = self.lock();
        Self::check_failing(&channels)?;
        channel(&channels.pwms, index, "pulse-width output")
    }

    fn write_pwm(&self, index: usize, duty: f64) -> io::Result<()> {
        let mut channels = self.lock();
        *channel_mut(&mut channels.pwms, index, "pulse-width output")? = duty;
        channels.pwm_writes += 1;
        Ok(())
    }

    fn read_analog(&self, index: usize) -> io::Result<u16> {
        let channels = self.lock();
        Self::check_failing(&channels)?;
        channel(&channels.analogs, index, "analog input")
    }
}

#[cfg(test)]
mod test {
    use super::MemoryBoard;
    use crate::{ChannelCounts, HardwareBinding};

    fn board() -> MemoryBoard {
        MemoryBoard::new(ChannelCounts {
            coils: 5,
            discretes: 5,
            pwms: 4,
            analogs: 6,
        })
    }

    #[test]
    fn clones_share_channels() {
        let board = board();
        let handle = board.clone();
        board.write_coil(2, true).unwrap();
        assert!(handle.coil(2));
        assert_eq!(handle.coil_writes(), 1);
    }

    #[test]
    fn invalid_index() {
        let board = board();
        assert_eq!(
            board.read_analog(6).unwrap_err().kind(),
            std::io::ErrorKind::InvalidInput
        );
        assert!(board.write_pwm(4, 0.5).is_err());
    }

    #[test]
    fn failing_reads() {
        let board = board();
        board.set_failing(true);
        assert!(board.read_discrete(0).is_err());
        board.set_failing(false);
        assert!(board.read_discrete(0).is_ok());
    }
}
