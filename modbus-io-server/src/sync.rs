//! Moves values between the register map and the hardware.
use std::io;

use modbus_io_protocol::{RegisterClass, mapping::RegisterMap};

use crate::HardwareBinding;

/// Factor between a duty cycle fraction and its holding register value.
pub const DUTY_SCALE: f64 = 1000.0;

/// Converts a duty cycle fraction to its register value.
/// The fractional part is truncated, values outside of the register domain saturate.
pub fn duty_to_register(duty: f64) -> u16 {
    (duty * DUTY_SCALE) as u16
}

/// Converts a register value to a duty cycle fraction. Inverse of [`duty_to_register`].
pub fn register_to_duty(value: u16) -> f64 {
    value as f64 / DUTY_SCALE
}

#[test]
fn duty_scaling() {
    assert_eq!(duty_to_register(0.5), 500);
    assert_eq!(duty_to_register(0.2999), 299);
    assert_eq!(duty_to_register(1.0), 1000);
    assert_eq!(duty_to_register(-0.1), 0);
    assert_eq!(register_to_duty(500), 0.5);
    assert_eq!(duty_to_register(register_to_duty(250)), 250);
}

/// Bidirectional glue between a [`RegisterMap`] and a [`HardwareBinding`].
///
/// Every call samples or writes every channel of the selected class,
/// regardless of whether the value changed.
pub struct Synchronizer<'a, T: ?Sized> {
    binding: &'a T,
}

/// Samples all channels first and only then overwrites the map, so that a failed
/// sample leaves the map with the values of the last successful pull.
fn refresh<V: Copy>(
    values: &mut [V],
    sample: impl FnMut(usize) -> io::Result<V>,
) -> io::Result<()> {
    let sampled = (0..values.len())
        .map(sample)
        .collect::<io::Result<Vec<V>>>()?;
    values.copy_from_slice(&sampled);
    Ok(())
}

/// Writes every value, even after a failure. Returns the first error.
fn apply<V: Copy>(
    values: &[V],
    mut write: impl FnMut(usize, V) -> io::Result<()>,
) -> io::Result<()> {
    let mut result = Ok(());
    for (index, value) in values.iter().enumerate() {
        if let Err(err) = write(index, *value) {
            log::error!("Writing channel {} failed: {}", index, err);
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

impl<'a, T: HardwareBinding + ?Sized> Synchronizer<'a, T> {
    pub fn new(binding: &'a T) -> Synchronizer<'a, T> {
        Synchronizer { binding }
    }

    /// Overwrite every entry of `class` in the map with a fresh sample from hardware.
    pub fn pull(&self, class: RegisterClass, map: &mut RegisterMap) -> io::Result<()> {
        log::debug!("Updating {} from hardware", class);
        match class {
            RegisterClass::Coils => refresh(map.coils_mut(), |i| self.binding.read_coil(i)),
            RegisterClass::Discretes => {
                refresh(map.discretes_mut(), |i| self.binding.read_discrete(i))
            }
            RegisterClass::HoldingRegisters => refresh(map.holding_registers_mut(), |i| {
                self.binding.read_pwm(i).map(duty_to_register)
            }),
            RegisterClass::InputRegisters => {
                refresh(map.input_registers_mut(), |i| self.binding.read_analog(i))
            }
        }
    }

    /// Write every entry of `class` from the map to hardware.
    ///
    /// Only coils and holding registers can be pushed, the input classes are read-only.
    pub fn push(&self, class: RegisterClass, map: &RegisterMap) -> io::Result<()> {
        log::debug!("Updating hardware from {}", class);
        match class {
            RegisterClass::Coils => apply(map.coils(), |i, value| self.binding.write_coil(i, value)),
            RegisterClass::HoldingRegisters => apply(map.holding_registers(), |i, value| {
                self.binding.write_pwm(i, register_to_duty(value))
            }),
            RegisterClass::Discretes | RegisterClass::InputRegisters => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Cannot write {} to hardware", class),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Synchronizer;
    use crate::{ChannelCounts, HardwareBinding, memory::MemoryBoard};
    use modbus_io_protocol::RegisterClass;

    fn board() -> MemoryBoard {
        MemoryBoard::new(ChannelCounts {
            coils: 5,
            discretes: 5,
            pwms: 4,
            analogs: 6,
        })
    }

    #[test]
    fn pull_samples_every_channel_of_the_class() {
        let board = board();
        let mut map = board.channel_counts().register_map();
        board.set_discrete(1, true);
        board.set_discrete(4, true);
        board.set_analog(5, 4095);

        let sync = Synchronizer::new(&board);
        sync.pull(RegisterClass::Discretes, &mut map).unwrap();
        assert_eq!(map.discretes(), &[false, true, false, false, true]);
        assert_eq!(map.input_registers(), &[0; 6]);

        sync.pull(RegisterClass::InputRegisters, &mut map).unwrap();
        assert_eq!(map.input_registers(), &[0, 0, 0, 0, 0, 4095]);
    }

    #[test]
    fn push_scales_holding_registers() {
        let board = board();
        let mut map = board.channel_counts().register_map();
        map.holding_registers_mut()[2] = 500;

        Synchronizer::new(&board)
            .push(RegisterClass::HoldingRegisters, &map)
            .unwrap();
        assert_eq!(board.pwm(2), 0.5);
        assert_eq!(board.pwm(0), 0.0);
        assert_eq!(board.pwm_writes(), 4);
    }

    #[test]
    fn pull_truncates_duty_cycle() {
        let board = board();
        let mut map = board.channel_counts().register_map();
        board.set_pwm(0, 0.5);
        board.set_pwm(1, 0.2999);

        Synchronizer::new(&board)
            .pull(RegisterClass::HoldingRegisters, &mut map)
            .unwrap();
        assert_eq!(map.holding_registers(), &[500, 299, 0, 0]);
    }

    #[test]
    fn pull_then_push_is_idempotent() {
        let board = board();
        board.set_coil(1, true);
        board.set_coil(3, true);
        board.set_pwm(0, 0.25);
        board.set_pwm(3, 1.0);
        let mut map = board.channel_counts().register_map();
        let sync = Synchronizer::new(&board);

        for class in [RegisterClass::Coils, RegisterClass::HoldingRegisters] {
            sync.pull(class, &mut map).unwrap();
            let pulled = map.clone();
            sync.push(class, &map).unwrap();
            sync.pull(class, &mut map).unwrap();
            assert_eq!(map, pulled);
        }
        assert_eq!(map.coils(), &[false, true, false, true, false]);
        assert_eq!(map.holding_registers(), &[250, 0, 0, 1000]);
    }

    #[test]
    fn failed_pull_leaves_map_untouched() {
        let board = board();
        let mut map = board.channel_counts().register_map();
        map.input_registers_mut()[0] = 17;
        board.set_analog(0, 99);
        board.set_failing(true);

        assert!(
            Synchronizer::new(&board)
                .pull(RegisterClass::InputRegisters, &mut map)
                .is_err()
        );
        assert_eq!(map.input_registers()[0], 17);
    }

    #[test]
    fn input_classes_cannot_be_pushed() {
        let board = board();
        let map = board.channel_counts().register_map();
        let sync = Synchronizer::new(&board);
        assert!(sync.push(RegisterClass::Discretes, &map).is_err());
        assert!(sync.push(RegisterClass::InputRegisters, &map).is_err());
    }
}
