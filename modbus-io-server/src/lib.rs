//! # Modbus I/O Server Library
//!
//! This crate exposes a fixed bank of physical I/O channels (digital inputs, digital
//! outputs, pulse-width outputs and analog inputs) to Modbus TCP clients.
//!
//! ## Architecture
//!
//! The crate is built around these components:
//!
//! - **[`HardwareBinding`] Trait**: Defines the interface that hardware backends must
//!   implement. It maps logical channel indices to physical I/O.
//! - **[`sync::Synchronizer`]**: The only code path that moves values between the
//!   [`RegisterMap`] and the hardware.
//! - **[`dispatch::Dispatcher`]**: Reads one request from a connection, decides when
//!   to synchronize and sends exactly one reply.
//! - **[`mux::Multiplexer`]**: Owns the listening socket and all client connections and
//!   polls them for readiness on a single thread.
//! - **[`server::Server`]**: Ties the above together.
//!
//! ## How It Works
//!
//! 1. A backend (e.g. GPIO and PWM drivers, or [`memory::MemoryBoard`]) implements [`HardwareBinding`]
//! 2. The backend is wrapped in a [`server::Server`], which sizes the register map from
//!    [`HardwareBinding::channel_counts`]
//! 3. The server polls the listener and all connections and services every ready handle
//!    once per cycle, in ascending handle order
//! 4. Read requests refresh the addressed register class from hardware before the reply
//!    is built, write requests push the written class to hardware after the reply was sent
//!
//! ## Basic Usage
//!
//! ```no_run
//! use modbus_io_server::{ChannelCounts, memory::MemoryBoard, server::{Config, Server}};
//!
//! let board = MemoryBoard::new(ChannelCounts { coils: 5, discretes: 5, pwms: 4, analogs: 6 });
//! let mut server = Server::new(board, Config::default());
//! server.listen("0.0.0.0:502")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Register Mapping
//!
//! | Register class    | Channel class       | Value domain                                  |
//! |-------------------|---------------------|-----------------------------------------------|
//! | Coils             | Digital outputs     | `bool`                                        |
//! | Discrete inputs   | Digital inputs      | `bool`                                        |
//! | Holding registers | Pulse-width outputs | duty cycle fraction × 1000, truncated         |
//! | Input registers   | Analog inputs       | raw sample                                    |
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Connections are logged at `info`,
//! requests and synchronization at `debug` and request contents at `trace`.
//!
//! ## Thread Model
//!
//! Everything runs on the thread that calls [`server::Server::listen`]. A request is
//! processed to completion (read, pull, reply, push) before the next handle is serviced,
//! so no reply can observe a register map that another request modified half way.
use std::io;

pub use modbus_io_protocol::mapping::RegisterMap;

pub mod dispatch;
pub mod memory;
pub mod mux;
pub mod server;
pub mod sync;

/// Number of channels per class that a [`HardwareBinding`] provides.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelCounts {
    /// Digital outputs, exposed as coils
    pub coils: usize,
    /// Digital inputs, exposed as discrete inputs
    pub discretes: usize,
    /// Pulse-width outputs, exposed as holding registers
    pub pwms: usize,
    /// Analog inputs, exposed as input registers
    pub analogs: usize,
}

impl ChannelCounts {
    /// Creates a register map whose arrays match these counts exactly.
    pub fn register_map(&self) -> RegisterMap {
        RegisterMap::new(self.coils, self.discretes, self.pwms, self.analogs)
    }
}

/// Trait that hardware backends must implement to expose their channels.
///
/// Channels are addressed by their logical index within a class, starting at 0.
/// The channel table behind these indices must not change while the server runs.
/// Backends acquire their channels when they are constructed; a backend that cannot
/// acquire all of its channels must fail construction instead of returning a partial binding.
pub trait HardwareBinding {
    /// The number of channels per class. Must stay constant for the lifetime of the binding.
    fn channel_counts(&self) -> ChannelCounts;

    /// Read back the current level of a digital output.
    fn read_coil(&self, index: usize) -> io::Result<bool>;

    /// Drive a digital output.
    fn write_coil(&self, index: usize, value: bool) -> io::Result<()>;

    /// Sample a digital input.
    fn read_discrete(&self, index: usize) -> io::Result<bool>;

    /// Read back the duty cycle of a pulse-width output as fraction between 0.0 and 1.0.
    fn read_pwm(&self, index: usize) -> io::Result<f64>;

    /// Set the duty cycle of a pulse-width output.
    ///
    /// # Arguments
    ///
    /// * `index` - The logical channel index
    /// * `duty` - Duty cycle as fraction. Values outside of 0.0 to 1.0 may be clamped by the backend.
    fn write_pwm(&self, index: usize, duty: f64) -> io::Result<()>;

    /// Sample an analog input. The value is the raw magnitude reported by the converter.
    fn read_analog(&self, index: usize) -> io::Result<u16>;
}
