//! # Modbus I/O Protocol Library
//!
//! This crate provides the protocol side of a Modbus TCP server that exposes
//! a fixed bank of I/O channels: framing, request decoding, reply construction
//! and the in-memory register map the replies are built from.
//!
//! ## Overview
//!
//! The crate knows nothing about hardware. A server reads a [`Frame`], classifies
//! it with [`Request::kind`], refreshes or pushes the [`mapping::RegisterMap`] as it
//! sees fit and lets [`Request::reply`] produce the [`Response`].
//!
//! ## Protocol Features
//!
//! - **Framing**: Modbus TCP with MBAP header (transaction id, protocol id 0, length, unit id)
//! - **Function codes**:
//!   - `0x01`..`0x04`: Read coils, discrete inputs, holding registers and input registers
//!   - `0x05`, `0x06`: Write single coil and single register
//!   - `0x0F`, `0x10`: Write multiple coils and multiple registers
//!   - `0x11`: Report server id
//!   - Anything else decodes to [`Request::Other`] and is answered with an
//!     `IllegalFunction` exception
//!
//! ## Basic Usage
//!
//! ### Answering a Request
//!
//! ```
//! use modbus_io_protocol::{Frame, Response, ResponseFrame, ServerIdentity};
//! use modbus_io_protocol::mapping::RegisterMap;
//! use std::io::Cursor;
//!
//! let mut map = RegisterMap::new(5, 5, 4, 6);
//! map.holding_registers_mut()[0] = 500;
//!
//! // Read one holding register at address 0
//! let raw = b"\x00\x01\x00\x00\x00\x06\x01\x03\x00\x00\x00\x01";
//! let frame = Frame::from_reader(&mut Cursor::new(raw)).expect("Frame should parse");
//! let response = frame.request.reply(&mut map, &ServerIdentity::default());
//! assert_eq!(response, Response::ReadHoldingRegisters(vec![500].into_boxed_slice()));
//!
//! let reply = ResponseFrame { header: frame.header, response };
//! let mut out = Vec::new();
//! reply.write_to(&mut out).expect("Writing to vector shouldn't fail");
//! assert_eq!(out, b"\x00\x01\x00\x00\x00\x05\x01\x03\x02\x01\xF4");
//! ```
//!
//! ### Writing a Request
//!
//! ```
//! use modbus_io_protocol::{Frame, Header, Request};
//!
//! let frame = Frame {
//!     header: Header { transaction_id: 1, unit_id: 1 },
//!     request: Request::WriteSingleRegister { address: 2, value: 750 },
//! };
//! assert_eq!(frame.to_bytes(), b"\x00\x01\x00\x00\x00\x06\x01\x06\x00\x02\x02\xEE");
//! ```
//!
//! ## Error Handling
//!
//! Reading a frame fails with [`error::ReadError`]. [`error::ReadError::Closed`] marks an
//! orderly end of stream between frames; every other variant marks a broken or
//! partially delivered frame. Requests that are well formed but cannot be served
//! (bad address, bad quantity, unknown function) are not errors, they are answered
//! with [`Response::Exception`].
//!
//! ## Async Support
//!
//! With the `tokio` feature, [`framed::ClientCodec`] implements the
//! `tokio_util::codec` traits for clients.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
#[cfg(feature = "tokio")]
pub mod framed;
pub mod mapping;
