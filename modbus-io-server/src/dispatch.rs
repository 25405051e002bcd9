//! Turns one request on a connection into exactly one reply.
use std::io::{Read, Write};

use modbus_io_protocol::{
    ExceptionCode, Frame, Response, ResponseFrame, ServerIdentity, error::ReadError,
    mapping::RegisterMap,
};

use crate::{HardwareBinding, sync::Synchronizer};

/// What the connection should do after a request was handled.
#[derive(Debug)]
pub enum Outcome {
    /// A reply was sent, the connection stays open.
    Continue,
    /// The peer closed the connection in between two requests.
    Closed,
    /// The request could not be read or the reply could not be sent.
    ///
    /// Failures to send the reply are carried as [`ReadError::IoError`].
    Error(ReadError),
}

/// Serves requests against a register map that is kept in sync with hardware.
///
/// The dispatcher is the only component that decides when synchronization happens:
/// - read requests refresh the addressed register class before the reply is built
/// - write requests push the written register class after the reply was sent
/// - everything else is answered from the map without touching hardware
pub struct Dispatcher<'a, T: ?Sized> {
    map: &'a mut RegisterMap,
    sync: Synchronizer<'a, T>,
    identity: &'a ServerIdentity,
}

impl<'a, T: HardwareBinding + ?Sized> Dispatcher<'a, T> {
    pub fn new(
        map: &'a mut RegisterMap,
        binding: &'a T,
        identity: &'a ServerIdentity,
    ) -> Dispatcher<'a, T> {
        Dispatcher {
            map,
            sync: Synchronizer::new(binding),
            identity,
        }
    }

    /// The register map as seen by the last reply.
    pub fn register_map(&self) -> &RegisterMap {
        self.map
    }

    /// Read exactly one request from `stream`, reply to it and synchronize around the reply.
    pub fn handle_request<S: Read + Write>(&mut self, stream: &mut S) -> Outcome {
        let frame = match Frame::from_reader(stream) {
            Ok(frame) => frame,
            Err(ReadError::Closed) => return Outcome::Closed,
            Err(err) => return Outcome::Error(err),
        };

        let kind = frame.request.kind();
        log::debug!(
            "Received {:?} request: transaction_id={}, unit_id={}",
            kind,
            frame.header.transaction_id,
            frame.header.unit_id
        );
        log::trace!("Request: {:?}", frame.request);

        let pulled = match kind.pulls() {
            Some(class) => self.sync.pull(class, self.map),
            None => Ok(()),
        };
        // A write that never reaches the client must not stay in the map
        let snapshot = kind.pushes().map(|_| self.map.clone());

        let response = match pulled {
            Ok(()) => frame.request.reply(self.map, self.identity),
            Err(err) => {
                log::error!("Failed to refresh register map for {:?}: {}", kind, err);
                Response::Exception {
                    function: frame.request.function(),
                    code: ExceptionCode::ServerDeviceFailure,
                }
            }
        };
        log::trace!("Response: {:?}", response);

        let reply = ResponseFrame {
            header: frame.header,
            response,
        };
        if let Err(err) = reply.write_to(stream) {
            if let Some(snapshot) = snapshot {
                *self.map = snapshot;
            }
            return Outcome::Error(err.into());
        }

        if let Some(class) = kind.pushes() {
            if let Err(err) = self.sync.push(class, self.map) {
                log::error!("Failed to update hardware from {}: {}", class, err);
            }
        }
        Outcome::Continue
    }
}
