//! # Modbus I/O Client
//!
//! An async client for Modbus TCP servers such as `modbus-io-bridge`.
//!
//! ## Overview
//!
//! The client sends one request at a time and waits for its reply. Every request carries
//! a fresh transaction id, replies with a different id are rejected. Exception replies
//! are returned as [`ClientError::Exception`].
//!
//! ## Supported Functions
//!
//! - **Read coils / discrete inputs**: digital outputs and inputs
//! - **Read holding / input registers**: pulse-width outputs (duty × 1000) and analog inputs
//! - **Write single / multiple coils and registers**
//! - **Report server id**
//!
//! ## Basic Usage
//!
//! ```ignore
//! use modbus_io_client::ModbusClient;
//!
//! let mut client = ModbusClient::connect("127.0.0.1:502").await?;
//!
//! // Switch on the third digital output
//! client.write_single_coil(2, true).await?;
//!
//! // Set the first pulse-width output to 50%
//! client.write_single_register(0, 500).await?;
//!
//! let analog = client.read_input_registers(0, 6).await?;
//! println!("Analog inputs: {:?}", analog);
//! ```
//!
//! ## Related Crates
//!
//! - [`modbus_io_protocol`] - Frame encoding and decoding
use std::{error::Error, fmt::Display, io};

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use modbus_io_protocol::{
    ExceptionCode, Frame, Header, Request, Response, ServerIdentity, error::ReadError,
    framed::ClientCodec,
};

#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    /// The reply could not be decoded, or the server closed the connection.
    Read(ReadError),
    /// The server answered with an exception.
    Exception(ExceptionCode),
    /// The reply does not belong to the request that was sent.
    UnexpectedResponse(Response),
    TransactionMismatch { expected: u16, received: u16 },
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Io(value)
    }
}

impl From<ReadError> for ClientError {
    fn from(value: ReadError) -> Self {
        ClientError::Read(value)
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "{}", err),
            ClientError::Read(err) => write!(f, "Invalid reply: {}", err),
            ClientError::Exception(code) => write!(f, "Server exception: {}", code),
            ClientError::UnexpectedResponse(response) => {
                write!(f, "Unexpected reply: {:?}", response)
            }
            ClientError::TransactionMismatch { expected, received } => write!(
                f,
                "Expected reply to transaction {}, received {}",
                expected, received
            ),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Io(err) => Some(err),
            ClientError::Read(err) => Some(err),
            _ => None,
        }
    }
}

/// Modbus TCP client connection.
pub struct ModbusClient {
    framed: Framed<TcpStream, ClientCodec>,
    transaction_id: u16,
    unit_id: u8,
}

fn truncated<T>(values: Box<[T]>, quantity: u16) -> Vec<T> {
    let mut values = values.into_vec();
    values.truncate(quantity as usize);
    values
}

impl ModbusClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<ModbusClient> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(ModbusClient::new(stream))
    }

    pub fn new(stream: TcpStream) -> ModbusClient {
        ModbusClient {
            framed: Framed::new(stream, ClientCodec),
            transaction_id: 0,
            unit_id: 1,
        }
    }

    /// Set the unit id sent with every subsequent request.
    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    /// Bytes that were received but not yet decoded.
    pub fn read_buffer(&self) -> &BytesMut {
        self.framed.read_buffer()
    }

    /// Send a request and wait for its reply.
    ///
    /// Exception replies are returned as [`ClientError::Exception`].
    pub async fn call(&mut self, request: Request) -> Result<Response, ClientError> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let header = Header {
            transaction_id: self.transaction_id,
            unit_id: self.unit_id,
        };
        self.framed.send(Frame { header, request }).await?;

        let reply = self
            .framed
            .next()
            .await
            .ok_or(ClientError::Read(ReadError::Closed))??;
        if reply.header.transaction_id != header.transaction_id {
            return Err(ClientError::TransactionMismatch {
                expected: header.transaction_id,
                received: reply.header.transaction_id,
            });
        }
        match reply.response {
            Response::Exception { code, .. } => Err(ClientError::Exception(code)),
            response => Ok(response),
        }
    }

    pub async fn read_coils(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        match self.call(Request::ReadCoils { address, quantity }).await? {
            Response::ReadCoils(bits) => Ok(truncated(bits, quantity)),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        match self
            .call(Request::ReadDiscreteInputs { address, quantity })
            .await?
        {
            Response::ReadDiscreteInputs(bits) => Ok(truncated(bits, quantity)),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        match self
            .call(Request::ReadHoldingRegisters { address, quantity })
            .await?
        {
            Response::ReadHoldingRegisters(registers) => Ok(truncated(registers, quantity)),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        match self
            .call(Request::ReadInputRegisters { address, quantity })
            .await?
        {
            Response::ReadInputRegisters(registers) => Ok(truncated(registers, quantity)),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn write_single_coil(
        &mut self,
        address: u16,
        value: bool,
    ) -> Result<(), ClientError> {
        let request = Request::WriteSingleCoil { address, value };
        match self.call(request).await? {
            Response::WriteSingleCoil {
                address: echoed,
                value: echoed_value,
            } if echoed == address && echoed_value == value => Ok(()),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), ClientError> {
        let request = Request::WriteSingleRegister { address, value };
        match self.call(request).await? {
            Response::WriteSingleRegister {
                address: echoed,
                value: echoed_value,
            } if echoed == address && echoed_value == value => Ok(()),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn write_multiple_coils(
        &mut self,
        address: u16,
        values: &[bool],
    ) -> Result<(), ClientError> {
        let request = Request::WriteMultipleCoils {
            address,
            values: values.into(),
        };
        match self.call(request).await? {
            Response::WriteMultipleCoils {
                address: echoed,
                quantity,
            } if echoed == address && quantity as usize == values.len() => Ok(()),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    pub async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ClientError> {
        let request = Request::WriteMultipleRegisters {
            address,
            values: values.into(),
        };
        match self.call(request).await? {
            Response::WriteMultipleRegisters {
                address: echoed,
                quantity,
            } if echoed == address && quantity as usize == values.len() => Ok(()),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    /// Query the id and identification text of the server.
    pub async fn report_server_id(&mut self) -> Result<ServerIdentity, ClientError> {
        match self.call(Request::ReportServerId).await? {
            Response::ReportServerId {
                server_id,
                identification,
                ..
            } => Ok(ServerIdentity::new(server_id, identification)),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }
}
