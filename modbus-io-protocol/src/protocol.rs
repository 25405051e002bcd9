use std::fmt::Display;

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const FC_REPORT_SERVER_ID: u8 = 0x11;

/// Set on the function code of a response that carries an exception.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Maximum number of bits a single read request may address.
pub const MAX_READ_BITS: u16 = 2000;
/// Maximum number of registers a single read request may address.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Maximum number of coils a single write request may carry.
pub const MAX_WRITE_BITS: u16 = 1968;
/// Maximum number of registers a single write request may carry.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// The four register classes of the data model.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegisterClass {
    /// Commandable binary outputs.
    Coils,
    /// Read-only binary inputs.
    Discretes,
    /// Commandable 16 bit outputs.
    HoldingRegisters,
    /// Read-only 16 bit inputs.
    InputRegisters,
}

impl Display for RegisterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterClass::Coils => write!(f, "coils"),
            RegisterClass::Discretes => write!(f, "discrete inputs"),
            RegisterClass::HoldingRegisters => write!(f, "holding registers"),
            RegisterClass::InputRegisters => write!(f, "input registers"),
        }
    }
}

/// The classified intent of a request.
///
/// Only the eight read and write kinds have an effect on hardware synchronization,
/// everything else the codec understands (or rejects) is folded into [`OperationKind::Other`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperationKind {
    ReadCoils,
    ReadDiscretes,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteMultipleCoils,
    WriteSingleRegister,
    WriteMultipleRegisters,
    Other,
}

impl OperationKind {
    /// The register class that must be refreshed from hardware before the reply is built.
    pub fn pulls(&self) -> Option<RegisterClass> {
        match self {
            OperationKind::ReadCoils => Some(RegisterClass::Coils),
            OperationKind::ReadDiscretes => Some(RegisterClass::Discretes),
            OperationKind::ReadHoldingRegisters => Some(RegisterClass::HoldingRegisters),
            OperationKind::ReadInputRegisters => Some(RegisterClass::InputRegisters),
            _ => None,
        }
    }

    /// The register class that must be pushed to hardware after the reply was sent.
    pub fn pushes(&self) -> Option<RegisterClass> {
        match self {
            OperationKind::WriteSingleCoil | OperationKind::WriteMultipleCoils => {
                Some(RegisterClass::Coils)
            }
            OperationKind::WriteSingleRegister | OperationKind::WriteMultipleRegisters => {
                Some(RegisterClass::HoldingRegisters)
            }
            _ => None,
        }
    }
}

#[test]
fn reads_pull_and_writes_push() {
    assert_eq!(
        OperationKind::ReadHoldingRegisters.pulls(),
        Some(RegisterClass::HoldingRegisters)
    );
    assert_eq!(OperationKind::ReadHoldingRegisters.pushes(), None);
    assert_eq!(
        OperationKind::WriteSingleCoil.pushes(),
        Some(RegisterClass::Coils)
    );
    assert_eq!(OperationKind::WriteSingleCoil.pulls(), None);
    assert_eq!(OperationKind::Other.pulls(), None);
    assert_eq!(OperationKind::Other.pushes(), None);
}

/// Exception codes returned in place of a regular response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    /// Any code this crate does not produce itself.
    Unknown(u8),
}

impl ExceptionCode {
    pub fn code(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Unknown(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> ExceptionCode {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            other => ExceptionCode::Unknown(other),
        }
    }
}

impl Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => write!(f, "Illegal function"),
            ExceptionCode::IllegalDataAddress => write!(f, "Illegal data address"),
            ExceptionCode::IllegalDataValue => write!(f, "Illegal data value"),
            ExceptionCode::ServerDeviceFailure => write!(f, "Server device failure"),
            ExceptionCode::Unknown(code) => write!(f, "Exception 0x{:02x}", code),
        }
    }
}

/// The addressing part of the MBAP header that a reply has to echo.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub transaction_id: u16,
    pub unit_id: u8,
}

/// A request sent from a client to the server.
/// Addresses are zero based and refer to the index inside the addressed register class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Box<[bool]> },
    WriteMultipleRegisters { address: u16, values: Box<[u16]> },
    /// Asks the server to identify itself.
    ReportServerId,
    /// A function code this crate has no decoder for. The raw payload is kept as received.
    Other { function: u8, data: Box<[u8]> },
}

impl Request {
    /// The function code of this request on the wire.
    pub fn function(&self) -> u8 {
        match self {
            Request::ReadCoils { .. } => FC_READ_COILS,
            Request::ReadDiscreteInputs { .. } => FC_READ_DISCRETE_INPUTS,
            Request::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            Request::ReadInputRegisters { .. } => FC_READ_INPUT_REGISTERS,
            Request::WriteSingleCoil { .. } => FC_WRITE_SINGLE_COIL,
            Request::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
            Request::WriteMultipleCoils { .. } => FC_WRITE_MULTIPLE_COILS,
            Request::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
            Request::ReportServerId => FC_REPORT_SERVER_ID,
            Request::Other { function, .. } => *function,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Request::ReadCoils { .. } => OperationKind::ReadCoils,
            Request::ReadDiscreteInputs { .. } => OperationKind::ReadDiscretes,
            Request::ReadHoldingRegisters { .. } => OperationKind::ReadHoldingRegisters,
            Request::ReadInputRegisters { .. } => OperationKind::ReadInputRegisters,
            Request::WriteSingleCoil { .. } => OperationKind::WriteSingleCoil,
            Request::WriteSingleRegister { .. } => OperationKind::WriteSingleRegister,
            Request::WriteMultipleCoils { .. } => OperationKind::WriteMultipleCoils,
            Request::WriteMultipleRegisters { .. } => OperationKind::WriteMultipleRegisters,
            Request::ReportServerId | Request::Other { .. } => OperationKind::Other,
        }
    }
}

/// A single request together with its MBAP addressing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub request: Request,
}

/// A response sent from the server to a client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Coil states. When decoded from the wire, the length is rounded up to whole bytes.
    ReadCoils(Box<[bool]>),
    /// Discrete input states. When decoded from the wire, the length is rounded up to whole bytes.
    ReadDiscreteInputs(Box<[bool]>),
    ReadHoldingRegisters(Box<[u16]>),
    ReadInputRegisters(Box<[u16]>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
    ReportServerId {
        server_id: u8,
        running: bool,
        identification: Box<[u8]>,
    },
    Exception { function: u8, code: ExceptionCode },
}

impl Response {
    /// The function code of this response on the wire, including the exception flag.
    pub fn function(&self) -> u8 {
        match self {
            Response::ReadCoils(_) => FC_READ_COILS,
            Response::ReadDiscreteInputs(_) => FC_READ_DISCRETE_INPUTS,
            Response::ReadHoldingRegisters(_) => FC_READ_HOLDING_REGISTERS,
            Response::ReadInputRegisters(_) => FC_READ_INPUT_REGISTERS,
            Response::WriteSingleCoil { .. } => FC_WRITE_SINGLE_COIL,
            Response::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
            Response::WriteMultipleCoils { .. } => FC_WRITE_MULTIPLE_COILS,
            Response::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
            Response::ReportServerId { .. } => FC_REPORT_SERVER_ID,
            Response::Exception { function, .. } => function | EXCEPTION_FLAG,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Response::Exception { .. })
    }
}

/// A response together with the MBAP addressing of the request it answers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseFrame {
    pub header: Header,
    pub response: Response,
}

/// Identity reported to clients through [`Request::ReportServerId`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerIdentity {
    server_id: u8,
    identification: Box<[u8]>,
}

impl ServerIdentity {
    pub fn new(server_id: u8, identification: impl Into<Box<[u8]>>) -> ServerIdentity {
        ServerIdentity {
            server_id,
            identification: identification.into(),
        }
    }

    pub fn server_id(&self) -> u8 {
        self.server_id
    }

    pub fn identification(&self) -> &[u8] {
        &self.identification
    }
}

impl Default for ServerIdentity {
    fn default() -> Self {
        ServerIdentity::new(
            0xFF,
            concat!("modbus-io ", env!("CARGO_PKG_VERSION")).as_bytes(),
        )
    }
}
