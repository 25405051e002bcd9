/// Read and write implementations for frames and PDUs
use std::io::{self, ErrorKind, Read, Write};

use crate::{
    error::ReadError,
    protocol::{
        EXCEPTION_FLAG, ExceptionCode, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
        FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_REPORT_SERVER_ID,
        FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
        FC_WRITE_SINGLE_REGISTER, Frame, Header, Request, Response, ResponseFrame,
    },
};

/// Length of the MBAP header, unit id included.
pub const HEADER_LEN: usize = 7;
/// Largest PDU a single frame may carry.
pub const MAX_PDU_LEN: usize = 253;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

impl Header {
    /// Parses an MBAP header and returns it together with the length of the PDU that follows.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<(Header, usize), ReadError> {
        let transaction_id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let protocol_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        let length = u16::from_be_bytes([bytes[4], bytes[5]]);

        if protocol_id != 0 {
            return Err(ReadError::InvalidProtocolId(protocol_id));
        }
        // The length covers the unit id and at least a function code
        if length < 2 || length as usize > MAX_PDU_LEN + 1 {
            return Err(ReadError::InvalidLength(length));
        }

        let header = Header {
            transaction_id,
            unit_id: bytes[6],
        };
        Ok((header, length as usize - 1))
    }

    fn encode(&self, pdu: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + pdu.len());
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&0_u16.to_be_bytes());
        out.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        out.push(self.unit_id);
        out.extend_from_slice(pdu);
        out
    }
}

fn read_frame(reader: &mut impl Read) -> Result<(Header, Vec<u8>), ReadError> {
    let mut header = [0u8; HEADER_LEN];
    // A clean end of stream is only possible in between two frames
    loop {
        match reader.read(&mut header[..1]) {
            Ok(0) => return Err(ReadError::Closed),
            Ok(_) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    reader.read_exact(&mut header[1..])?;
    let (header, pdu_len) = Header::parse(&header)?;

    let mut pdu = vec![0u8; pdu_len];
    reader.read_exact(&mut pdu)?;
    Ok((header, pdu))
}

/// Packs bits LSB first, the first bit ending up in the lowest bit of the first byte.
pub(crate) fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
        bytes[i / 8] |= 1 << (i % 8);
    }
    bytes
}

pub(crate) fn unpack_bits(bytes: &[u8], count: usize) -> Box<[bool]> {
    (0..count).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0).collect()
}

#[test]
fn bits_are_packed_lsb_first() {
    let bits = [true, false, true, true, false, false, false, false, true];
    assert_eq!(pack_bits(&bits), vec![0b0000_1101, 0b0000_0001]);
    assert_eq!(&*unpack_bits(&[0b0000_1101, 0b0000_0001], 9), &bits[..]);
}

/// Sequential reader over the body of a PDU.
struct PduReader<'a> {
    function: u8,
    body: &'a [u8],
}

impl<'a> PduReader<'a> {
    fn new(function: u8, body: &'a [u8]) -> PduReader<'a> {
        PduReader { function, body }
    }

    fn truncated(&self) -> ReadError {
        ReadError::InvalidFormat(format!(
            "Truncated PDU for function 0x{:02x}",
            self.function
        ))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if self.body.len() < len {
            return Err(self.truncated());
        }
        let (head, tail) = self.body.split_at(len);
        self.body = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.body)
    }

    fn finish(self) -> Result<(), ReadError> {
        if self.body.is_empty() {
            Ok(())
        } else {
            Err(ReadError::InvalidFormat(format!(
                "{} trailing bytes in PDU for function 0x{:02x}",
                self.body.len(),
                self.function
            )))
        }
    }
}

impl Request {
    /// Decodes a request PDU (function code followed by its data).
    ///
    /// Function codes without a decoder are returned as [`Request::Other`] and are
    /// never an error. Known function codes with a broken layout are.
    pub fn from_pdu(pdu: &[u8]) -> Result<Request, ReadError> {
        let (&function, body) = pdu
            .split_first()
            .ok_or_else(|| ReadError::InvalidFormat("Empty PDU".to_string()))?;
        let mut body = PduReader::new(function, body);

        let request = match function {
            FC_READ_COILS
            | FC_READ_DISCRETE_INPUTS
            | FC_READ_HOLDING_REGISTERS
            | FC_READ_INPUT_REGISTERS => {
                let address = body.u16()?;
                let quantity = body.u16()?;
                match function {
                    FC_READ_COILS => Request::ReadCoils { address, quantity },
                    FC_READ_DISCRETE_INPUTS => Request::ReadDiscreteInputs { address, quantity },
                    FC_READ_HOLDING_REGISTERS => {
                        Request::ReadHoldingRegisters { address, quantity }
                    }
                    _ => Request::ReadInputRegisters { address, quantity },
                }
            }
            FC_WRITE_SINGLE_COIL => {
                let address = body.u16()?;
                let value = match body.u16()? {
                    COIL_ON => true,
                    COIL_OFF => false,
                    other => {
                        return Err(ReadError::InvalidFormat(format!(
                            "Invalid coil value 0x{:04x}",
                            other
                        )));
                    }
                };
                Request::WriteSingleCoil { address, value }
            }
            FC_WRITE_SINGLE_REGISTER => {
                let address = body.u16()?;
                let value = body.u16()?;
                Request::WriteSingleRegister { address, value }
            }
            FC_WRITE_MULTIPLE_COILS => {
                let address = body.u16()?;
                let quantity = body.u16()? as usize;
                let byte_count = body.u8()? as usize;
                if byte_count != quantity.div_ceil(8) {
                    return Err(ReadError::InvalidFormat(format!(
                        "Byte count {} does not match {} coils",
                        byte_count, quantity
                    )));
                }
                let values = unpack_bits(body.bytes(byte_count)?, quantity);
                Request::WriteMultipleCoils { address, values }
            }
            FC_WRITE_MULTIPLE_REGISTERS => {
                let address = body.u16()?;
                let quantity = body.u16()? as usize;
                let byte_count = body.u8()? as usize;
                if byte_count != quantity * 2 {
                    return Err(ReadError::InvalidFormat(format!(
                        "Byte count {} does not match {} registers",
                        byte_count, quantity
                    )));
                }
                let values = body
                    .bytes(byte_count)?
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect();
                Request::WriteMultipleRegisters { address, values }
            }
            FC_REPORT_SERVER_ID => Request::ReportServerId,
            _ => {
                return Ok(Request::Other {
                    function,
                    data: body.rest().into(),
                });
            }
        };
        body.finish()?;
        Ok(request)
    }

    /// Encodes this request as PDU.
    pub fn to_pdu(&self) -> Vec<u8> {
        let mut pdu = vec![self.function()];
        match self {
            Request::ReadCoils { address, quantity }
            | Request::ReadDiscreteInputs { address, quantity }
            | Request::ReadHoldingRegisters { address, quantity }
            | Request::ReadInputRegisters { address, quantity } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&quantity.to_be_bytes());
            }
            Request::WriteSingleCoil { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                let value = if *value { COIL_ON } else { COIL_OFF };
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteSingleRegister { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteMultipleCoils { address, values } => {
                let packed = pack_bits(values);
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
            Request::WriteMultipleRegisters { address, values } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push((values.len() * 2) as u8);
                for value in values.iter() {
                    pdu.extend_from_slice(&value.to_be_bytes());
                }
            }
            Request::ReportServerId => {}
            Request::Other { data, .. } => pdu.extend_from_slice(data),
        }
        pdu
    }
}

impl Frame {
    /// Reads exactly one request frame.
    ///
    /// Returns [`ReadError::Closed`] if the stream ends before the first byte of the frame.
    /// An end of stream anywhere inside the frame is reported as I/O error.
    pub fn from_reader(reader: &mut impl Read) -> Result<Frame, ReadError> {
        let (header, pdu) = read_frame(reader)?;
        let request = Request::from_pdu(&pdu)?;
        Ok(Frame { header, request })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.header.encode(&self.request.to_pdu())
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

impl Response {
    /// Decodes a response PDU.
    pub fn from_pdu(pdu: &[u8]) -> Result<Response, ReadError> {
        let (&function, body) = pdu
            .split_first()
            .ok_or_else(|| ReadError::InvalidFormat("Empty PDU".to_string()))?;
        let mut body = PduReader::new(function, body);

        let response = if function & EXCEPTION_FLAG != 0 {
            Response::Exception {
                function: function & !EXCEPTION_FLAG,
                code: ExceptionCode::from_code(body.u8()?),
            }
        } else {
            match function {
                FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
                    let byte_count = body.u8()? as usize;
                    let bits = unpack_bits(body.bytes(byte_count)?, byte_count * 8);
                    if function == FC_READ_COILS {
                        Response::ReadCoils(bits)
                    } else {
                        Response::ReadDiscreteInputs(bits)
                    }
                }
                FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                    let byte_count = body.u8()? as usize;
                    if byte_count % 2 != 0 {
                        return Err(ReadError::InvalidFormat(format!(
                            "Odd byte count {} for registers",
                            byte_count
                        )));
                    }
                    let registers = body
                        .bytes(byte_count)?
                        .chunks_exact(2)
                        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                        .collect();
                    if function == FC_READ_HOLDING_REGISTERS {
                        Response::ReadHoldingRegisters(registers)
                    } else {
                        Response::ReadInputRegisters(registers)
                    }
                }
                FC_WRITE_SINGLE_COIL => {
                    let address = body.u16()?;
                    let value = body.u16()? == COIL_ON;
                    Response::WriteSingleCoil { address, value }
                }
                FC_WRITE_SINGLE_REGISTER => {
                    let address = body.u16()?;
                    let value = body.u16()?;
                    Response::WriteSingleRegister { address, value }
                }
                FC_WRITE_MULTIPLE_COILS => {
                    let address = body.u16()?;
                    let quantity = body.u16()?;
                    Response::WriteMultipleCoils { address, quantity }
                }
                FC_WRITE_MULTIPLE_REGISTERS => {
                    let address = body.u16()?;
                    let quantity = body.u16()?;
                    Response::WriteMultipleRegisters { address, quantity }
                }
                FC_REPORT_SERVER_ID => {
                    let byte_count = body.u8()? as usize;
                    if byte_count < 2 {
                        return Err(ReadError::InvalidFormat(format!(
                            "Byte count {} too small for server id",
                            byte_count
                        )));
                    }
                    let data = body.bytes(byte_count)?;
                    Response::ReportServerId {
                        server_id: data[0],
                        running: data[1] == 0xFF,
                        identification: data[2..].into(),
                    }
                }
                other => {
                    return Err(ReadError::InvalidFormat(format!(
                        "Unexpected function 0x{:02x} in response",
                        other
                    )));
                }
            }
        };
        body.finish()?;
        Ok(response)
    }

    /// Encodes this response as PDU.
    pub fn to_pdu(&self) -> Vec<u8> {
        let mut pdu = vec![self.function()];
        match self {
            Response::ReadCoils(bits) | Response::ReadDiscreteInputs(bits) => {
                let packed = pack_bits(bits);
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
            Response::ReadHoldingRegisters(registers)
            | Response::ReadInputRegisters(registers) => {
                pdu.push((registers.len() * 2) as u8);
                for register in registers.iter() {
                    pdu.extend_from_slice(&register.to_be_bytes());
                }
            }
            Response::WriteSingleCoil { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                let value = if *value { COIL_ON } else { COIL_OFF };
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Response::WriteSingleRegister { address, value } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            Response::WriteMultipleCoils { address, quantity }
            | Response::WriteMultipleRegisters { address, quantity } => {
                pdu.extend_from_slice(&address.to_be_bytes());
                pdu.extend_from_slice(&quantity.to_be_bytes());
            }
            Response::ReportServerId {
                server_id,
                running,
                identification,
            } => {
                // function code, byte count, id and run indicator leave this much room
                let identification = &identification[..identification.len().min(MAX_PDU_LEN - 4)];
                pdu.push((identification.len() + 2) as u8);
                pdu.push(*server_id);
                pdu.push(if *running { 0xFF } else { 0x00 });
                pdu.extend_from_slice(identification);
            }
            Response::Exception { code, .. } => pdu.push(code.code()),
        }
        pdu
    }
}

impl ResponseFrame {
    pub fn from_reader(reader: &mut impl Read) -> Result<ResponseFrame, ReadError> {
        let (header, pdu) = read_frame(reader)?;
        let response = Response::from_pdu(&pdu)?;
        Ok(ResponseFrame { header, response })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.header.encode(&self.response.to_pdu())
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}
