//! The register map and the replies built from it.
use std::ops::Range;

use crate::protocol::{
    ExceptionCode, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
    RegisterClass, Request, Response, ServerIdentity,
};

/// In-memory state of the four register classes.
///
/// The length of every array is fixed on creation. Index `i` of an array
/// always refers to the same channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterMap {
    coils: Box<[bool]>,
    discretes: Box<[bool]>,
    holding_registers: Box<[u16]>,
    input_registers: Box<[u16]>,
}

impl RegisterMap {
    /// Creates a map with all values cleared.
    pub fn new(
        coils: usize,
        discretes: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> RegisterMap {
        RegisterMap {
            coils: vec![false; coils].into_boxed_slice(),
            discretes: vec![false; discretes].into_boxed_slice(),
            holding_registers: vec![0; holding_registers].into_boxed_slice(),
            input_registers: vec![0; input_registers].into_boxed_slice(),
        }
    }

    pub fn coils(&self) -> &[bool] {
        &self.coils
    }

    pub fn coils_mut(&mut self) -> &mut [bool] {
        &mut self.coils
    }

    pub fn discretes(&self) -> &[bool] {
        &self.discretes
    }

    pub fn discretes_mut(&mut self) -> &mut [bool] {
        &mut self.discretes
    }

    pub fn holding_registers(&self) -> &[u16] {
        &self.holding_registers
    }

    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        &mut self.holding_registers
    }

    pub fn input_registers(&self) -> &[u16] {
        &self.input_registers
    }

    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        &mut self.input_registers
    }

    /// Number of entries of the given class
    pub fn len(&self, class: RegisterClass) -> usize {
        match class {
            RegisterClass::Coils => self.coils.len(),
            RegisterClass::Discretes => self.discretes.len(),
            RegisterClass::HoldingRegisters => self.holding_registers.len(),
            RegisterClass::InputRegisters => self.input_registers.len(),
        }
    }
}

fn check_quantity(quantity: usize, max: u16) -> Result<(), ExceptionCode> {
    if quantity == 0 || quantity > max as usize {
        Err(ExceptionCode::IllegalDataValue)
    } else {
        Ok(())
    }
}

fn addressed(address: u16, quantity: usize, len: usize) -> Result<Range<usize>, ExceptionCode> {
    let start = address as usize;
    let end = start + quantity;
    if end > len {
        Err(ExceptionCode::IllegalDataAddress)
    } else {
        Ok(start..end)
    }
}

fn read<T: Copy>(
    values: &[T],
    address: u16,
    quantity: u16,
    max: u16,
) -> Result<Box<[T]>, ExceptionCode> {
    check_quantity(quantity as usize, max)?;
    let range = addressed(address, quantity as usize, values.len())?;
    Ok(values[range].into())
}

fn write<T: Copy>(
    values: &mut [T],
    address: u16,
    new_values: &[T],
    max: u16,
) -> Result<(), ExceptionCode> {
    check_quantity(new_values.len(), max)?;
    let range = addressed(address, new_values.len(), values.len())?;
    values[range].copy_from_slice(new_values);
    Ok(())
}

impl Request {
    /// Builds the response to this request from the register map.
    ///
    /// Write requests are applied to the map before the response is built.
    /// A request that addresses entries outside the map, or violates the quantity
    /// limits, leaves the map untouched and is answered with an exception.
    pub fn reply(&self, map: &mut RegisterMap, identity: &ServerIdentity) -> Response {
        let result = match self {
            Request::ReadCoils { address, quantity } => {
                read(map.coils(), *address, *quantity, MAX_READ_BITS).map(Response::ReadCoils)
            }
            Request::ReadDiscreteInputs { address, quantity } => {
                read(map.discretes(), *address, *quantity, MAX_READ_BITS)
                    .map(Response::ReadDiscreteInputs)
            }
            Request::ReadHoldingRegisters { address, quantity } => read(
                map.holding_registers(),
                *address,
                *quantity,
                MAX_READ_REGISTERS,
            )
            .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters { address, quantity } => read(
                map.input_registers(),
                *address,
                *quantity,
                MAX_READ_REGISTERS,
            )
            .map(Response::ReadInputRegisters),
            Request::WriteSingleCoil { address, value } => {
                write(map.coils_mut(), *address, &[*value], 1).map(|_| Response::WriteSingleCoil {
                    address: *address,
                    value: *value,
                })
            }
            Request::WriteSingleRegister { address, value } => {
                write(map.holding_registers_mut(), *address, &[*value], 1).map(|_| {
                    Response::WriteSingleRegister {
                        address: *address,
                        value: *value,
                    }
                })
            }
            Request::WriteMultipleCoils { address, values } => {
                write(map.coils_mut(), *address, &values[..], MAX_WRITE_BITS).map(|_| {
                    Response::WriteMultipleCoils {
                        address: *address,
                        quantity: values.len() as u16,
                    }
                })
            }
            Request::WriteMultipleRegisters { address, values } => write(
                map.holding_registers_mut(),
                *address,
                &values[..],
                MAX_WRITE_REGISTERS,
            )
            .map(|_| Response::WriteMultipleRegisters {
                address: *address,
                quantity: values.len() as u16,
            }),
            Request::ReportServerId => Ok(Response::ReportServerId {
                server_id: identity.server_id(),
                running: true,
                identification: identity.identification().into(),
            }),
            Request::Other { .. } => Err(ExceptionCode::IllegalFunction),
        };

        result.unwrap_or_else(|code| Response::Exception {
            function: self.function(),
            code,
        })
    }
}

#[cfg(test)]
mod test {
    use super::RegisterMap;
    use crate::protocol::{ExceptionCode, RegisterClass, Request, Response, ServerIdentity};

    fn map() -> RegisterMap {
        RegisterMap::new(5, 5, 4, 6)
    }

    fn reply(request: Request, map: &mut RegisterMap) -> Response {
        request.reply(map, &ServerIdentity::default())
    }

    #[test]
    fn lengths_are_fixed_on_creation() {
        let map = map();
        assert_eq!(map.len(RegisterClass::Coils), 5);
        assert_eq!(map.len(RegisterClass::Discretes), 5);
        assert_eq!(map.len(RegisterClass::HoldingRegisters), 4);
        assert_eq!(map.len(RegisterClass::InputRegisters), 6);
    }

    #[test]
    fn read_input_registers() {
        let mut map = map();
        map.input_registers_mut()
            .copy_from_slice(&[10, 11, 12, 13, 14, 15]);
        let response = reply(
            Request::ReadInputRegisters {
                address: 2,
                quantity: 3,
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::ReadInputRegisters(vec![12, 13, 14].into_boxed_slice())
        );
    }

    #[test]
    fn write_single_coil_updates_map() {
        let mut map = map();
        let response = reply(
            Request::WriteSingleCoil {
                address: 4,
                value: true,
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::WriteSingleCoil {
                address: 4,
                value: true
            }
        );
        assert_eq!(map.coils(), &[false, false, false, false, true]);
    }

    #[test]
    fn write_multiple_registers_updates_map() {
        let mut map = map();
        let response = reply(
            Request::WriteMultipleRegisters {
                address: 1,
                values: vec![250, 500, 1000].into_boxed_slice(),
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::WriteMultipleRegisters {
                address: 1,
                quantity: 3
            }
        );
        assert_eq!(map.holding_registers(), &[0, 250, 500, 1000]);
    }

    #[test]
    fn out_of_range_write_leaves_map_untouched() {
        let mut map = map();
        let response = reply(
            Request::WriteMultipleCoils {
                address: 3,
                values: vec![true, true, true].into_boxed_slice(),
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::Exception {
                function: 0x0F,
                code: ExceptionCode::IllegalDataAddress
            }
        );
        assert_eq!(map.coils(), &[false; 5]);
    }

    #[test]
    fn out_of_range_read() {
        let mut map = map();
        let response = reply(
            Request::ReadHoldingRegisters {
                address: 65535,
                quantity: 2,
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress
            }
        );
    }

    #[test]
    fn zero_quantity_is_illegal_value() {
        let mut map = map();
        let response = reply(
            Request::ReadCoils {
                address: 0,
                quantity: 0,
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::Exception {
                function: 0x01,
                code: ExceptionCode::IllegalDataValue
            }
        );
    }

    #[test]
    fn other_function_is_illegal() {
        let mut map = map();
        let before = map.clone();
        let response = reply(
            Request::Other {
                function: 0x2B,
                data: Box::default(),
            },
            &mut map,
        );
        assert_eq!(
            response,
            Response::Exception {
                function: 0x2B,
                code: ExceptionCode::IllegalFunction
            }
        );
        assert_eq!(map, before);
    }

    #[test]
    fn report_server_id() {
        let mut map = map();
        let identity = ServerIdentity::new(0x2A, b"board".to_vec());
        let response = Request::ReportServerId.reply(&mut map, &identity);
        assert_eq!(
            response,
            Response::ReportServerId {
                server_id: 0x2A,
                running: true,
                identification: b"board".to_vec().into_boxed_slice()
            }
        );
    }
}
