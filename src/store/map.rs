//! Register map
//!
//! The four independently addressed register spaces, each a contiguous
//! window of cells with a configured start address. The map is plain owned
//! state: the multiplexer's single thread of control is the only mutator,
//! so there is no lock around it.
//!
//! The protocol library reads and applies requests through the
//! [`ModbusContext`] implementation; addresses outside a configured window
//! surface as `OOBContext`, which the library renders as an ILLEGAL DATA
//! ADDRESS exception reply.

use rmodbus::server::context::ModbusContext;
use rmodbus::ErrorKind;

use crate::config::SpaceConfig;
use crate::error::{RegMirrorError, Result};

/// One of the four register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSpace {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

impl RegisterSpace {
    /// The spaces in persistent type-code order (0, 1, 3, 4). Hydration walks
    /// them in exactly this order.
    pub const IN_TYPE_ORDER: [RegisterSpace; 4] = [
        RegisterSpace::Coil,
        RegisterSpace::DiscreteInput,
        RegisterSpace::InputRegister,
        RegisterSpace::HoldingRegister,
    ];

    /// Stable external type code used by the backing table and the wire
    /// tooling. Mirrors the protocol's function-code family; not derivable
    /// from declaration order.
    pub fn type_code(self) -> u8 {
        match self {
            RegisterSpace::Coil => 0,
            RegisterSpace::DiscreteInput => 1,
            RegisterSpace::InputRegister => 3,
            RegisterSpace::HoldingRegister => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RegisterSpace::Coil => "coil",
            RegisterSpace::DiscreteInput => "discrete input",
            RegisterSpace::InputRegister => "input register",
            RegisterSpace::HoldingRegister => "holding register",
        }
    }

    /// Bit spaces hold booleans, word spaces hold 16-bit values.
    pub fn is_bit(self) -> bool {
        matches!(self, RegisterSpace::Coil | RegisterSpace::DiscreteInput)
    }
}

/// Value of one cell: a bit for coil/discrete-input spaces, a word for the
/// register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    Bit(bool),
    Word(u16),
}

impl CellValue {
    /// Wrap a raw persisted value in the shape its space expects.
    pub fn for_space(space: RegisterSpace, raw: u16) -> Self {
        if space.is_bit() {
            CellValue::Bit(raw != 0)
        } else {
            CellValue::Word(raw)
        }
    }

    /// The raw 16-bit form stored in the backing table.
    pub fn as_raw(self) -> u16 {
        match self {
            CellValue::Bit(bit) => u16::from(bit),
            CellValue::Word(word) => word,
        }
    }
}

/// One contiguous window of cells.
#[derive(Debug)]
struct Window<T> {
    start: u16,
    cells: Vec<T>,
}

impl<T: Copy + Default> Window<T> {
    fn new(space: SpaceConfig) -> Self {
        Self {
            start: space.start_address,
            cells: vec![T::default(); usize::from(space.count)],
        }
    }

    fn index(&self, address: u16) -> Option<usize> {
        let index = usize::from(address.checked_sub(self.start)?);
        (index < self.cells.len()).then_some(index)
    }

    fn get(&self, address: u16) -> Option<T> {
        Some(self.cells[self.index(address)?])
    }

    fn set(&mut self, address: u16, value: T) -> Option<()> {
        let index = self.index(address)?;
        self.cells[index] = value;
        Some(())
    }

    fn bounds(&self) -> (u16, u16) {
        (self.start, self.cells.len() as u16)
    }
}

/// The full register map: every configured cell has a value at all times
/// (zero until hydration or a write says otherwise).
#[derive(Debug)]
pub struct RegisterMap {
    coils: Window<bool>,
    discrete_inputs: Window<bool>,
    input_registers: Window<u16>,
    holding_registers: Window<u16>,
}

impl RegisterMap {
    pub fn new(
        coils: SpaceConfig,
        discrete_inputs: SpaceConfig,
        input_registers: SpaceConfig,
        holding_registers: SpaceConfig,
    ) -> Self {
        Self {
            coils: Window::new(coils),
            discrete_inputs: Window::new(discrete_inputs),
            input_registers: Window::new(input_registers),
            holding_registers: Window::new(holding_registers),
        }
    }

    /// `(start_address, count)` of a space's configured window.
    pub fn window(&self, space: RegisterSpace) -> (u16, u16) {
        match space {
            RegisterSpace::Coil => self.coils.bounds(),
            RegisterSpace::DiscreteInput => self.discrete_inputs.bounds(),
            RegisterSpace::InputRegister => self.input_registers.bounds(),
            RegisterSpace::HoldingRegister => self.holding_registers.bounds(),
        }
    }

    /// Read one cell.
    pub fn get(&self, space: RegisterSpace, address: u16) -> Result<CellValue> {
        let value = match space {
            RegisterSpace::Coil => self.coils.get(address).map(CellValue::Bit),
            RegisterSpace::DiscreteInput => self.discrete_inputs.get(address).map(CellValue::Bit),
            RegisterSpace::InputRegister => self.input_registers.get(address).map(CellValue::Word),
            RegisterSpace::HoldingRegister => {
                self.holding_registers.get(address).map(CellValue::Word)
            }
        };
        value.ok_or_else(|| out_of_range(space, address))
    }

    /// Write one cell. The value shape must match the space.
    pub fn set(&mut self, space: RegisterSpace, address: u16, value: CellValue) -> Result<()> {
        let stored = match (space, value) {
            (RegisterSpace::Coil, CellValue::Bit(bit)) => self.coils.set(address, bit),
            (RegisterSpace::DiscreteInput, CellValue::Bit(bit)) => {
                self.discrete_inputs.set(address, bit)
            }
            (RegisterSpace::InputRegister, CellValue::Word(word)) => {
                self.input_registers.set(address, word)
            }
            (RegisterSpace::HoldingRegister, CellValue::Word(word)) => {
                self.holding_registers.set(address, word)
            }
            (space, value) => {
                return Err(RegMirrorError::InvalidArgument(format!(
                    "{value:?} does not fit the {} space",
                    space.name()
                )))
            }
        };
        stored.ok_or_else(|| out_of_range(space, address))
    }
}

fn out_of_range(space: RegisterSpace, address: u16) -> RegMirrorError {
    RegMirrorError::AddressOutOfRange {
        space: space.name(),
        address,
    }
}

// =============================================================================
// Protocol library context
// =============================================================================

impl ModbusContext for RegisterMap {
    fn get_coil(&self, reg: u16) -> std::result::Result<bool, ErrorKind> {
        self.coils.get(reg).ok_or(ErrorKind::OOBContext)
    }

    fn set_coil(&mut self, reg: u16, value: bool) -> std::result::Result<(), ErrorKind> {
        self.coils.set(reg, value).ok_or(ErrorKind::OOBContext)
    }

    fn get_discrete(&self, reg: u16) -> std::result::Result<bool, ErrorKind> {
        self.discrete_inputs.get(reg).ok_or(ErrorKind::OOBContext)
    }

    fn set_discrete(&mut self, reg: u16, value: bool) -> std::result::Result<(), ErrorKind> {
        self.discrete_inputs
            .set(reg, value)
            .ok_or(ErrorKind::OOBContext)
    }

    fn get_input(&self, reg: u16) -> std::result::Result<u16, ErrorKind> {
        self.input_registers.get(reg).ok_or(ErrorKind::OOBContext)
    }

    fn set_input(&mut self, reg: u16, value: u16) -> std::result::Result<(), ErrorKind> {
        self.input_registers
            .set(reg, value)
            .ok_or(ErrorKind::OOBContext)
    }

    fn get_holding(&self, reg: u16) -> std::result::Result<u16, ErrorKind> {
        self.holding_registers.get(reg).ok_or(ErrorKind::OOBContext)
    }

    fn set_holding(&mut self, reg: u16, value: u16) -> std::result::Result<(), ErrorKind> {
        self.holding_registers
            .set(reg, value)
            .ok_or(ErrorKind::OOBContext)
    }
}
