use crate::error::InternalError;

/// 64, 32, 16 and 8 bit names of every register in the pool. The first four
/// are scratch registers handed out by [`Registers::allocate`]; the rest are
/// the argument registers, last parameter register first.
const REGISTER_NAMES: [[&str; 4]; 10] = [
    ["r10", "r10d", "r10w", "r10b"],
    ["r11", "r11d", "r11w", "r11b"],
    ["r12", "r12d", "r12w", "r12b"],
    ["r13", "r13d", "r13w", "r13b"],
    ["r9", "r9d", "r9w", "r9b"],
    ["r8", "r8d", "r8w", "r8b"],
    ["rcx", "ecx", "cx", "cl"],
    ["rdx", "edx", "dx", "dl"],
    ["rsi", "esi", "si", "sil"],
    ["rdi", "edi", "di", "dil"],
];

const SCRATCH_REGISTERS: usize = 4;

pub const ARGUMENT_REGISTERS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg(usize);

impl Reg {
    /// Register carrying parameter `position` (0-based) in the calling convention.
    pub fn argument(position: usize) -> Result<Reg, InternalError> {
        if position >= ARGUMENT_REGISTERS {
            return Err(InternalError::InvalidRegister(REGISTER_NAMES.len() + position));
        }
        Ok(Reg(REGISTER_NAMES.len() - 1 - position))
    }

    pub fn q(self) -> &'static str {
        REGISTER_NAMES[self.0][0]
    }

    pub fn b(self) -> &'static str {
        REGISTER_NAMES[self.0][3]
    }

    /// Name of the register viewed with the width of a `size`-byte value.
    pub fn sized(self, size: usize) -> Result<&'static str, InternalError> {
        let width = match size {
            8 => 0,
            4 => 1,
            2 => 2,
            1 => 3,
            _ => return Err(InternalError::InvalidRegister(self.0)),
        };
        Ok(REGISTER_NAMES[self.0][width])
    }
}

/// Busy bitmap over the scratch registers.
#[derive(Debug, Default)]
pub struct Registers {
    busy: [bool; SCRATCH_REGISTERS],
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Result<Reg, InternalError> {
        let index = self
            .busy
            .iter()
            .position(|busy| !busy)
            .ok_or(InternalError::RegisterExhausted)?;
        self.busy[index] = true;
        Ok(Reg(index))
    }

    pub fn free(&mut self, reg: Reg) -> Result<(), InternalError> {
        let slot = self
            .busy
            .get_mut(reg.0)
            .ok_or(InternalError::InvalidRegister(reg.0))?;
        if !*slot {
            return Err(InternalError::RegisterNotBusy(reg.q()));
        }
        *slot = false;
        Ok(())
    }

    /// Marks a register busy again after it was spilled around a call.
    pub fn reclaim(&mut self, reg: Reg) -> Result<(), InternalError> {
        let slot = self
            .busy
            .get_mut(reg.0)
            .ok_or(InternalError::InvalidRegister(reg.0))?;
        *slot = true;
        Ok(())
    }

    pub fn free_all(&mut self) {
        self.busy = [false; SCRATCH_REGISTERS];
    }

    pub fn busy(&self) -> Vec<Reg> {
        (0..SCRATCH_REGISTERS)
            .filter(|&i| self.busy[i])
            .map(Reg)
            .collect()
    }
}
