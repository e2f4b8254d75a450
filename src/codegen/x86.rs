use crate::{
    analyzer::{Location, StorageClass, Symbol, Type},
    error::InternalError,
    parser::AstOp,
};

use super::Reg;

pub fn size_directive(size: usize, ty: Type) -> Result<&'static str, InternalError> {
    Ok(match size {
        1 => "BYTE PTR",
        2 => "WORD PTR",
        4 => "DWORD PTR",
        8 => "QWORD PTR",
        _ => return Err(InternalError::UnrepresentableType(ty)),
    })
}

/// Instruction loading a `size`-byte value into a full 64-bit register.
/// `char` is unsigned; the wider integers are sign-extended.
pub fn load(reg: Reg, size: usize, ty: Type, memory: &str) -> Result<String, InternalError> {
    let directive = size_directive(size, ty)?;
    Ok(match size {
        1 => format!("movzx {}, {} {}", reg.q(), directive, memory),
        2 => format!("movsx {}, {} {}", reg.q(), directive, memory),
        4 => format!("movsxd {}, {} {}", reg.q(), directive, memory),
        _ => format!("mov {}, {} {}", reg.q(), directive, memory),
    })
}

pub fn store(reg: Reg, size: usize, ty: Type, memory: &str) -> Result<String, InternalError> {
    let directive = size_directive(size, ty)?;
    Ok(format!("mov {} {}, {}", directive, memory, reg.sized(size)?))
}

/// Memory operand of a named variable: RIP-relative for globals,
/// frame-relative for locals and parameters.
pub fn memory_operand(symbol: &Symbol) -> String {
    match (symbol.class, symbol.location) {
        (StorageClass::Local | StorageClass::Parameter, Location::Offset(offset)) if offset < 0 => {
            format!("[rbp{}]", offset)
        }
        (StorageClass::Local | StorageClass::Parameter, Location::Offset(offset)) => {
            format!("[rbp+{}]", offset)
        }
        _ => format!("{}[rip]", symbol.name),
    }
}

/// Condition code of a comparison operator, as used by `set`/`j`.
pub fn condition_code(op: AstOp) -> Result<&'static str, InternalError> {
    Ok(match op {
        AstOp::Equals => "e",
        AstOp::NotEqual => "ne",
        AstOp::LessThan => "l",
        AstOp::GreaterThan => "g",
        AstOp::LessEqual => "le",
        AstOp::GreaterEqual => "ge",
        _ => return Err(InternalError::UnknownOperator(op)),
    })
}

/// Condition code that is true when `op` is false.
pub fn inverted_condition_code(op: AstOp) -> Result<&'static str, InternalError> {
    Ok(match op {
        AstOp::Equals => "ne",
        AstOp::NotEqual => "e",
        AstOp::LessThan => "ge",
        AstOp::GreaterThan => "le",
        AstOp::LessEqual => "g",
        AstOp::GreaterEqual => "l",
        _ => return Err(InternalError::UnknownOperator(op)),
    })
}

pub fn data_directive(size: usize, ty: Type) -> Result<&'static str, InternalError> {
    Ok(match size {
        1 => ".byte",
        2 => ".value",
        4 => ".long",
        8 => ".quad",
        _ => return Err(InternalError::UnrepresentableType(ty)),
    })
}
