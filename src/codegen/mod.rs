mod codegen;
mod registers;
mod x86;

pub use codegen::*;
pub use registers::*;
