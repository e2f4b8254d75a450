mod ast;
mod declaration;
mod expr;
mod parser;
mod stmt;

pub use ast::*;
pub use expr::literal_type;
pub use parser::*;
