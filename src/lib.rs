pub mod analyzer;
pub mod codegen;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod parser;

use error::Result;
use parser::Parser;

pub use parser::Compilation;

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Also return a textual dump of every function's AST.
    pub dump_ast: bool,
}

/// Compiles one translation unit to Intel-syntax x86-64 assembly.
pub fn compile(source: &str) -> Result<String> {
    Ok(compile_with(source, &CompileOptions::default())?.assembly)
}

pub fn compile_with(source: &str, options: &CompileOptions) -> Result<Compilation> {
    Parser::new(source)?.with_ast_dump(options.dump_ast).parse()
}
