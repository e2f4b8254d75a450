use log::debug;

use crate::{
    analyzer::{SymbolError, SymbolId, SymbolTable, TypeError},
    codegen::CodeGen,
    error::{CompileError, Result},
    lexer::{Lexer, Token, TokenKind},
};

/// State shared by the parser and the code generator for one translation unit.
#[derive(Debug, Default)]
pub struct CompilerState {
    pub symbols: SymbolTable,
    pub codegen: CodeGen,
    /// Function whose body is being parsed.
    pub current_function: Option<SymbolId>,
    pub loop_depth: usize,
    pub switch_depth: usize,
}

/// Output of one translation unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compilation {
    pub assembly: String,
    /// AST of every function, when requested.
    pub ast_dump: Option<String>,
}

/// Recursive-descent parser. Functions are handed to the code generator as
/// soon as their body is complete; globals are emitted as they are declared.
#[derive(Debug)]
pub struct Parser {
    lexer: Lexer,
    pub(super) token: Token,
    pub(super) state: CompilerState,
    pub(super) ast_dump: Option<String>,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let token = lexer.scan()?;
        Ok(Self {
            lexer,
            token,
            state: CompilerState::default(),
            ast_dump: None,
        })
    }

    /// Collects a textual dump of every function's AST.
    pub fn with_ast_dump(mut self, enabled: bool) -> Self {
        self.ast_dump = enabled.then(String::new);
        self
    }

    pub fn state(&self) -> &CompilerState {
        &self.state
    }

    /// translation_unit = global_declaration*
    pub fn parse(mut self) -> Result<Compilation> {
        self.parse_declarations()?;
        debug!("reached end of input at line {}", self.token.line);

        Ok(Compilation {
            assembly: self.state.codegen.finish(),
            ast_dump: self.ast_dump,
        })
    }

    /// Parses declarations until the end of input, leaving the symbol table
    /// available for inspection.
    pub fn parse_declarations(&mut self) -> Result<()> {
        while self.token.kind != TokenKind::Eof {
            self.global_declaration()?;
        }
        Ok(())
    }

    pub(super) fn line(&self) -> usize {
        self.token.line
    }

    /// Moves to the next token and returns the one that was current.
    pub(super) fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.scan()?;
        Ok(std::mem::replace(&mut self.token, next))
    }

    /// Kind of the token after the current one.
    pub(super) fn peek(&mut self) -> Result<TokenKind> {
        let next = self.lexer.scan()?;
        let kind = next.kind.clone();
        self.lexer.push_back(next)?;
        Ok(kind)
    }

    pub(super) fn is(&self, kind: &TokenKind) -> bool {
        &self.token.kind == kind
    }

    pub(super) fn consume(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.is(kind) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(super) fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.consume(kind)? {
            return Ok(());
        }
        Err(self.error(format!(
            "expected {:?}, found {:?}",
            kind, self.token.kind
        )))
    }

    pub(super) fn expect_ident(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = &self.token.kind {
            let name = name.clone();
            self.advance()?;
            return Ok(name);
        }
        Err(self.error(format!("expected identifier, found {:?}", self.token.kind)))
    }

    pub(super) fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    pub(super) fn symbol_error(&self, source: SymbolError) -> CompileError {
        CompileError::Symbol {
            line: self.line(),
            source,
        }
    }

    pub(super) fn type_error(&self, source: TypeError) -> CompileError {
        CompileError::Type {
            line: self.line(),
            source,
        }
    }

    pub(super) fn mismatch(&self, message: impl Into<String>) -> CompileError {
        CompileError::TypeMismatch {
            line: self.line(),
            message: message.into(),
        }
    }

    pub(super) fn incompatible(&self, context: impl Into<String>) -> CompileError {
        CompileError::IncompatibleTypes {
            line: self.line(),
            context: context.into(),
        }
    }

    /// Whether the current token starts a declaration.
    pub(super) fn at_declaration(&self) -> bool {
        match &self.token.kind {
            TokenKind::Ident(name) => self.state.symbols.find_typedef(name).is_some(),
            kind => kind.starts_declaration(),
        }
    }
}
