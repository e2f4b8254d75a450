use log::debug;

use crate::{
    analyzer::{
        reconcile, Location, Scope, StorageClass, StructuralKind, SymbolError, SymbolId, Type,
    },
    codegen::InitValue,
    error::{CompileError, Result},
    lexer::TokenKind,
};

use super::{AstOp, Node, Parser, Payload};

fn fits_offset(element: usize, count: usize) -> bool {
    element
        .checked_mul(count)
        .is_some_and(|bytes| i64::try_from(bytes).is_ok())
}

/// Base type of a declaration, before any `*`.
#[derive(Clone, Copy, Debug)]
pub(super) struct BaseType {
    pub ty: Type,
    pub is_extern: bool,
}

impl Parser {
    /// global_declaration = typedef_declaration
    ///                    | base_type ";"
    ///                    | base_type declarator ("," declarator)* ";"
    /// declarator = "*"* ident (function | array | ("=" literal)?)
    pub(super) fn global_declaration(&mut self) -> Result<()> {
        if self.is(&TokenKind::Typedef) {
            return self.typedef_declaration();
        }

        let base = self.base_type()?;
        if self.consume(&TokenKind::SemiColon)? {
            return Ok(());
        }

        loop {
            let ty = self.pointer_stars(base.ty)?;
            let name = self.expect_ident()?;

            if self.is(&TokenKind::OpenParen) {
                if self.function_declaration(&name, ty, base.is_extern)? {
                    return Ok(());
                }
            } else if self.is(&TokenKind::OpenSquareBrace) {
                self.global_array(&name, ty, base.is_extern)?;
            } else {
                self.global_scalar(&name, ty, base.is_extern)?;
            }

            if !self.consume(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::SemiColon)
    }

    /// local_declaration = typedef_declaration
    ///                   | base_type ("*"* ident ("[" int_lit "]" | "=" expression)?)* ";"
    ///
    /// Initializers are returned as assignments to run in statement order.
    pub(super) fn local_declaration(&mut self) -> Result<Option<Node>> {
        if self.is(&TokenKind::Typedef) {
            self.typedef_declaration()?;
            return Ok(None);
        }

        let base = self.base_type()?;
        let mut initializers = None;
        if self.consume(&TokenKind::SemiColon)? {
            return Ok(None);
        }

        loop {
            let ty = self.pointer_stars(base.ty)?;
            let name = self.expect_ident()?;

            if base.is_extern {
                self.declare_global(&name, ty, StructuralKind::Variable, StorageClass::Extern, 1)?;
            } else if self.consume(&TokenKind::OpenSquareBrace)? {
                let count = self.array_size(&name, ty)?;
                self.expect(&TokenKind::CloseSquareBrace)?;
                self.declare_local(&name, ty, StructuralKind::Array, count)?;
            } else {
                let id = self.declare_local(&name, ty, StructuralKind::Variable, 1)?;
                if self.consume(&TokenKind::Equal)? {
                    let value = self.expression()?;
                    let init = self.assignment_to(id, ty, value)?;
                    initializers = Some(Node::glue(initializers, init));
                }
            }

            if !self.consume(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::SemiColon)?;
        Ok(initializers)
    }

    fn assignment_to(&mut self, id: SymbolId, ty: Type, value: Node) -> Result<Node> {
        if !ty.is_scalar() {
            return Err(CompileError::InvalidLvalue {
                line: self.line(),
                message: "only scalar variables can be initialized".to_string(),
            });
        }
        let target = Node::leaf(AstOp::Identifier, ty, Payload::Symbol(id));
        let value = reconcile(value, ty, None, &self.state.symbols)
            .ok_or_else(|| self.incompatible("initializer"))?;
        Ok(Node::new(AstOp::Assign, ty, Some(value), None, Some(target), Payload::None))
    }

    /// typedef_declaration = "typedef" base_type "*"* ident ";"
    fn typedef_declaration(&mut self) -> Result<()> {
        self.expect(&TokenKind::Typedef)?;
        let base = self.base_type()?;
        let ty = self.pointer_stars(base.ty)?;
        let name = self.expect_ident()?;
        self.state
            .symbols
            .declare(Scope::Typedef, &name, ty, StructuralKind::Variable, StorageClass::Typedef, 0)
            .map_err(|e| self.symbol_error(e))?;
        self.expect(&TokenKind::SemiColon)
    }

    /// base_type = "extern"? ("void" | "char" | "short" | "int" | "long"
    ///           | ("struct" | "union") composite | "enum" enumeration | typedef_name)
    pub(super) fn base_type(&mut self) -> Result<BaseType> {
        let is_extern = self.consume(&TokenKind::Extern)?;
        let token = self.advance()?;
        let ty = match token.kind {
            TokenKind::Void => Type::VOID,
            TokenKind::Char => Type::CHAR,
            TokenKind::Short => Type::SHORT,
            TokenKind::Int => Type::INT,
            TokenKind::Long => Type::LONG,
            TokenKind::Struct => self.composite(false)?,
            TokenKind::Union => self.composite(true)?,
            TokenKind::Enum => self.enumeration()?,
            TokenKind::Ident(name) => self
                .state
                .symbols
                .typedef_type(&name)
                .map_err(|e| self.symbol_error(e))?,
            other => return Err(self.error(format!("expected a type, found {:?}", other))),
        };
        Ok(BaseType { ty, is_extern })
    }

    /// type_name = base_type "*"*
    pub(super) fn type_name(&mut self) -> Result<Type> {
        let base = self.base_type()?;
        self.pointer_stars(base.ty)
    }

    pub(super) fn pointer_stars(&mut self, mut ty: Type) -> Result<Type> {
        while self.consume(&TokenKind::Star)? {
            ty = ty.pointer_to().map_err(|e| self.type_error(e))?;
        }
        Ok(ty)
    }

    /// composite = ident? ("{" (base_type member ("," member)* ";")+ "}")?
    /// member = "*"* ident ("[" int_lit "]")?
    fn composite(&mut self, is_union: bool) -> Result<Type> {
        let name = match &self.token.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                name
            }
            _ => String::new(),
        };
        let (scope, class) = if is_union {
            (Scope::Union, StorageClass::UnionTag)
        } else {
            (Scope::Struct, StorageClass::StructTag)
        };
        let existing = match (name.is_empty(), is_union) {
            (true, _) => None,
            (false, true) => self.state.symbols.find_union(&name),
            (false, false) => self.state.symbols.find_struct(&name),
        };

        if !self.is(&TokenKind::OpenCurlyBrace) {
            if name.is_empty() {
                return Err(self.error("anonymous struct or union needs a body"));
            }
            // Forward reference: usable behind a pointer until defined.
            let id = match existing {
                Some(id) => id,
                None => self.declare_tag(scope, &name, class)?,
            };
            return Ok(self.state.symbols.composite_type(id));
        }

        let id = match existing {
            Some(id) if self.state.symbols[id].defined => {
                return Err(self.symbol_error(SymbolError::Redeclared(name)));
            }
            Some(id) => id,
            None => self.declare_tag(scope, &name, class)?,
        };

        self.expect(&TokenKind::OpenCurlyBrace)?;
        let saved = self.state.symbols.take_members();
        while !self.consume(&TokenKind::CloseCurlyBrace)? {
            let base = self.base_type()?;
            loop {
                let ty = self.pointer_stars(base.ty)?;
                let member = self.expect_ident()?;
                if ty.is_void() {
                    return Err(self.mismatch(format!("member `{}` declared void", member)));
                }
                let (kind, count) = if self.consume(&TokenKind::OpenSquareBrace)? {
                    let count = self.array_size(&member, ty)?;
                    self.expect(&TokenKind::CloseSquareBrace)?;
                    (StructuralKind::Array, count)
                } else {
                    (StructuralKind::Variable, 1)
                };
                self.state
                    .symbols
                    .declare(Scope::Member, &member, ty, kind, StorageClass::Member, count)
                    .map_err(|e| self.symbol_error(e))?;
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(&TokenKind::SemiColon)?;
        }

        let finished = self.state.symbols.finish_composite(id);
        self.state.symbols.restore_members(saved);
        finished.map_err(|e| self.symbol_error(e))?;
        Ok(self.state.symbols.composite_type(id))
    }

    fn declare_tag(&mut self, scope: Scope, name: &str, class: StorageClass) -> Result<SymbolId> {
        self.state
            .symbols
            .declare(scope, name, Type::NONE, StructuralKind::Variable, class, 0)
            .map_err(|e| self.symbol_error(e))
    }

    /// enumeration = ident? ("{" ident ("=" int_lit)? ("," ident ("=" int_lit)?)* ","? "}")?
    fn enumeration(&mut self) -> Result<Type> {
        let name = match &self.token.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Some(name)
            }
            _ => None,
        };

        if !self.consume(&TokenKind::OpenCurlyBrace)? {
            let name = name.ok_or_else(|| self.error("expected enum body"))?;
            if self
                .state
                .symbols
                .find_enum(&name, StorageClass::EnumTag)
                .is_none()
            {
                return Err(self.symbol_error(SymbolError::UnknownType(name)));
            }
            return Ok(Type::INT);
        }

        if let Some(name) = &name {
            self.state
                .symbols
                .declare(Scope::Enum, name, Type::INT, StructuralKind::Variable, StorageClass::EnumTag, 0)
                .map_err(|e| self.symbol_error(e))?;
        }

        let mut next = Some(0);
        while !self.consume(&TokenKind::CloseCurlyBrace)? {
            let constant = self.expect_ident()?;
            let value = if self.consume(&TokenKind::Equal)? {
                self.integer_constant()?
            } else {
                next.ok_or_else(|| {
                    self.error(format!("value of enumerator `{}` overflows", constant))
                })?
            };
            let id = self
                .state
                .symbols
                .declare(
                    Scope::Enum,
                    &constant,
                    Type::INT,
                    StructuralKind::Variable,
                    StorageClass::EnumConstant,
                    0,
                )
                .map_err(|e| self.symbol_error(e))?;
            self.state.symbols[id].location = Location::Constant(value);
            next = value.checked_add(1);

            if !self.consume(&TokenKind::Comma)? {
                self.expect(&TokenKind::CloseCurlyBrace)?;
                break;
            }
        }
        Ok(Type::INT)
    }

    /// integer_constant = "-"? int_lit
    fn integer_constant(&mut self) -> Result<i64> {
        let negative = self.consume(&TokenKind::Minus)?;
        match self.advance()?.kind {
            TokenKind::IntLit(value) if negative => Ok(-value),
            TokenKind::IntLit(value) => Ok(value),
            other => Err(self.error(format!("expected an integer constant, found {:?}", other))),
        }
    }

    /// Element count of an array of `ty`. The whole array must have a byte
    /// size representable as a frame or data offset.
    fn array_size(&mut self, name: &str, ty: Type) -> Result<usize> {
        let element = ty.size(&self.state.symbols);
        match self.token.kind {
            TokenKind::IntLit(count) if count > 0 && fits_offset(element, count as usize) => {
                self.advance()?;
                Ok(count as usize)
            }
            _ => Err(CompileError::InvalidArraySize {
                line: self.line(),
                name: name.to_string(),
            }),
        }
    }

    /// literal = "-"? int_lit | str_lit
    fn literal(&mut self, ty: Type) -> Result<InitValue> {
        if let TokenKind::StrLit(text) = &self.token.kind {
            let text = text.clone();
            let char_pointer = Type::CHAR.pointer_to().map_err(|e| self.type_error(e))?;
            if ty != char_pointer {
                return Err(self.incompatible("string initializer"));
            }
            let label = self.state.codegen.string_literal(&text);
            self.advance()?;
            return Ok(InitValue::Address(label));
        }
        if !ty.is_integral() {
            return Err(self.incompatible("initializer"));
        }
        Ok(InitValue::Int(self.integer_constant()?))
    }

    fn declare_global(
        &mut self,
        name: &str,
        ty: Type,
        kind: StructuralKind,
        class: StorageClass,
        count: usize,
    ) -> Result<SymbolId> {
        if ty.is_void() {
            return Err(self.mismatch(format!("variable `{}` declared void", name)));
        }
        self.state
            .symbols
            .declare(Scope::Global, name, ty, kind, class, count)
            .map_err(|e| self.symbol_error(e))
    }

    fn declare_local(&mut self, name: &str, ty: Type, kind: StructuralKind, count: usize) -> Result<SymbolId> {
        if ty.is_void() {
            return Err(self.mismatch(format!("variable `{}` declared void", name)));
        }
        let id = self
            .state
            .symbols
            .declare(Scope::Local, name, ty, kind, StorageClass::Local, count)
            .map_err(|e| self.symbol_error(e))?;
        let offset = self
            .state
            .codegen
            .allocate_local(self.state.symbols[id].size)
            .ok_or_else(|| self.symbol_error(SymbolError::Oversized(name.to_string())))?;
        self.state.symbols[id].location = Location::Offset(offset);
        Ok(id)
    }

    fn global_scalar(&mut self, name: &str, ty: Type, is_extern: bool) -> Result<()> {
        let class = if is_extern {
            StorageClass::Extern
        } else {
            StorageClass::Global
        };
        let id = self.declare_global(name, ty, StructuralKind::Variable, class, 1)?;

        let mut init = Vec::new();
        if self.consume(&TokenKind::Equal)? {
            if is_extern {
                return Err(self.error(format!("extern `{}` cannot be initialized", name)));
            }
            init.push(self.literal(ty)?);
        }
        self.state.codegen.global(id, &init, &self.state.symbols)
    }

    /// array = "[" int_lit? "]" ("=" "{" literal ("," literal)* "}")?
    fn global_array(&mut self, name: &str, ty: Type, is_extern: bool) -> Result<()> {
        self.expect(&TokenKind::OpenSquareBrace)?;
        let mut count = match self.token.kind {
            TokenKind::CloseSquareBrace => None,
            _ => Some(self.array_size(name, ty)?),
        };
        self.expect(&TokenKind::CloseSquareBrace)?;

        let mut init = Vec::new();
        if self.consume(&TokenKind::Equal)? {
            self.expect(&TokenKind::OpenCurlyBrace)?;
            loop {
                init.push(self.literal(ty)?);
                if !self.consume(&TokenKind::Comma)? || self.is(&TokenKind::CloseCurlyBrace) {
                    break;
                }
            }
            self.expect(&TokenKind::CloseCurlyBrace)?;
            count = count.or(Some(init.len()));
        }

        let invalid_size = CompileError::InvalidArraySize {
            line: self.line(),
            name: name.to_string(),
        };
        let count = match count {
            Some(count) if count >= init.len() => count,
            _ => return Err(invalid_size),
        };

        let class = if is_extern {
            StorageClass::Extern
        } else {
            StorageClass::Global
        };
        let id = self.declare_global(name, ty, StructuralKind::Array, class, count)?;
        self.state.codegen.global(id, &init, &self.state.symbols)
    }

    /// function = "(" parameters ")" (";" | compound_statement)
    ///
    /// Returns whether a body was parsed.
    fn function_declaration(&mut self, name: &str, ty: Type, is_extern: bool) -> Result<bool> {
        if !ty.is_scalar() && !ty.is_void() {
            return Err(self.mismatch(format!("`{}` cannot return a value of type `{}`", name, ty)));
        }
        let existing = self
            .state
            .symbols
            .find_global(name)
            .filter(|&id| self.state.symbols[id].kind == StructuralKind::Function);

        let id = match existing {
            Some(id) => {
                if self.state.symbols[id].ty != ty {
                    return Err(self.mismatch(format!("conflicting return type for `{}`", name)));
                }
                id
            }
            None => {
                let class = if is_extern {
                    StorageClass::Extern
                } else {
                    StorageClass::Global
                };
                self.state
                    .symbols
                    .declare(Scope::Global, name, ty, StructuralKind::Function, class, 0)
                    .map_err(|e| self.symbol_error(e))?
            }
        };

        let params = self.parameters()?;
        if existing.is_some() {
            self.check_prototype(id, &params)?;
        } else {
            let function = &mut self.state.symbols[id];
            function.count = params.len();
            function.members = params.clone();
        }

        if !self.is(&TokenKind::OpenCurlyBrace) {
            self.state.symbols.clear_parameters();
            return Ok(false);
        }

        if self.state.symbols[id].defined {
            return Err(self.symbol_error(SymbolError::Redeclared(name.to_string())));
        }
        if params.iter().any(|&p| self.state.symbols[p].name.is_empty()) {
            return Err(self.error(format!("parameter name omitted in definition of `{}`", name)));
        }
        let function = &mut self.state.symbols[id];
        function.members = params;
        function.defined = true;

        self.function_body(id)?;
        Ok(true)
    }

    /// parameters = "void" | (type_name ident? ("," type_name ident?)*)?
    fn parameters(&mut self) -> Result<Vec<SymbolId>> {
        self.expect(&TokenKind::OpenParen)?;
        let mut params = Vec::new();
        if self.consume(&TokenKind::CloseParen)? {
            return Ok(params);
        }
        if self.is(&TokenKind::Void) && self.peek()? == TokenKind::CloseParen {
            self.advance()?;
            self.advance()?;
            return Ok(params);
        }

        loop {
            let ty = self.type_name()?;
            if !ty.is_scalar() {
                return Err(self.mismatch(format!("parameter of type `{}` is not supported", ty)));
            }
            let name = match &self.token.kind {
                TokenKind::Ident(name) => {
                    let name = name.clone();
                    self.advance()?;
                    name
                }
                _ => String::new(),
            };
            let id = self
                .state
                .symbols
                .declare(Scope::Parameter, &name, ty, StructuralKind::Variable, StorageClass::Parameter, 1)
                .map_err(|e| self.symbol_error(e))?;
            params.push(id);

            if !self.consume(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::CloseParen)?;
        Ok(params)
    }

    fn check_prototype(&self, id: SymbolId, params: &[SymbolId]) -> Result<()> {
        let symbols = &self.state.symbols;
        let function = &symbols[id];
        if function.members.len() != params.len() {
            return Err(self.mismatch(format!(
                "`{}` declared with {} parameters, now has {}",
                function.name,
                function.members.len(),
                params.len()
            )));
        }
        for (position, (&old, &new)) in function.members.iter().zip(params).enumerate() {
            if symbols[old].ty != symbols[new].ty {
                return Err(self.mismatch(format!(
                    "parameter {} of `{}` is `{}`, prototype says `{}`",
                    position + 1,
                    function.name,
                    symbols[new].ty,
                    symbols[old].ty
                )));
            }
        }
        Ok(())
    }

    fn function_body(&mut self, id: SymbolId) -> Result<()> {
        debug!("parsing body of `{}`", self.state.symbols[id].name);
        self.state.current_function = Some(id);
        self.state.loop_depth = 0;
        self.state.switch_depth = 0;
        self.state.codegen.begin_function();
        self.state
            .codegen
            .assign_parameters(id, &mut self.state.symbols)
            .map_err(|e| self.symbol_error(e))?;

        let body = self.compound_statement()?;

        let ty = self.state.symbols[id].ty;
        if !ty.is_void() {
            let last = match &body {
                Some(node) if node.op == AstOp::Glue => node.right.as_deref(),
                other => other.as_ref(),
            };
            if last.map(|node| node.op) != Some(AstOp::Return) {
                return Err(CompileError::MissingReturn {
                    line: self.line(),
                    name: self.state.symbols[id].name.clone(),
                });
            }
        }

        let tree = Node::new(AstOp::Function, ty, body, None, None, Payload::Symbol(id));
        if let Some(dump) = &mut self.ast_dump {
            dump.push_str(&tree.dump(&self.state.symbols));
        }
        self.state.codegen.function(tree, &mut self.state.symbols)?;

        self.state.symbols.clear_locals();
        self.state.symbols.clear_parameters();
        self.state.current_function = None;
        Ok(())
    }
}
