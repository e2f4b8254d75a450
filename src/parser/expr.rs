use crate::{
    analyzer::{
        apply, coercion, reconcile, Location, StorageClass, StructuralKind, SymbolError, Type,
    },
    error::{CompileError, Result},
    lexer::TokenKind,
};

use super::{AstOp, Node, Parser, Payload};

/// Type of an integer literal: the narrowest of char, int and long that holds it.
pub fn literal_type(value: i64) -> Type {
    if (0..=255).contains(&value) {
        Type::CHAR
    } else if i32::try_from(value).is_ok() {
        Type::INT
    } else {
        Type::LONG
    }
}

impl Parser {
    /// expression = assignment
    pub(super) fn expression(&mut self) -> Result<Node> {
        self.assignment()
    }

    /// assignment = logical_or ("=" assignment)?
    fn assignment(&mut self) -> Result<Node> {
        let target = self.logical_or()?;
        if !self.consume(&TokenKind::Equal)? {
            return Ok(target);
        }

        let value = self.assignment()?;
        let target = self.lvalue(target, "assignment")?;
        let ty = target.ty;
        let value = reconcile(value, ty, None, &self.state.symbols)
            .ok_or_else(|| self.incompatible("assignment"))?;
        Ok(Node::new(AstOp::Assign, ty, Some(value), None, Some(target), Payload::None))
    }

    /// Checks that `node` designates a scalar object and turns it into a
    /// store target.
    fn lvalue(&self, mut node: Node, context: &str) -> Result<Node> {
        let is_object = matches!(node.op, AstOp::Identifier | AstOp::Dereference);
        if !is_object || !node.ty.is_scalar() {
            return Err(CompileError::InvalidLvalue {
                line: self.line(),
                message: format!("invalid target of {}", context),
            });
        }
        node.rvalue = false;
        Ok(node)
    }

    /// One left-associative level of binary operators.
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Node>,
        operators: &[(TokenKind, AstOp)],
    ) -> Result<Node> {
        let mut left = next(self)?;
        'level: loop {
            for (kind, op) in operators {
                if self.consume(kind)? {
                    let right = next(self)?;
                    left = self.binary(*op, left, right)?;
                    continue 'level;
                }
            }
            return Ok(left);
        }
    }

    /// Builds `left op right`, widening or scaling whichever side needs it.
    fn binary(&mut self, op: AstOp, left: Node, right: Node) -> Result<Node> {
        if !left.ty.is_scalar() || !right.ty.is_scalar() {
            return Err(self.mismatch(format!(
                "invalid operands `{}` and `{}` for {:?}",
                left.ty, right.ty, op
            )));
        }

        if matches!(op, AstOp::LogicalAnd | AstOp::LogicalOr) {
            return Ok(Node::binary(op, Type::INT, left, right));
        }

        let symbols = &self.state.symbols;
        let (left_ty, right_ty) = (left.ty, right.ty);
        let (left, right, ty) = match (
            coercion(left_ty, right_ty, Some(op), symbols),
            coercion(right_ty, left_ty, Some(op), symbols),
        ) {
            (Some(c), _) => (apply(left, c, right_ty), right, right_ty),
            (None, Some(c)) => (left, apply(right, c, left_ty), left_ty),
            (None, None) => return Err(self.incompatible(format!("{:?} expression", op))),
        };

        let ty = if op.is_comparison() { Type::INT } else { ty };
        Ok(Node::binary(op, ty, left, right))
    }

    /// logical_or = logical_and ("||" logical_and)*
    fn logical_or(&mut self) -> Result<Node> {
        self.binary_level(Self::logical_and, &[(TokenKind::LogicalOr, AstOp::LogicalOr)])
    }

    /// logical_and = bitwise_or ("&&" bitwise_or)*
    fn logical_and(&mut self) -> Result<Node> {
        self.binary_level(Self::bitwise_or, &[(TokenKind::LogicalAnd, AstOp::LogicalAnd)])
    }

    /// bitwise_or = bitwise_and (("|" | "^") bitwise_and)*
    fn bitwise_or(&mut self) -> Result<Node> {
        self.binary_level(
            Self::bitwise_and,
            &[(TokenKind::Pipe, AstOp::BitOr), (TokenKind::Hat, AstOp::BitXor)],
        )
    }

    /// bitwise_and = equality ("&" equality)*
    fn bitwise_and(&mut self) -> Result<Node> {
        self.binary_level(Self::equality, &[(TokenKind::Ampersand, AstOp::BitAnd)])
    }

    /// equality = relational (("==" | "!=") relational)*
    fn equality(&mut self) -> Result<Node> {
        self.binary_level(
            Self::relational,
            &[
                (TokenKind::DoubleEqual, AstOp::Equals),
                (TokenKind::NotEqual, AstOp::NotEqual),
            ],
        )
    }

    /// relational = shift (("<" | ">" | "<=" | ">=") shift)*
    fn relational(&mut self) -> Result<Node> {
        self.binary_level(
            Self::shift,
            &[
                (TokenKind::LessThan, AstOp::LessThan),
                (TokenKind::GreaterThan, AstOp::GreaterThan),
                (TokenKind::LessEqual, AstOp::LessEqual),
                (TokenKind::GreaterEqual, AstOp::GreaterEqual),
            ],
        )
    }

    /// shift = add (("<<" | ">>") add)*
    fn shift(&mut self) -> Result<Node> {
        self.binary_level(
            Self::add,
            &[
                (TokenKind::LeftShift, AstOp::LeftShift),
                (TokenKind::RightShift, AstOp::RightShift),
            ],
        )
    }

    /// add = mul (("+" | "-") mul)*
    fn add(&mut self) -> Result<Node> {
        self.binary_level(
            Self::mul,
            &[(TokenKind::Plus, AstOp::Add), (TokenKind::Minus, AstOp::Subtract)],
        )
    }

    /// mul = prefix (("*" | "/" | "%") prefix)*
    fn mul(&mut self) -> Result<Node> {
        self.binary_level(
            Self::prefix,
            &[
                (TokenKind::Star, AstOp::Multiply),
                (TokenKind::Slash, AstOp::Divide),
                (TokenKind::Percent, AstOp::Modulo),
            ],
        )
    }

    /// prefix = ("*" | "&" | "-" | "!" | "~" | "++" | "--") prefix
    ///        | postfix
    fn prefix(&mut self) -> Result<Node> {
        let op = match self.token.kind {
            TokenKind::Star => AstOp::Dereference,
            TokenKind::Ampersand => AstOp::AddressOf,
            TokenKind::Minus => AstOp::Negate,
            TokenKind::Not => AstOp::LogicalNot,
            TokenKind::Tilde => AstOp::Invert,
            TokenKind::Increment => AstOp::PreIncrement,
            TokenKind::Decrement => AstOp::PreDecrement,
            _ => return self.postfix(),
        };
        self.advance()?;
        let operand = self.prefix()?;

        match op {
            AstOp::Dereference => {
                let ty = operand.ty.value_at().map_err(|e| self.type_error(e))?;
                Ok(Node::unary(op, ty, operand, Payload::None).rvalue())
            }
            AstOp::AddressOf => self.address_of(operand),
            AstOp::Negate if operand.op == AstOp::IntLit => {
                let value = -operand.value().unwrap_or_default();
                Ok(Node::int(value, literal_type(value)))
            }
            AstOp::PreIncrement | AstOp::PreDecrement => {
                let target = self.lvalue(operand, "increment")?;
                Ok(Node::unary(op, target.ty, target, Payload::None))
            }
            AstOp::LogicalNot => {
                if !operand.ty.is_scalar() {
                    return Err(self.mismatch(format!("invalid operand `{}` for `!`", operand.ty)));
                }
                Ok(Node::unary(op, Type::INT, operand, Payload::None))
            }
            _ => {
                if !operand.ty.is_integral() {
                    return Err(self.mismatch(format!("invalid operand `{}` for {:?}", operand.ty, op)));
                }
                Ok(Node::unary(op, operand.ty, operand, Payload::None))
            }
        }
    }

    fn address_of(&self, operand: Node) -> Result<Node> {
        match operand.op {
            AstOp::Identifier => {
                let ty = operand.ty.pointer_to().map_err(|e| self.type_error(e))?;
                Ok(Node::leaf(AstOp::AddressOf, ty, operand.payload))
            }
            // `&*p` is `p`; `&s.m` is the computed member address.
            AstOp::Dereference => operand
                .left
                .map(|address| *address)
                .ok_or_else(|| self.error("cannot take the address of this expression")),
            // Array names already denote their address.
            AstOp::AddressOf => Ok(operand),
            _ => Err(CompileError::InvalidLvalue {
                line: self.line(),
                message: "cannot take the address of this expression".to_string(),
            }),
        }
    }

    /// postfix = primary ("[" expression "]" | "." ident | "->" ident | "++" | "--")*
    fn postfix(&mut self) -> Result<Node> {
        let mut node = self.primary()?;
        loop {
            node = match self.token.kind {
                TokenKind::OpenSquareBrace => {
                    self.advance()?;
                    let index = self.expression()?;
                    self.expect(&TokenKind::CloseSquareBrace)?;
                    self.index(node, index)?
                }
                TokenKind::Dot => {
                    self.advance()?;
                    let member = self.expect_ident()?;
                    let address = match node.op {
                        AstOp::Identifier | AstOp::Dereference if node.ty.is_composite() => {
                            self.address_of(node)?
                        }
                        _ => return Err(self.mismatch(format!("`.{}` on a non-struct value", member))),
                    };
                    self.member(address, &member)?
                }
                TokenKind::Arrow => {
                    self.advance()?;
                    let member = self.expect_ident()?;
                    self.member(node, &member)?
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    let op = match self.advance()?.kind {
                        TokenKind::Increment => AstOp::PostIncrement,
                        _ => AstOp::PostDecrement,
                    };
                    let target = self.lvalue(node, "increment")?;
                    Node::unary(op, target.ty, target, Payload::None)
                }
                _ => return Ok(node),
            };
        }
    }

    /// `base[index]` is `*(base + index)`.
    fn index(&mut self, base: Node, index: Node) -> Result<Node> {
        if !base.ty.is_pointer() || !index.ty.is_integral() {
            return Err(self.mismatch(format!("cannot index `{}` with `{}`", base.ty, index.ty)));
        }
        let ty = base.ty.value_at().map_err(|e| self.type_error(e))?;
        let address = self.binary(AstOp::Add, base, index)?;
        Ok(Node::unary(AstOp::Dereference, ty, address, Payload::None).rvalue())
    }

    /// `p->m` is `*(p + offset of m)`. Array members yield their address.
    fn member(&mut self, address: Node, name: &str) -> Result<Node> {
        let composite = match (address.ty.depth, address.ty.composite()) {
            (1, Some(id)) => id,
            _ => return Err(self.mismatch(format!("`{}` is not a member of `{}`", name, address.ty))),
        };
        let symbols = &self.state.symbols;
        let member = symbols
            .find_member(composite, name)
            .ok_or_else(|| self.symbol_error(SymbolError::UnknownMember(name.to_string())))?;
        let member = &symbols[member];
        let offset = match member.location {
            Location::Offset(offset) => offset,
            _ => 0,
        };

        let member_ty = member.ty;
        let pointer = member_ty.pointer_to().map_err(|e| self.type_error(e))?;
        let address = Node::binary(AstOp::Add, pointer, address, Node::int(offset, Type::LONG));
        if member.kind == StructuralKind::Array {
            return Ok(address);
        }
        Ok(Node::unary(AstOp::Dereference, member_ty, address, Payload::None).rvalue())
    }

    /// primary = int_lit
    ///         | str_lit
    ///         | "(" expression ")"
    ///         | "sizeof" "(" (type_name | ident) ")"
    ///         | ident "(" (expression ("," expression)*)? ")"
    ///         | ident
    fn primary(&mut self) -> Result<Node> {
        match self.token.kind.clone() {
            TokenKind::IntLit(value) => {
                self.advance()?;
                Ok(Node::int(value, literal_type(value)))
            }
            TokenKind::StrLit(text) => {
                self.advance()?;
                let label = self.state.codegen.string_literal(&text);
                let ty = Type::CHAR.pointer_to().map_err(|e| self.type_error(e))?;
                Ok(Node::leaf(AstOp::StrLit, ty, Payload::Value(label.0 as i64)).rvalue())
            }
            TokenKind::OpenParen => {
                self.advance()?;
                let node = self.expression()?;
                self.expect(&TokenKind::CloseParen)?;
                Ok(node)
            }
            TokenKind::Sizeof => {
                self.advance()?;
                self.expect(&TokenKind::OpenParen)?;
                let size = self.sizeof_operand()?;
                self.expect(&TokenKind::CloseParen)?;
                Ok(Node::int(size as i64, Type::INT))
            }
            TokenKind::Ident(name) => {
                if self.peek()? == TokenKind::OpenParen {
                    return self.function_call(&name);
                }
                self.advance()?;
                self.identifier(&name)
            }
            other => Err(self.error(format!("unexpected {:?} in expression", other))),
        }
    }

    fn sizeof_operand(&mut self) -> Result<usize> {
        if let TokenKind::Ident(name) = &self.token.kind {
            if self.state.symbols.find_typedef(name).is_none() {
                let name = name.clone();
                let id = self.state.symbols.find(&name).ok_or(CompileError::Undeclared {
                    line: self.line(),
                    name,
                })?;
                self.advance()?;
                return Ok(self.state.symbols[id].size);
            }
        }
        let ty = self.type_name()?;
        Ok(ty.size(&self.state.symbols))
    }

    fn identifier(&mut self, name: &str) -> Result<Node> {
        let symbols = &self.state.symbols;
        let Some(id) = symbols.find(name) else {
            return match symbols.find_enum(name, StorageClass::EnumConstant) {
                Some(id) => match symbols[id].location {
                    Location::Constant(value) => Ok(Node::int(value, Type::INT)),
                    _ => Ok(Node::int(0, Type::INT)),
                },
                None => Err(CompileError::Undeclared {
                    line: self.line(),
                    name: name.to_string(),
                }),
            };
        };

        let symbol = &symbols[id];
        match symbol.kind {
            StructuralKind::Array => {
                let ty = symbol.ty.pointer_to().map_err(|e| self.type_error(e))?;
                Ok(Node::leaf(AstOp::AddressOf, ty, Payload::Symbol(id)))
            }
            StructuralKind::Function => {
                Err(self.error(format!("function `{}` used as a value", name)))
            }
            StructuralKind::Variable => {
                Ok(Node::leaf(AstOp::Identifier, symbol.ty, Payload::Symbol(id)).rvalue())
            }
        }
    }

    /// Arguments form a glue chain whose head is the last argument. Each
    /// declared parameter's type is enforced; surplus arguments pass as is.
    fn function_call(&mut self, name: &str) -> Result<Node> {
        let id = self
            .state
            .symbols
            .find(name)
            .filter(|&id| self.state.symbols[id].kind == StructuralKind::Function)
            .ok_or_else(|| CompileError::Undeclared {
                line: self.line(),
                name: name.to_string(),
            })?;
        self.advance()?;
        self.expect(&TokenKind::OpenParen)?;

        let mut args = Vec::new();
        if !self.consume(&TokenKind::CloseParen)? {
            loop {
                args.push(self.expression()?);
                if !self.consume(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(&TokenKind::CloseParen)?;
        }

        let params = self.state.symbols[id].members.clone();
        if args.len() < params.len() {
            return Err(self.mismatch(format!(
                "`{}` takes {} arguments, {} given",
                name,
                params.len(),
                args.len()
            )));
        }

        let mut chain: Option<Node> = None;
        for (position, arg) in args.into_iter().enumerate() {
            let arg = match params.get(position) {
                Some(&param) => {
                    let ty = self.state.symbols[param].ty;
                    reconcile(arg, ty, None, &self.state.symbols)
                        .ok_or_else(|| self.incompatible(format!("argument {} of `{}`", position + 1, name)))?
                }
                None if arg.ty.is_scalar() => arg,
                None => return Err(self.mismatch(format!("argument {} of `{}` is not a scalar", position + 1, name))),
            };
            chain = Some(Node::new(
                AstOp::Glue,
                arg.ty,
                chain,
                None,
                Some(arg),
                Payload::Value(position as i64 + 1),
            ));
        }

        let ty = self.state.symbols[id].ty;
        Ok(Node::new(AstOp::FunctionCall, ty, chain, None, None, Payload::Symbol(id)))
    }
}
