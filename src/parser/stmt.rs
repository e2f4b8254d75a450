use std::collections::HashSet;

use crate::{
    analyzer::{reconcile, Type},
    error::{CompileError, Result},
    lexer::TokenKind,
};

use super::{AstOp, Node, Parser, Payload};

impl Parser {
    /// compound_statement = "{" (local_declaration | statement)* "}"
    pub(super) fn compound_statement(&mut self) -> Result<Option<Node>> {
        self.expect(&TokenKind::OpenCurlyBrace)?;
        let mut tree = None;
        while !self.consume(&TokenKind::CloseCurlyBrace)? {
            if let Some(node) = self.block_item()? {
                tree = Some(Node::glue(tree, node));
            }
        }
        Ok(tree)
    }

    fn block_item(&mut self) -> Result<Option<Node>> {
        if self.at_declaration() {
            self.local_declaration()
        } else {
            self.statement()
        }
    }

    /// statement = ";"
    ///           | compound_statement
    ///           | "if" "(" expression ")" statement ("else" statement)?
    ///           | "while" "(" expression ")" statement
    ///           | "for" "(" expression? ";" expression? ";" expression? ")" statement
    ///           | "switch" "(" expression ")" "{" case+ "}"
    ///           | "return" expression? ";"
    ///           | "break" ";"
    ///           | "continue" ";"
    ///           | expression ";"
    fn statement(&mut self) -> Result<Option<Node>> {
        match self.token.kind {
            TokenKind::SemiColon => {
                self.advance()?;
                Ok(None)
            }
            TokenKind::OpenCurlyBrace => self.compound_statement(),
            TokenKind::If => self.if_statement().map(Some),
            TokenKind::While => self.while_statement().map(Some),
            TokenKind::For => self.for_statement().map(Some),
            TokenKind::Switch => self.switch_statement().map(Some),
            TokenKind::Return => self.return_statement().map(Some),
            TokenKind::Break => {
                if self.state.loop_depth == 0 && self.state.switch_depth == 0 {
                    return Err(self.misplaced("break"));
                }
                self.advance()?;
                self.expect(&TokenKind::SemiColon)?;
                Ok(Some(Node::leaf(AstOp::Break, Type::NONE, Payload::None)))
            }
            TokenKind::Continue => {
                if self.state.loop_depth == 0 {
                    return Err(self.misplaced("continue"));
                }
                self.advance()?;
                self.expect(&TokenKind::SemiColon)?;
                Ok(Some(Node::leaf(AstOp::Continue, Type::NONE, Payload::None)))
            }
            TokenKind::Case => Err(self.misplaced("case")),
            TokenKind::Default => Err(self.misplaced("default")),
            _ => {
                let node = self.discarded_expression()?;
                self.expect(&TokenKind::SemiColon)?;
                Ok(Some(node))
            }
        }
    }

    /// Expression evaluated only for its side effects. Its value still passes
    /// through a scratch register, so it must be scalar unless it is a call.
    fn discarded_expression(&mut self) -> Result<Node> {
        let node = self.expression()?;
        if !node.ty.is_scalar() && node.op != AstOp::FunctionCall {
            return Err(self.mismatch(format!(
                "expression of type `{}` used as a statement",
                node.ty
            )));
        }
        Ok(node)
    }

    fn misplaced(&self, keyword: &'static str) -> CompileError {
        CompileError::Misplaced {
            line: self.line(),
            keyword,
        }
    }

    /// Parenthesised condition. Anything but a comparison is tested against zero.
    fn condition(&mut self) -> Result<Node> {
        self.expect(&TokenKind::OpenParen)?;
        let node = self.expression()?;
        self.expect(&TokenKind::CloseParen)?;
        self.to_condition(node)
    }

    fn to_condition(&self, node: Node) -> Result<Node> {
        if !node.ty.is_scalar() {
            return Err(self.mismatch(format!("condition of type `{}`", node.ty)));
        }
        if node.op.is_comparison() {
            return Ok(node);
        }
        Ok(Node::unary(AstOp::ToBool, Type::INT, node, Payload::None))
    }

    fn if_statement(&mut self) -> Result<Node> {
        self.expect(&TokenKind::If)?;
        let cond = self.condition()?;
        let then = self.statement()?;
        let otherwise = if self.consume(&TokenKind::Else)? {
            self.statement()?
        } else {
            None
        };
        Ok(Node::new(AstOp::If, Type::NONE, Some(cond), then, otherwise, Payload::None))
    }

    fn loop_body(&mut self) -> Result<Option<Node>> {
        self.state.loop_depth += 1;
        let body = self.statement();
        self.state.loop_depth -= 1;
        body
    }

    fn while_statement(&mut self) -> Result<Node> {
        self.expect(&TokenKind::While)?;
        let cond = self.condition()?;
        let body = self.loop_body()?;
        Ok(Node::new(AstOp::While, Type::NONE, Some(cond), None, body, Payload::None))
    }

    /// The initializer runs before a `while`; the increment is kept apart from
    /// the body so that `continue` still reaches it.
    fn for_statement(&mut self) -> Result<Node> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::OpenParen)?;

        let init = match self.is(&TokenKind::SemiColon) {
            true => None,
            false => Some(self.discarded_expression()?),
        };
        self.expect(&TokenKind::SemiColon)?;

        let cond = match self.is(&TokenKind::SemiColon) {
            true => Node::int(1, Type::INT),
            false => self.expression()?,
        };
        let cond = self.to_condition(cond)?;
        self.expect(&TokenKind::SemiColon)?;

        let increment = match self.is(&TokenKind::CloseParen) {
            true => None,
            false => Some(self.discarded_expression()?),
        };
        self.expect(&TokenKind::CloseParen)?;

        let body = self.loop_body()?;
        let tree = Node::new(AstOp::While, Type::NONE, Some(cond), increment, body, Payload::None);
        Ok(Node::glue(init, tree))
    }

    /// switch = "switch" "(" expression ")" "{" (("case" constant | "default") ":" block_item*)+ "}"
    fn switch_statement(&mut self) -> Result<Node> {
        self.expect(&TokenKind::Switch)?;
        self.expect(&TokenKind::OpenParen)?;
        let selector = self.expression()?;
        if !selector.ty.is_integral() {
            return Err(self.mismatch(format!("switch on a value of type `{}`", selector.ty)));
        }
        self.expect(&TokenKind::CloseParen)?;
        self.expect(&TokenKind::OpenCurlyBrace)?;

        self.state.switch_depth += 1;
        let cases = self.switch_cases();
        self.state.switch_depth -= 1;
        let cases = cases?;

        if !cases.iter().any(|case| case.op == AstOp::Case) {
            return Err(self.error("switch statement has no case"));
        }

        let count = cases.len() as i64;
        let mut chain = None;
        for mut case in cases.into_iter().rev() {
            case.right = chain.map(Box::new);
            chain = Some(case);
        }
        Ok(Node::new(AstOp::Switch, Type::NONE, Some(selector), None, chain, Payload::Value(count)))
    }

    fn switch_cases(&mut self) -> Result<Vec<Node>> {
        let mut cases = Vec::new();
        let mut seen = HashSet::new();
        let mut has_default = false;

        while !self.consume(&TokenKind::CloseCurlyBrace)? {
            let (op, payload) = match self.advance()?.kind {
                TokenKind::Case => {
                    let value = match self.expression()? {
                        node if node.op == AstOp::IntLit => node.value().unwrap_or_default(),
                        _ => return Err(self.error("case label is not an integer constant")),
                    };
                    if !seen.insert(value) {
                        return Err(self.error(format!("duplicate case value {}", value)));
                    }
                    (AstOp::Case, Payload::Value(value))
                }
                TokenKind::Default => {
                    if has_default {
                        return Err(self.error("multiple default labels in one switch"));
                    }
                    has_default = true;
                    (AstOp::Default, Payload::None)
                }
                other => {
                    return Err(self.error(format!("expected case or default, found {:?}", other)))
                }
            };
            self.expect(&TokenKind::Colon)?;

            let mut body = None;
            while !matches!(
                self.token.kind,
                TokenKind::Case | TokenKind::Default | TokenKind::CloseCurlyBrace
            ) {
                if let Some(node) = self.block_item()? {
                    body = Some(Node::glue(body, node));
                }
            }
            cases.push(Node::new(op, Type::NONE, body, None, None, payload));
        }
        Ok(cases)
    }

    /// return = "return" expression? ";"
    fn return_statement(&mut self) -> Result<Node> {
        self.expect(&TokenKind::Return)?;
        let function = self
            .state
            .current_function
            .ok_or_else(|| self.misplaced("return"))?;
        let ty = self.state.symbols[function].ty;

        if ty.is_void() {
            if !self.is(&TokenKind::SemiColon) {
                return Err(self.mismatch("void function returns a value"));
            }
            self.advance()?;
            return Ok(Node::leaf(AstOp::Return, Type::NONE, Payload::None));
        }

        let value = self.expression()?;
        let value = reconcile(value, ty, None, &self.state.symbols)
            .ok_or_else(|| self.incompatible("return statement"))?;
        self.expect(&TokenKind::SemiColon)?;
        Ok(Node::unary(AstOp::Return, Type::NONE, value, Payload::None))
    }
}
