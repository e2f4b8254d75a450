use std::fmt::Write;

use crate::analyzer::{SymbolId, SymbolTable, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AstOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LeftShift,
    RightShift,
    BitOr,
    BitAnd,
    BitXor,

    Equals,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    IntLit,
    StrLit,
    Identifier,
    AddressOf,
    Dereference,
    Assign,

    LogicalOr,
    LogicalAnd,
    LogicalNot,
    Negate,
    Invert,
    ToBool,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,

    Widen,
    Scale,

    Glue,
    If,
    While,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Function,
    FunctionCall,
}

impl AstOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            AstOp::Equals
                | AstOp::NotEqual
                | AstOp::LessThan
                | AstOp::GreaterThan
                | AstOp::LessEqual
                | AstOp::GreaterEqual
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    None,
    /// Literal value, string label, argument position, case value or case count.
    Value(i64),
    Scale(usize),
    Symbol(SymbolId),
}

/// One typed AST node. Children are owned; symbols are referenced by id.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub op: AstOp,
    pub ty: Type,
    /// Load the value rather than compute an address to store through.
    pub rvalue: bool,
    pub left: Option<Box<Node>>,
    pub middle: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
    pub payload: Payload,
}

impl Node {
    pub fn new(
        op: AstOp,
        ty: Type,
        left: Option<Node>,
        middle: Option<Node>,
        right: Option<Node>,
        payload: Payload,
    ) -> Self {
        Self {
            op,
            ty,
            rvalue: false,
            left: left.map(Box::new),
            middle: middle.map(Box::new),
            right: right.map(Box::new),
            payload,
        }
    }

    pub fn leaf(op: AstOp, ty: Type, payload: Payload) -> Self {
        Self::new(op, ty, None, None, None, payload)
    }

    pub fn unary(op: AstOp, ty: Type, left: Node, payload: Payload) -> Self {
        Self::new(op, ty, Some(left), None, None, payload)
    }

    pub fn binary(op: AstOp, ty: Type, left: Node, right: Node) -> Self {
        Self::new(op, ty, Some(left), None, Some(right), Payload::None)
    }

    pub fn int(value: i64, ty: Type) -> Self {
        Self::leaf(AstOp::IntLit, ty, Payload::Value(value))
    }

    /// Appends `right` to the statement chain `left`. The chain grows by
    /// wrapping: earlier statements stay in the left child and the newest
    /// one is the right child, so the last statement of a block is always
    /// the top glue's right child.
    pub fn glue(left: Option<Node>, right: Node) -> Node {
        match left {
            Some(left) => Node::binary(AstOp::Glue, Type::NONE, left, right),
            None => right,
        }
    }

    pub fn rvalue(mut self) -> Self {
        self.rvalue = true;
        self
    }

    pub fn value(&self) -> Option<i64> {
        match self.payload {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self.payload {
            Payload::Symbol(id) => Some(id),
            _ => None,
        }
    }

    /// Indented textual form, one node per line.
    pub fn dump(&self, symbols: &SymbolTable) -> String {
        let mut out = String::new();
        self.dump_into(symbols, 0, &mut out);
        out
    }

    fn dump_into(&self, symbols: &SymbolTable, level: usize, out: &mut String) {
        // Glue chains are flattened so long functions stay readable.
        if self.op == AstOp::Glue && self.payload == Payload::None {
            for child in [&self.left, &self.right].into_iter().flatten() {
                child.dump_into(symbols, level, out);
            }
            return;
        }

        let _ = write!(out, "{:indent$}{:?}", "", self.op, indent = level * 2);
        match &self.payload {
            Payload::None => {}
            Payload::Value(v) => {
                let _ = write!(out, " {}", v);
            }
            Payload::Scale(s) => {
                let _ = write!(out, " x{}", s);
            }
            Payload::Symbol(id) => {
                let name = symbols.get(*id).map_or("?", |s| s.name.as_str());
                let _ = write!(out, " {}", name);
            }
        }
        if self.ty != Type::NONE {
            let _ = write!(out, " : {}", self.ty);
        }
        if self.rvalue {
            out.push_str(" rval");
        }
        out.push('\n');

        for child in [&self.left, &self.middle, &self.right].into_iter().flatten() {
            child.dump_into(symbols, level + 1, out);
        }
    }
}
