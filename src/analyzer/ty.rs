use std::fmt;

use thiserror::Error;

use crate::parser::{AstOp, Node, Payload};

use super::{SymbolId, SymbolTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    None,
    Void,
    Char,
    Short,
    Int,
    Long,
    Struct(SymbolId),
    Union(SymbolId),
}

/// A primitive kind plus a pointer indirection depth. Depth 0 is a value of
/// the primitive itself, depth N a pointer to depth N-1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    pub prim: Primitive,
    pub depth: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("cannot dereference a value of non-pointer type `{0}`")]
    InvalidType(Type),

    #[error("too many levels of indirection on `{0}`")]
    PointerDepthOverflow(Type),
}

impl Type {
    pub const NONE: Type = Type::new(Primitive::None);
    pub const VOID: Type = Type::new(Primitive::Void);
    pub const CHAR: Type = Type::new(Primitive::Char);
    pub const SHORT: Type = Type::new(Primitive::Short);
    pub const INT: Type = Type::new(Primitive::Int);
    pub const LONG: Type = Type::new(Primitive::Long);

    pub const fn new(prim: Primitive) -> Self {
        Self { prim, depth: 0 }
    }

    pub fn is_integral(self) -> bool {
        self.depth == 0
            && matches!(
                self.prim,
                Primitive::Char | Primitive::Short | Primitive::Int | Primitive::Long
            )
    }

    pub fn is_pointer(self) -> bool {
        self.depth > 0
    }

    pub fn is_void(self) -> bool {
        self == Type::VOID
    }

    /// Struct or union value (not a pointer to one).
    pub fn is_composite(self) -> bool {
        self.depth == 0 && self.composite().is_some()
    }

    /// Values that fit in a register: integers and pointers.
    pub fn is_scalar(self) -> bool {
        self.is_integral() || self.is_pointer()
    }

    pub fn composite(self) -> Option<SymbolId> {
        match self.prim {
            Primitive::Struct(id) | Primitive::Union(id) => Some(id),
            _ => None,
        }
    }

    pub fn pointer_to(self) -> Result<Type, TypeError> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or(TypeError::PointerDepthOverflow(self))?;
        Ok(Type { depth, ..self })
    }

    pub fn value_at(self) -> Result<Type, TypeError> {
        if self.depth == 0 {
            return Err(TypeError::InvalidType(self));
        }
        Ok(Type {
            depth: self.depth - 1,
            ..self
        })
    }

    pub fn size(self, symbols: &SymbolTable) -> usize {
        if self.depth > 0 {
            return 8;
        }
        match self.prim {
            Primitive::None | Primitive::Void => 0,
            Primitive::Char => 1,
            Primitive::Short => 2,
            Primitive::Int => 4,
            Primitive::Long => 8,
            Primitive::Struct(id) | Primitive::Union(id) => {
                symbols.get(id).map_or(0, |symbol| symbol.size)
            }
        }
    }

    /// Natural alignment. A composite is aligned like its most demanding member.
    pub fn alignment(self, symbols: &SymbolTable) -> usize {
        match self.prim {
            Primitive::Struct(id) | Primitive::Union(id) if self.depth == 0 => symbols
                .get(id)
                .map(|composite| {
                    composite
                        .members
                        .iter()
                        .filter_map(|&member| symbols.get(member))
                        .map(|member| member.ty.alignment(symbols))
                        .max()
                        .unwrap_or(1)
                })
                .unwrap_or(1),
            _ => self.size(symbols).max(1),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.prim {
            Primitive::None => "<none>",
            Primitive::Void => "void",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Struct(_) => "struct",
            Primitive::Union(_) => "union",
        };
        write!(f, "{}", base)?;
        if self.depth > 0 {
            write!(f, " {}", "*".repeat(self.depth as usize))?;
        }
        Ok(())
    }
}

/// How a subtree has to be adjusted to be used where another type is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coercion {
    Keep,
    Widen,
    /// Multiply the integral operand by the pointee size.
    Scale(usize),
}

/// Decides whether a value of type `from` can be used as `to`. `op` is the
/// binary operator the value is an operand of, or `None` for assignments,
/// arguments and return values.
pub fn coercion(from: Type, to: Type, op: Option<AstOp>, symbols: &SymbolTable) -> Option<Coercion> {
    if from == to {
        return Some(Coercion::Keep);
    }

    if from.is_integral() && to.is_integral() {
        return (from.size(symbols) < to.size(symbols)).then_some(Coercion::Widen);
    }

    let void_pointer = Type::VOID.pointer_to().ok();
    if op.is_none() && from.is_pointer() && to.is_pointer() {
        let either_void = Some(from) == void_pointer || Some(to) == void_pointer;
        return either_void.then_some(Coercion::Keep);
    }

    if matches!(op, Some(AstOp::Add | AstOp::Subtract)) && from.is_integral() && to.is_pointer() {
        let pointee = to.value_at().ok()?.size(symbols);
        return Some(if pointee > 1 {
            Coercion::Scale(pointee)
        } else {
            Coercion::Keep
        });
    }

    None
}

/// Wraps `tree` according to `coercion` so that it produces a value of type `to`.
pub fn apply(tree: Node, coercion: Coercion, to: Type) -> Node {
    match coercion {
        Coercion::Keep => tree,
        Coercion::Widen => Node::unary(AstOp::Widen, to, tree, Payload::None),
        Coercion::Scale(size) => Node::unary(AstOp::Scale, to, tree, Payload::Scale(size)),
    }
}

pub fn reconcile(tree: Node, to: Type, op: Option<AstOp>, symbols: &SymbolTable) -> Option<Node> {
    let coercion = coercion(tree.ty, to, op, symbols)?;
    Some(apply(tree, coercion, to))
}
