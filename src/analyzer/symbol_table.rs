use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use log::{debug, trace};
use thiserror::Error;

use crate::codegen::Label;

use super::{Primitive, Type};

/// Index of a symbol in the table's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuralKind {
    Variable,
    Function,
    Array,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    Local,
    Parameter,
    Member,
    StructTag,
    UnionTag,
    EnumConstant,
    EnumTag,
    Typedef,
    Extern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Unassigned,
    /// Frame offset for locals and parameters, byte offset for members.
    Offset(i64),
    /// Label the function's `return` statements jump to.
    EndLabel(Label),
    /// Value of an enum constant.
    Constant(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Parameter,
    Member,
    Struct,
    Union,
    Enum,
    Typedef,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("`{0}` is already declared")]
    DuplicateSymbol(String),

    #[error("`{0}` is already defined")]
    Redeclared(String),

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("no member named `{0}`")]
    UnknownMember(String),

    #[error("`{0}` has no members")]
    EmptyComposite(String),

    #[error("`{0}` has an incomplete type")]
    IncompleteType(String),

    #[error("`{0}` is too large")]
    Oversized(String),
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub kind: StructuralKind,
    pub class: StorageClass,
    /// Element count for arrays, parameter count for functions.
    pub count: usize,
    pub size: usize,
    pub location: Location,
    /// Members of a struct/union, or parameters of a function, in order.
    pub members: Vec<SymbolId>,
    /// A function whose body has been seen.
    pub defined: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ScopeList {
    ids: Vec<SymbolId>,
    by_name: HashMap<String, SymbolId>,
}

impl ScopeList {
    fn push(&mut self, name: &str, id: SymbolId) {
        self.ids.push(id);
        if !name.is_empty() {
            self.by_name.insert(name.to_string(), id);
        }
    }

    fn find(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn ids(&self) -> &[SymbolId] {
        &self.ids
    }
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    globals: ScopeList,
    locals: ScopeList,
    parameters: ScopeList,
    members: ScopeList,
    structs: ScopeList,
    unions: ScopeList,
    enums: ScopeList,
    typedefs: ScopeList,
}

fn align_up(offset: usize, align: usize) -> Option<usize> {
    offset.checked_next_multiple_of(align.max(1))
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0)
    }

    fn scope(&self, scope: Scope) -> &ScopeList {
        match scope {
            Scope::Global => &self.globals,
            Scope::Local => &self.locals,
            Scope::Parameter => &self.parameters,
            Scope::Member => &self.members,
            Scope::Struct => &self.structs,
            Scope::Union => &self.unions,
            Scope::Enum => &self.enums,
            Scope::Typedef => &self.typedefs,
        }
    }

    fn scope_mut(&mut self, scope: Scope) -> &mut ScopeList {
        match scope {
            Scope::Global => &mut self.globals,
            Scope::Local => &mut self.locals,
            Scope::Parameter => &mut self.parameters,
            Scope::Member => &mut self.members,
            Scope::Struct => &mut self.structs,
            Scope::Union => &mut self.unions,
            Scope::Enum => &mut self.enums,
            Scope::Typedef => &mut self.typedefs,
        }
    }

    fn is_taken(&self, scope: Scope, name: &str, class: StorageClass) -> bool {
        if name.is_empty() {
            return false;
        }
        match scope {
            Scope::Global => self.globals.find(name).or(self.parameters.find(name)).is_some(),
            Scope::Local | Scope::Parameter => {
                self.parameters.find(name).or(self.locals.find(name)).is_some()
            }
            Scope::Enum => self.find_enum(name, class).is_some(),
            _ => self.scope(scope).find(name).is_some(),
        }
    }

    /// Appends a new symbol to `scope`. Sizes are derived from the type; the
    /// location is left for the caller (frame layout, enum value, ...).
    pub fn declare(
        &mut self,
        scope: Scope,
        name: &str,
        ty: Type,
        kind: StructuralKind,
        class: StorageClass,
        count: usize,
    ) -> Result<SymbolId, SymbolError> {
        if self.is_taken(scope, name, class) {
            return Err(match scope {
                Scope::Struct | Scope::Union | Scope::Enum | Scope::Typedef => {
                    SymbolError::Redeclared(name.to_string())
                }
                _ => SymbolError::DuplicateSymbol(name.to_string()),
            });
        }

        // Struct and union objects need a complete layout. Typedefs and
        // pointers may name a tag that is defined later.
        let is_object = kind != StructuralKind::Function && class != StorageClass::Typedef;
        if is_object && ty.composite().is_some_and(|id| ty.depth == 0 && !self[id].defined) {
            return Err(SymbolError::IncompleteType(name.to_string()));
        }

        let size = match kind {
            StructuralKind::Variable => ty.size(self),
            StructuralKind::Array => ty
                .size(self)
                .checked_mul(count)
                .ok_or_else(|| SymbolError::Oversized(name.to_string()))?,
            StructuralKind::Function => 0,
        };

        let id = SymbolId(self.symbols.len());
        trace!("declare {:?} `{}`: {} ({:?}, {:?})", scope, name, ty, kind, class);
        self.symbols.push(Symbol {
            name: name.to_string(),
            ty,
            kind,
            class,
            count,
            size,
            location: Location::Unassigned,
            members: Vec::new(),
            defined: false,
        });
        self.scope_mut(scope).push(name, id);
        Ok(id)
    }

    /// Ordinary identifier lookup: parameters, then locals, then globals.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.parameters
            .find(name)
            .or_else(|| self.locals.find(name))
            .or_else(|| self.globals.find(name))
    }

    pub fn find_global(&self, name: &str) -> Option<SymbolId> {
        self.globals.find(name)
    }

    pub fn find_struct(&self, name: &str) -> Option<SymbolId> {
        self.structs.find(name)
    }

    pub fn find_union(&self, name: &str) -> Option<SymbolId> {
        self.unions.find(name)
    }

    pub fn find_typedef(&self, name: &str) -> Option<SymbolId> {
        self.typedefs.find(name)
    }

    /// Enum tags and constants share one list; `class` picks which one is meant.
    pub fn find_enum(&self, name: &str, class: StorageClass) -> Option<SymbolId> {
        self.enums
            .ids
            .iter()
            .rev()
            .copied()
            .find(|&id| self[id].name == name && self[id].class == class)
    }

    pub fn find_member(&self, composite: SymbolId, name: &str) -> Option<SymbolId> {
        self.get(composite)?
            .members
            .iter()
            .copied()
            .find(|&id| self[id].name == name)
    }

    pub fn clear_locals(&mut self) {
        debug!("clearing {} locals", self.locals.ids.len());
        self.locals = ScopeList::default();
    }

    pub fn clear_parameters(&mut self) {
        self.parameters = ScopeList::default();
    }

    /// Detaches the member list being built so a nested composite can be
    /// parsed. Hand it back with [`SymbolTable::restore_members`].
    pub fn take_members(&mut self) -> ScopeList {
        std::mem::take(&mut self.members)
    }

    pub fn restore_members(&mut self, saved: ScopeList) {
        self.members = saved;
    }

    /// Moves the collected members into `composite` and lays them out.
    pub fn finish_composite(&mut self, composite: SymbolId) -> Result<(), SymbolError> {
        let members = std::mem::take(&mut self.members).ids;
        let is_union = self[composite].class == StorageClass::UnionTag;
        if members.is_empty() {
            return Err(SymbolError::EmptyComposite(self[composite].name.clone()));
        }

        let oversized = || SymbolError::Oversized(self[composite].name.clone());
        let mut size: usize = 0;
        let mut align = 1;
        let mut offsets = Vec::with_capacity(members.len());
        for &member in &members {
            let member_align = self[member].ty.alignment(self);
            let member_size = self[member].size;
            align = align.max(member_align);
            if is_union {
                offsets.push(0);
                size = size.max(member_size);
            } else {
                let offset = align_up(size, member_align).ok_or_else(oversized)?;
                offsets.push(offset);
                size = offset.checked_add(member_size).ok_or_else(oversized)?;
            }
        }
        let size = align_up(size, align)
            .filter(|&size| i64::try_from(size).is_ok())
            .ok_or_else(oversized)?;

        for (&member, offset) in members.iter().zip(offsets) {
            self[member].location = Location::Offset(offset as i64);
        }
        let symbol = &mut self[composite];
        symbol.size = size;
        symbol.members = members;
        symbol.defined = true;
        debug!("laid out `{}`: {} bytes", symbol.name, symbol.size);
        Ok(())
    }

    /// Base type named by a typedef.
    pub fn typedef_type(&self, name: &str) -> Result<Type, SymbolError> {
        self.find_typedef(name)
            .map(|id| self[id].ty)
            .ok_or_else(|| SymbolError::UnknownType(name.to_string()))
    }

    pub fn composite_type(&self, id: SymbolId) -> Type {
        match self[id].class {
            StorageClass::UnionTag => Type::new(Primitive::Union(id)),
            _ => Type::new(Primitive::Struct(id)),
        }
    }
}

impl Index<SymbolId> for SymbolTable {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }
}

impl IndexMut<SymbolId> for SymbolTable {
    fn index_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }
}
