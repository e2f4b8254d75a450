use std::fmt::{self, Write};

use log::{debug, trace};

use crate::{
    analyzer::{Location, StorageClass, StructuralKind, Symbol, SymbolError, SymbolId, SymbolTable},
    error::{InternalError, Result},
    parser::{AstOp, Node, Payload},
};

use super::{x86, Reg, Registers, ARGUMENT_REGISTERS};

/// Appends one indented instruction to the output.
macro_rules! emit {
    ($self:ident, $($arg:tt)*) => {{
        let _ = writeln!($self.out, "  {}", format_args!($($arg)*));
    }};
}

/// Bytes below `rbp` holding the saved `r12` and `r13`.
const SAVED_REGISTERS_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(pub usize);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{:0>3}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Text,
    Data,
}

/// One element of a global initializer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitValue {
    Int(i64),
    /// Address of a string literal.
    Address(Label),
}

/// Jump targets visible to the statement being generated.
#[derive(Clone, Copy, Debug)]
struct Ctx {
    break_label: Option<Label>,
    continue_label: Option<Label>,
    end_label: Label,
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

fn take(slot: &mut Option<Box<Node>>, op: AstOp) -> Result<Node> {
    slot.take()
        .map(|node| *node)
        .ok_or_else(|| InternalError::UnknownOperator(op).into())
}

fn symbol_of<'a>(node: &Node, symbols: &'a SymbolTable) -> Result<&'a Symbol> {
    match node.payload {
        Payload::Symbol(id) => symbols
            .get(id)
            .ok_or_else(|| InternalError::InvalidSymbol(id.0).into()),
        _ => Err(InternalError::UnknownOperator(node.op).into()),
    }
}

/// Tree-walking generator for Intel-syntax x86-64 assembly. One function is
/// in flight at a time; the frame and register state are reset between them.
#[derive(Debug)]
pub struct CodeGen {
    out: String,
    registers: Registers,
    label_index: usize,
    local_offset: usize,
    /// Words pushed on top of the frame by calls being set up.
    pushed: usize,
    section: Option<Section>,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        Self {
            out: String::from(".intel_syntax noprefix\n"),
            registers: Registers::new(),
            label_index: 0,
            local_offset: SAVED_REGISTERS_SIZE,
            pushed: 0,
            section: None,
        }
    }

    /// Returns the finished assembly text.
    pub fn finish(mut self) -> String {
        self.out
            .push_str("  .section .note.GNU-stack,\"\",@progbits\n");
        self.out
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.label_index);
        self.label_index += 1;
        label
    }

    fn label(&mut self, label: Label) {
        let _ = writeln!(self.out, "{}:", label);
    }

    fn section(&mut self, section: Section) {
        if self.section != Some(section) {
            let _ = match section {
                Section::Text => writeln!(self.out, "  .text"),
                Section::Data => writeln!(self.out, "  .data"),
            };
            self.section = Some(section);
        }
    }

    /// Resets the per-function state before a function body is parsed.
    pub fn begin_function(&mut self) {
        self.registers.free_all();
        self.local_offset = SAVED_REGISTERS_SIZE;
        self.pushed = 0;
    }

    /// Reserves a stack slot of `size` bytes and returns its offset from
    /// `rbp`, or `None` once the frame no longer fits.
    pub fn allocate_local(&mut self, size: usize) -> Option<i64> {
        let slot = size.max(4);
        let align = if slot >= 8 { 8 } else { 4 };
        let end = self.local_offset.checked_add(slot)?.checked_next_multiple_of(align)?;
        // The preamble rounds the frame up to 16 bytes.
        i64::try_from(end.checked_next_multiple_of(16)?).ok()?;
        self.local_offset = end;
        trace!("local slot of {} bytes at rbp-{}", size, end);
        Some(-(end as i64))
    }

    /// Gives every parameter of `function` its location: a stack slot for
    /// register-passed parameters, the caller's frame for the rest.
    pub fn assign_parameters(
        &mut self,
        function: SymbolId,
        symbols: &mut SymbolTable,
    ) -> std::result::Result<(), SymbolError> {
        let parameters = symbols[function].members.clone();
        for (position, &param) in parameters.iter().enumerate() {
            let offset = if position < ARGUMENT_REGISTERS {
                self.allocate_local(symbols[param].size)
                    .ok_or_else(|| SymbolError::Oversized(symbols[param].name.clone()))?
            } else {
                16 + 8 * (position - ARGUMENT_REGISTERS) as i64
            };
            symbols[param].location = Location::Offset(offset);
        }
        Ok(())
    }

    /// Emits a NUL-terminated string to the data segment.
    pub fn string_literal(&mut self, text: &str) -> Label {
        let label = self.new_label();
        self.section(Section::Data);
        self.label(label);
        let bytes = text
            .bytes()
            .chain(std::iter::once(0))
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",");
        emit!(self, ".byte {}", bytes);
        label
    }

    /// Emits storage for a global variable or array. Missing initializer
    /// elements are zero.
    pub fn global(&mut self, id: SymbolId, init: &[InitValue], symbols: &SymbolTable) -> Result<()> {
        let symbol = symbols.get(id).ok_or(InternalError::InvalidSymbol(id.0))?;
        if symbol.class == StorageClass::Extern || symbol.kind == StructuralKind::Function {
            return Ok(());
        }
        debug!("global `{}` ({} bytes)", symbol.name, symbol.size);

        let ty = symbol.ty;
        self.section(Section::Data);
        emit!(self, ".globl {}", symbol.name);
        emit!(self, ".balign {}", ty.alignment(symbols));
        let _ = writeln!(self.out, "{}:", symbol.name);

        if ty.is_composite() {
            emit!(self, ".zero {}", symbol.size.max(1));
            return Ok(());
        }

        let directive = x86::data_directive(ty.size(symbols), ty)?;
        for i in 0..symbol.count.max(1) {
            match init.get(i) {
                Some(InitValue::Int(value)) => emit!(self, "{} {}", directive, value),
                Some(InitValue::Address(label)) => emit!(self, ".quad {}", label),
                None => emit!(self, "{} 0", directive),
            }
        }
        Ok(())
    }

    /// Generates a complete function from its `Function` node.
    pub fn function(&mut self, mut tree: Node, symbols: &mut SymbolTable) -> Result<()> {
        let id = match (tree.op, tree.payload) {
            (AstOp::Function, Payload::Symbol(id)) => id,
            _ => return Err(InternalError::UnknownOperator(tree.op).into()),
        };
        let end_label = self.new_label();
        symbols[id].location = Location::EndLabel(end_label);
        debug!("generating function `{}`", symbols[id].name);

        self.preamble(id, symbols)?;
        let ctx = Ctx {
            break_label: None,
            continue_label: None,
            end_label,
        };
        if let Some(body) = tree.left.take() {
            self.gen(*body, &ctx, symbols)?;
        }
        self.registers.free_all();
        self.postamble(end_label);
        Ok(())
    }

    fn preamble(&mut self, id: SymbolId, symbols: &SymbolTable) -> Result<()> {
        let function = &symbols[id];
        let frame = align_up(self.local_offset, 16);

        self.section(Section::Text);
        emit!(self, ".globl {}", function.name);
        let _ = writeln!(self.out, "{}:", function.name);
        emit!(self, "push rbp");
        emit!(self, "mov rbp, rsp");
        emit!(self, "sub rsp, {}", frame);
        emit!(self, "mov QWORD PTR [rbp-8], r12");
        emit!(self, "mov QWORD PTR [rbp-16], r13");

        for (position, &param) in function.members.iter().enumerate().take(ARGUMENT_REGISTERS) {
            let param = &symbols[param];
            let store = x86::store(
                Reg::argument(position)?,
                param.size,
                param.ty,
                &x86::memory_operand(param),
            )?;
            emit!(self, "{}", store);
        }
        Ok(())
    }

    fn postamble(&mut self, end_label: Label) {
        self.label(end_label);
        emit!(self, "mov r12, QWORD PTR [rbp-8]");
        emit!(self, "mov r13, QWORD PTR [rbp-16]");
        emit!(self, "mov rsp, rbp");
        emit!(self, "pop rbp");
        emit!(self, "ret");
    }

    fn gen_value(&mut self, node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Reg> {
        let op = node.op;
        self.gen(node, ctx, symbols)?
            .ok_or_else(|| InternalError::UnknownOperator(op).into())
    }

    /// Generates `node` and returns the register holding its value, if any.
    fn gen(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Option<Reg>> {
        let op = node.op;
        match op {
            AstOp::Glue => {
                for child in [node.left.take(), node.right.take()].into_iter().flatten() {
                    self.gen(*child, ctx, symbols)?;
                    self.registers.free_all();
                }
                Ok(None)
            }
            AstOp::If => self.gen_if(node, ctx, symbols).map(|_| None),
            AstOp::While => self.gen_while(node, ctx, symbols).map(|_| None),
            AstOp::Switch => self.gen_switch(node, ctx, symbols).map(|_| None),
            AstOp::FunctionCall => self.gen_call(node, ctx, symbols),
            AstOp::LogicalAnd | AstOp::LogicalOr => self.gen_logical(node, ctx, symbols).map(Some),
            AstOp::PreIncrement | AstOp::PreDecrement | AstOp::PostIncrement | AstOp::PostDecrement => {
                self.gen_increment(node, ctx, symbols).map(Some)
            }
            AstOp::Assign => self.gen_assign(node, ctx, symbols).map(Some),

            AstOp::Return => {
                if let Some(value) = node.left.take() {
                    let reg = self.gen_value(*value, ctx, symbols)?;
                    emit!(self, "mov rax, {}", reg.q());
                }
                emit!(self, "jmp {}", ctx.end_label);
                Ok(None)
            }
            AstOp::Break => {
                let label = ctx
                    .break_label
                    .ok_or(InternalError::MissingJumpTarget(op))?;
                emit!(self, "jmp {}", label);
                Ok(None)
            }
            AstOp::Continue => {
                let label = ctx
                    .continue_label
                    .ok_or(InternalError::MissingJumpTarget(op))?;
                emit!(self, "jmp {}", label);
                Ok(None)
            }

            AstOp::IntLit => {
                let reg = self.registers.allocate()?;
                emit!(self, "mov {}, {}", reg.q(), node.value().unwrap_or_default());
                Ok(Some(reg))
            }
            AstOp::StrLit => {
                let reg = self.registers.allocate()?;
                let label = Label(node.value().unwrap_or_default() as usize);
                emit!(self, "lea {}, {}[rip]", reg.q(), label);
                Ok(Some(reg))
            }
            AstOp::Identifier if node.rvalue => {
                let symbol = symbol_of(&node, symbols)?;
                let reg = self.registers.allocate()?;
                let load = x86::load(
                    reg,
                    node.ty.size(symbols),
                    node.ty,
                    &x86::memory_operand(symbol),
                )?;
                emit!(self, "{}", load);
                Ok(Some(reg))
            }
            AstOp::Identifier | AstOp::AddressOf => {
                let symbol = symbol_of(&node, symbols)?;
                let reg = self.registers.allocate()?;
                emit!(self, "lea {}, {}", reg.q(), x86::memory_operand(symbol));
                Ok(Some(reg))
            }
            AstOp::Dereference => {
                let reg = self.gen_value(take(&mut node.left, op)?, ctx, symbols)?;
                if node.rvalue {
                    let memory = format!("[{}]", reg.q());
                    let load = x86::load(reg, node.ty.size(symbols), node.ty, &memory)?;
                    emit!(self, "{}", load);
                }
                Ok(Some(reg))
            }

            AstOp::Widen => self.gen(take(&mut node.left, op)?, ctx, symbols),
            AstOp::Scale => {
                let reg = self.gen_value(take(&mut node.left, op)?, ctx, symbols)?;
                match node.payload {
                    Payload::Scale(2) => emit!(self, "sal {}, 1", reg.q()),
                    Payload::Scale(4) => emit!(self, "sal {}, 2", reg.q()),
                    Payload::Scale(8) => emit!(self, "sal {}, 3", reg.q()),
                    Payload::Scale(size) => emit!(self, "imul {}, {}, {}", reg.q(), reg.q(), size),
                    _ => return Err(InternalError::UnknownOperator(op).into()),
                }
                Ok(Some(reg))
            }

            AstOp::Negate | AstOp::Invert | AstOp::LogicalNot | AstOp::ToBool => {
                let reg = self.gen_value(take(&mut node.left, op)?, ctx, symbols)?;
                match op {
                    AstOp::Negate => emit!(self, "neg {}", reg.q()),
                    AstOp::Invert => emit!(self, "not {}", reg.q()),
                    _ => {
                        let set = if op == AstOp::LogicalNot { "sete" } else { "setne" };
                        emit!(self, "test {}, {}", reg.q(), reg.q());
                        emit!(self, "{} {}", set, reg.b());
                        emit!(self, "movzx {}, {}", reg.q(), reg.b());
                    }
                }
                Ok(Some(reg))
            }

            AstOp::Add
            | AstOp::Subtract
            | AstOp::Multiply
            | AstOp::Divide
            | AstOp::Modulo
            | AstOp::LeftShift
            | AstOp::RightShift
            | AstOp::BitOr
            | AstOp::BitAnd
            | AstOp::BitXor
            | AstOp::Equals
            | AstOp::NotEqual
            | AstOp::LessThan
            | AstOp::GreaterThan
            | AstOp::LessEqual
            | AstOp::GreaterEqual => {
                let left = self.gen_value(take(&mut node.left, op)?, ctx, symbols)?;
                let right = self.gen_value(take(&mut node.right, op)?, ctx, symbols)?;
                self.gen_binary(op, left, right)?;
                Ok(Some(left))
            }

            AstOp::Case | AstOp::Default | AstOp::Function => {
                Err(InternalError::UnknownOperator(op).into())
            }
        }
    }

    /// `left = left op right`; frees `right`.
    fn gen_binary(&mut self, op: AstOp, left: Reg, right: Reg) -> Result<()> {
        let (l, r) = (left.q(), right.q());
        match op {
            AstOp::Add => emit!(self, "add {}, {}", l, r),
            AstOp::Subtract => emit!(self, "sub {}, {}", l, r),
            AstOp::Multiply => emit!(self, "imul {}, {}", l, r),
            AstOp::BitOr => emit!(self, "or {}, {}", l, r),
            AstOp::BitAnd => emit!(self, "and {}, {}", l, r),
            AstOp::BitXor => emit!(self, "xor {}, {}", l, r),
            AstOp::Divide | AstOp::Modulo => {
                emit!(self, "mov rax, {}", l);
                emit!(self, "cqo");
                emit!(self, "idiv {}", r);
                let result = if op == AstOp::Divide { "rax" } else { "rdx" };
                emit!(self, "mov {}, {}", l, result);
            }
            AstOp::LeftShift | AstOp::RightShift => {
                let shift = if op == AstOp::LeftShift { "sal" } else { "sar" };
                emit!(self, "mov rcx, {}", r);
                emit!(self, "{} {}, cl", shift, l);
            }
            _ => {
                let cc = x86::condition_code(op)?;
                emit!(self, "cmp {}, {}", l, r);
                emit!(self, "set{} {}", cc, left.b());
                emit!(self, "movzx {}, {}", l, left.b());
            }
        }
        self.registers.free(right)?;
        Ok(())
    }

    fn gen_assign(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Reg> {
        let op = node.op;
        let value = self.gen_value(take(&mut node.left, op)?, ctx, symbols)?;
        let mut target = take(&mut node.right, op)?;
        let size = target.ty.size(symbols);

        match target.op {
            AstOp::Identifier => {
                let symbol = symbol_of(&target, symbols)?;
                let store = x86::store(value, size, target.ty, &x86::memory_operand(symbol))?;
                emit!(self, "{}", store);
            }
            AstOp::Dereference => {
                let address = self.gen_value(take(&mut target.left, target.op)?, ctx, symbols)?;
                let store = x86::store(value, size, target.ty, &format!("[{}]", address.q()))?;
                emit!(self, "{}", store);
                self.registers.free(address)?;
            }
            other => return Err(InternalError::UnknownOperator(other).into()),
        }
        Ok(value)
    }

    /// Pre/post increment and decrement, applied directly to memory around
    /// the load of the value.
    fn gen_increment(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Reg> {
        let op = node.op;
        let ty = node.ty;
        let size = ty.size(symbols);
        let step = match ty.value_at() {
            Ok(pointee) => pointee.size(symbols).max(1),
            Err(_) => 1,
        };

        let mut target = take(&mut node.left, op)?;
        let (memory, address) = match target.op {
            AstOp::Identifier => (x86::memory_operand(symbol_of(&target, symbols)?), None),
            AstOp::Dereference => {
                let address = self.gen_value(take(&mut target.left, target.op)?, ctx, symbols)?;
                (format!("[{}]", address.q()), Some(address))
            }
            other => return Err(InternalError::UnknownOperator(other).into()),
        };

        let directive = x86::size_directive(size, ty)?;
        let instruction = match op {
            AstOp::PreIncrement | AstOp::PostIncrement => "add",
            _ => "sub",
        };
        let pre = matches!(op, AstOp::PreIncrement | AstOp::PreDecrement);

        let reg = self.registers.allocate()?;
        if pre {
            emit!(self, "{} {} {}, {}", instruction, directive, memory, step);
        }
        let load = x86::load(reg, size, ty, &memory)?;
        emit!(self, "{}", load);
        if !pre {
            emit!(self, "{} {} {}, {}", instruction, directive, memory, step);
        }

        if let Some(address) = address {
            self.registers.free(address)?;
        }
        Ok(reg)
    }

    /// Short-circuit `&&` and `||`, producing 0 or 1.
    fn gen_logical(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Reg> {
        let op = node.op;
        let short_circuit = self.new_label();
        let end = self.new_label();
        let (jump, short_value) = if op == AstOp::LogicalAnd {
            ("je", 0)
        } else {
            ("jne", 1)
        };

        for side in [take(&mut node.left, op)?, take(&mut node.right, op)?] {
            let reg = self.gen_value(side, ctx, symbols)?;
            emit!(self, "test {}, {}", reg.q(), reg.q());
            emit!(self, "{} {}", jump, short_circuit);
            self.registers.free(reg)?;
        }

        let reg = self.registers.allocate()?;
        emit!(self, "mov {}, {}", reg.q(), 1 - short_value);
        emit!(self, "jmp {}", end);
        self.label(short_circuit);
        emit!(self, "mov {}, {}", reg.q(), short_value);
        self.label(end);
        Ok(reg)
    }

    /// Evaluates a condition and jumps to `false_label` when it does not hold.
    fn gen_condition(&mut self, cond: Node, false_label: Label, ctx: &Ctx, symbols: &SymbolTable) -> Result<()> {
        let mut cond = cond;
        if cond.op == AstOp::ToBool {
            cond = take(&mut cond.left, AstOp::ToBool)?;
        }

        if cond.op.is_comparison() {
            let op = cond.op;
            let left = self.gen_value(take(&mut cond.left, op)?, ctx, symbols)?;
            let right = self.gen_value(take(&mut cond.right, op)?, ctx, symbols)?;
            emit!(self, "cmp {}, {}", left.q(), right.q());
            emit!(self, "j{} {}", x86::inverted_condition_code(op)?, false_label);
        } else {
            let reg = self.gen_value(cond, ctx, symbols)?;
            emit!(self, "test {}, {}", reg.q(), reg.q());
            emit!(self, "je {}", false_label);
        }
        self.registers.free_all();
        Ok(())
    }

    fn gen_if(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<()> {
        let false_label = self.new_label();
        let end_label = match node.right {
            Some(_) => Some(self.new_label()),
            None => None,
        };

        self.gen_condition(take(&mut node.left, AstOp::If)?, false_label, ctx, symbols)?;
        if let Some(body) = node.middle.take() {
            self.gen(*body, ctx, symbols)?;
            self.registers.free_all();
        }
        if let Some(end) = end_label {
            emit!(self, "jmp {}", end);
        }

        self.label(false_label);
        if let (Some(otherwise), Some(end)) = (node.right.take(), end_label) {
            self.gen(*otherwise, ctx, symbols)?;
            self.registers.free_all();
            self.label(end);
        }
        Ok(())
    }

    /// Loops have a single backward jump. A `for` increment sits in the
    /// middle child so `continue` can target it.
    fn gen_while(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<()> {
        let start = self.new_label();
        let end = self.new_label();
        let increment = node.middle.take();
        let continue_label = match increment {
            Some(_) => self.new_label(),
            None => start,
        };

        self.label(start);
        self.gen_condition(take(&mut node.left, AstOp::While)?, end, ctx, symbols)?;

        let inner = Ctx {
            break_label: Some(end),
            continue_label: Some(continue_label),
            ..*ctx
        };
        if let Some(body) = node.right.take() {
            self.gen(*body, &inner, symbols)?;
            self.registers.free_all();
        }
        if let Some(increment) = increment {
            self.label(continue_label);
            self.gen(*increment, &inner, symbols)?;
            self.registers.free_all();
        }

        emit!(self, "jmp {}", start);
        self.label(end);
        Ok(())
    }

    /// Case bodies first, each ending in a jump to the end label, then the
    /// selector and a linear compare chain.
    fn gen_switch(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<()> {
        let selector = take(&mut node.left, AstOp::Switch)?;
        let dispatch = self.new_label();
        let end = self.new_label();
        emit!(self, "jmp {}", dispatch);

        let inner = Ctx {
            break_label: Some(end),
            ..*ctx
        };
        let mut cases: Vec<(Option<i64>, Label)> = Vec::new();
        let mut next = node.right.take();
        while let Some(mut case) = next {
            let value = match case.op {
                AstOp::Case => Some(case.value().ok_or(InternalError::UnknownOperator(case.op))?),
                AstOp::Default => None,
                other => return Err(InternalError::UnknownOperator(other).into()),
            };
            let label = self.new_label();
            cases.push((value, label));

            self.label(label);
            if let Some(body) = case.left.take() {
                self.gen(*body, &inner, symbols)?;
                self.registers.free_all();
            }
            emit!(self, "jmp {}", end);
            next = case.right.take();
        }

        self.label(dispatch);
        let selector = self.gen_value(selector, ctx, symbols)?;
        for &(value, label) in &cases {
            let Some(value) = value else { continue };
            if i32::try_from(value).is_ok() {
                emit!(self, "cmp {}, {}", selector.q(), value);
            } else {
                emit!(self, "mov rax, {}", value);
                emit!(self, "cmp {}, rax", selector.q());
            }
            emit!(self, "je {}", label);
        }
        let fallback = cases
            .iter()
            .find(|(value, _)| value.is_none())
            .map_or(end, |&(_, label)| label);
        emit!(self, "jmp {}", fallback);
        self.label(end);
        Ok(())
    }

    /// Arguments are evaluated right to left and pushed; the first six are
    /// then popped into their registers and the rest stay on the stack.
    fn gen_call(&mut self, mut node: Node, ctx: &Ctx, symbols: &SymbolTable) -> Result<Option<Reg>> {
        let name = symbol_of(&node, symbols)?.name.clone();

        let mut args = Vec::new();
        let mut next = node.left.take();
        while let Some(mut glue) = next {
            args.push(take(&mut glue.right, AstOp::FunctionCall)?);
            next = glue.left.take();
        }
        let argc = args.len();
        let stack_args = argc.saturating_sub(ARGUMENT_REGISTERS);

        let spilled = self.registers.busy();
        for &reg in &spilled {
            emit!(self, "push {}", reg.q());
            self.registers.free(reg)?;
        }
        self.pushed += spilled.len();

        let padding = (self.pushed + stack_args) % 2;
        if padding == 1 {
            emit!(self, "sub rsp, 8");
        }
        self.pushed += padding;

        for arg in args {
            let reg = self.gen_value(arg, ctx, symbols)?;
            emit!(self, "push {}", reg.q());
            self.registers.free(reg)?;
            self.pushed += 1;
        }
        for position in 0..argc.min(ARGUMENT_REGISTERS) {
            emit!(self, "pop {}", Reg::argument(position)?.q());
            self.pushed -= 1;
        }

        emit!(self, "mov eax, 0");
        emit!(self, "call {}", name);

        let cleanup = stack_args + padding;
        if cleanup > 0 {
            emit!(self, "add rsp, {}", 8 * cleanup);
        }
        self.pushed -= cleanup;
        for &reg in spilled.iter().rev() {
            emit!(self, "pop {}", reg.q());
            self.registers.reclaim(reg)?;
        }
        self.pushed -= spilled.len();

        if node.ty.is_void() {
            return Ok(None);
        }
        let reg = self.registers.allocate()?;
        match node.ty.size(symbols) {
            1 => emit!(self, "movzx {}, al", reg.q()),
            2 => emit!(self, "movsx {}, ax", reg.q()),
            4 => emit!(self, "movsxd {}, eax", reg.q()),
            8 => emit!(self, "mov {}, rax", reg.q()),
            _ => return Err(InternalError::UnrepresentableType(node.ty).into()),
        }
        Ok(Some(reg))
    }
}
