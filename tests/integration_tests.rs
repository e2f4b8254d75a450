use spcc::analyzer::*;
use spcc::error::CompileError;
use spcc::lexer::{Lexer, TokenKind};
use spcc::parser::*;
use spcc::{compile, compile_with, CompileOptions};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wrap_in_main(input: &str) -> String {
    format!("int main() {{{}}}", input)
}

fn declarations(input: &str) -> Parser {
    init_logger();
    let mut parser = Parser::new(input).unwrap();
    parser.parse_declarations().unwrap();
    parser
}

fn tokens(input: &str) -> Vec<TokenKind> {
    let mut lexer = Lexer::new(input);
    let mut kinds = Vec::new();
    loop {
        let token = lexer.scan().unwrap();
        if token.kind == TokenKind::Eof {
            return kinds;
        }
        kinds.push(token.kind);
    }
}

fn offset(symbols: &SymbolTable, composite: SymbolId, member: &str) -> Location {
    let id = symbols.find_member(composite, member).unwrap();
    symbols[id].location
}

/// Labels defined before the `jmp` that targets them.
fn backward_jumps(assembly: &str) -> usize {
    let mut defined = Vec::new();
    let mut count = 0;
    for line in assembly.lines().map(str::trim) {
        if let Some(label) = line.strip_suffix(':') {
            defined.push(label.to_string());
        } else if let Some(target) = line.strip_prefix("jmp ") {
            if defined.iter().any(|label| label == target) {
                count += 1;
            }
        }
    }
    count
}

#[test]
fn lexer_tokens() {
    assert_eq!(
        tokens("x <<= 1; // gone\n y->z != 0x1f /* gone */ 'a'"),
        vec![
            TokenKind::Ident("x".to_string()),
            TokenKind::LeftShift,
            TokenKind::Equal,
            TokenKind::IntLit(1),
            TokenKind::SemiColon,
            TokenKind::Ident("y".to_string()),
            TokenKind::Arrow,
            TokenKind::Ident("z".to_string()),
            TokenKind::NotEqual,
            TokenKind::IntLit(31),
            TokenKind::IntLit(97),
        ]
    );
    assert_eq!(
        tokens(r#""a\tb\n""#),
        vec![TokenKind::StrLit("a\tb\n".to_string())]
    );
}

#[test]
fn lexer_push_back_once() {
    let mut lexer = Lexer::new("a b");
    let a = lexer.scan().unwrap();
    lexer.push_back(a.clone()).unwrap();
    assert!(lexer.push_back(a.clone()).is_err());
    assert_eq!(lexer.scan().unwrap(), a);
}

#[test]
fn lexer_unterminated_comment() {
    let mut lexer = Lexer::new("int /* never closed");
    assert!(lexer.scan().is_ok());
    assert!(matches!(lexer.scan(), Err(CompileError::Syntax { .. })));
}

#[test]
fn literal_types() {
    assert_eq!(literal_type(0), Type::CHAR);
    assert_eq!(literal_type(255), Type::CHAR);
    assert_eq!(literal_type(256), Type::INT);
    assert_eq!(literal_type(-1), Type::INT);
    assert_eq!(literal_type(1 << 40), Type::LONG);
}

#[test]
fn primitive_sizes() {
    let symbols = SymbolTable::new();
    assert_eq!(Type::CHAR.size(&symbols), 1);
    assert_eq!(Type::SHORT.size(&symbols), 2);
    assert_eq!(Type::INT.size(&symbols), 4);
    assert_eq!(Type::LONG.size(&symbols), 8);
    assert_eq!(Type::CHAR.pointer_to().unwrap().size(&symbols), 8);
}

#[test]
fn pointer_levels() {
    let pp = Type::INT.pointer_to().unwrap().pointer_to().unwrap();
    assert_eq!(pp.depth, 2);
    assert_eq!(pp.value_at().unwrap().value_at().unwrap(), Type::INT);
    assert_eq!(Type::INT.value_at(), Err(TypeError::InvalidType(Type::INT)));
    assert_eq!(pp.to_string(), "int **");
}

#[test]
fn reconcile_integers() {
    let symbols = SymbolTable::new();
    let widened = reconcile(Node::int(3, Type::CHAR), Type::LONG, None, &symbols).unwrap();
    assert_eq!(widened.op, AstOp::Widen);
    assert_eq!(widened.ty, Type::LONG);

    let same = reconcile(Node::int(3, Type::INT), Type::INT, None, &symbols).unwrap();
    assert_eq!(same.op, AstOp::IntLit);

    // Narrowing is never implicit.
    assert!(reconcile(Node::int(3, Type::LONG), Type::INT, None, &symbols).is_none());
}

#[test]
fn reconcile_pointers() {
    let symbols = SymbolTable::new();
    let int_ptr = Type::INT.pointer_to().unwrap();
    let char_ptr = Type::CHAR.pointer_to().unwrap();
    let void_ptr = Type::VOID.pointer_to().unwrap();

    let scaled = reconcile(Node::int(2, Type::INT), int_ptr, Some(AstOp::Add), &symbols).unwrap();
    assert_eq!(scaled.op, AstOp::Scale);
    assert_eq!(scaled.payload, Payload::Scale(4));

    let unscaled = reconcile(Node::int(2, Type::INT), char_ptr, Some(AstOp::Add), &symbols).unwrap();
    assert_eq!(unscaled.op, AstOp::IntLit);

    assert!(coercion(int_ptr, void_ptr, None, &symbols).is_some());
    assert!(coercion(void_ptr, char_ptr, None, &symbols).is_some());
    assert!(coercion(int_ptr, char_ptr, None, &symbols).is_none());
    assert!(coercion(Type::INT, int_ptr, Some(AstOp::Multiply), &symbols).is_none());
}

#[test]
fn struct_layout() {
    let parser = declarations("struct s { char a; int b; long c; };");
    let symbols = &parser.state().symbols;
    let s = symbols.find_struct("s").unwrap();
    assert_eq!(offset(symbols, s, "a"), Location::Offset(0));
    assert_eq!(offset(symbols, s, "b"), Location::Offset(4));
    assert_eq!(offset(symbols, s, "c"), Location::Offset(8));
    assert_eq!(symbols[s].size, 16);
    assert_eq!(symbols.composite_type(s).alignment(symbols), 8);
}

#[test]
fn struct_size_padded_to_alignment() {
    let parser = declarations("struct s { int a; char b; };");
    let symbols = &parser.state().symbols;
    let s = symbols.find_struct("s").unwrap();
    assert_eq!(offset(symbols, s, "b"), Location::Offset(4));
    assert_eq!(symbols[s].size, 8);
}

#[test]
fn union_layout() {
    let parser = declarations("union u { char a; long b; int c; };");
    let symbols = &parser.state().symbols;
    let u = symbols.find_union("u").unwrap();
    for member in ["a", "b", "c"] {
        assert_eq!(offset(symbols, u, member), Location::Offset(0));
    }
    assert_eq!(symbols[u].size, 8);
}

#[test]
fn enum_constants_and_typedefs() {
    let parser = declarations("enum color { red, green = 5, blue }; typedef long word;");
    let symbols = &parser.state().symbols;
    let blue = symbols.find_enum("blue", StorageClass::EnumConstant).unwrap();
    assert_eq!(symbols[blue].location, Location::Constant(6));
    assert!(symbols.find_enum("color", StorageClass::EnumTag).is_some());
    assert_eq!(symbols.typedef_type("word"), Ok(Type::LONG));
}

#[test]
fn local_shadows_global() {
    let mut symbols = SymbolTable::new();
    let global = symbols
        .declare(Scope::Global, "x", Type::INT, StructuralKind::Variable, StorageClass::Global, 1)
        .unwrap();
    let local = symbols
        .declare(Scope::Local, "x", Type::CHAR, StructuralKind::Variable, StorageClass::Local, 1)
        .unwrap();
    assert_eq!(symbols.find("x"), Some(local));
    symbols.clear_locals();
    assert_eq!(symbols.find("x"), Some(global));
}

#[test]
fn duplicate_global() {
    let err = Parser::new("int x; int x;").unwrap().parse().unwrap_err();
    assert!(matches!(
        err,
        CompileError::Symbol {
            source: SymbolError::DuplicateSymbol(_),
            ..
        }
    ));
}

#[test]
fn prototype_mismatch() {
    let err = compile("int f(int a); int f(long a) { return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn prototype_with_unnamed_parameter() {
    let err = compile("int f(int); int f(char a) { return a; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}

#[test]
fn prototype_then_definition() {
    let assembly = compile("int f(int a); int main() { return f(2); } int f(int a) { return a; }").unwrap();
    assert!(assembly.contains("call f"));
    assert!(assembly.contains("f:"));
}

#[test]
fn missing_return() {
    let err = compile("int f() { int a; a = 1; }").unwrap_err();
    assert!(matches!(err, CompileError::MissingReturn { ref name, .. } if name == "f"));
    assert!(compile("void g() { }").is_ok());
}

#[test]
fn misplaced_jumps() {
    let err = compile(&wrap_in_main("break; return 0;")).unwrap_err();
    assert!(matches!(err, CompileError::Misplaced { keyword: "break", .. }));
    let err = compile(&wrap_in_main("switch (1) { case 1: continue; } return 0;")).unwrap_err();
    assert!(matches!(err, CompileError::Misplaced { keyword: "continue", .. }));
}

#[test]
fn undeclared_identifier() {
    let err = compile(&wrap_in_main("return y;")).unwrap_err();
    assert!(matches!(err, CompileError::Undeclared { ref name, .. } if name == "y"));
}

#[test]
fn incompatible_assignment() {
    let err = compile(&wrap_in_main("int *p; char *q; p = q; return 0;")).unwrap_err();
    assert!(matches!(err, CompileError::IncompatibleTypes { .. }));
}

#[test]
fn switch_rejects_duplicates() {
    let err = compile(&wrap_in_main("switch (1) { case 1: break; case 1: break; } return 0;")).unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
}

#[test]
fn while_has_one_backward_jump() {
    let assembly = compile(&wrap_in_main("int i; i = 0; while (i < 10) { i = i + 1; } return i;")).unwrap();
    assert_eq!(backward_jumps(&assembly), 1);
    assert!(assembly.contains("jge"));
}

#[test]
fn for_continue_reaches_increment() {
    let assembly = compile(&wrap_in_main(
        "int i; int n; n = 0; for (i = 0; i < 10; i++) { if (i == 3) continue; n = n + i; } return n;",
    ))
    .unwrap();
    assert_eq!(backward_jumps(&assembly), 1);
}

#[test]
fn switch_dispatch() {
    let assembly = compile(&wrap_in_main(
        "int x; x = 2; switch (x) { case 1: x = 10; break; case 2: x = 20; default: x = 30; } return x;",
    ))
    .unwrap();
    let compares: Vec<&str> = assembly
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("cmp "))
        .collect();
    assert_eq!(compares.len(), 2);
    assert!(compares[0].ends_with(", 1"));
    assert!(compares[1].ends_with(", 2"));
    assert_eq!(assembly.lines().filter(|l| l.trim().starts_with("je ")).count(), 2);
}

#[test]
fn globals_and_strings() {
    let assembly = compile("char *msg = \"hi\"; int nums[3] = { 1, 2 }; long big = 7; int main() { return 0; }").unwrap();
    assert!(assembly.contains(".byte 104,105,0"));
    assert!(assembly.contains("msg:"));
    assert!(assembly.contains(".long 2"));
    assert!(assembly.contains(".long 0"));
    assert!(assembly.contains(".quad 7"));
}

#[test]
fn call_spills_and_aligns() {
    let assembly = compile(
        "int f(int a, int b, int c, int d, int e, int g, int h, int i);
         int main() { return 1 + f(1, 2, 3, 4, 5, 6, 7, 8); }",
    )
    .unwrap();
    assert!(assembly.contains("call f"));
    assert!(assembly.contains("pop rdi"));
    assert!(assembly.contains("pop r9"));
    assert!(assembly.contains("push r10"));
    // The spilled `1` and two stack arguments need one padding slot.
    assert!(assembly.contains("add rsp, 24"));
}

#[test]
fn ast_dump() {
    let compilation = compile_with(
        &wrap_in_main("return 1 + 2;"),
        &CompileOptions { dump_ast: true },
    )
    .unwrap();
    let dump = compilation.ast_dump.unwrap();
    assert!(dump.starts_with("Function main"));
    assert!(dump.contains("Return"));
    assert!(dump.contains("Add"));

    let plain = compile_with(&wrap_in_main("return 0;"), &CompileOptions::default()).unwrap();
    assert_eq!(plain.ast_dump, None);
}

#[test]
fn incomplete_struct_object() {
    let err = compile("struct s; struct s g; long h; struct s { long a; long b; };").unwrap_err();
    assert!(matches!(
        err,
        CompileError::Symbol {
            source: SymbolError::IncompleteType(ref name),
            ..
        } if name == "g"
    ));

    // Pointers to the tag are fine before it is defined.
    assert!(compile("struct s; struct s *p; struct s { long a; }; int main() { return 0; }").is_ok());
}

#[test]
fn struct_cannot_contain_itself() {
    let err = compile("struct s { int a; struct s inner; };").unwrap_err();
    assert!(matches!(
        err,
        CompileError::Symbol {
            source: SymbolError::IncompleteType(ref name),
            ..
        } if name == "inner"
    ));
    assert!(compile("struct s { int a; struct s *next; }; int main() { return 0; }").is_ok());
}

#[test]
fn struct_values_are_not_expressions() {
    let prelude = "struct s { int a; int b; int c; };";
    let err = compile(&format!(
        "{} int main() {{ struct s x; x; return 0; }}",
        prelude
    ))
    .unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));

    let err = compile(&format!(
        "{} int main() {{ struct s x; int i; for (x; i < 1; i++) i = 1; return 0; }}",
        prelude
    ))
    .unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));

    let err = compile(&format!("{} struct s g; struct s f() {{ return g; }}", prelude)).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));

    // Members and void calls are still fine as statements.
    assert!(compile(&format!(
        "{} void f() {{ }} int main() {{ struct s x; x.a; f(); return x.b; }}",
        prelude
    ))
    .is_ok());
}

#[test]
fn enumerator_overflow() {
    let err = compile("enum e { A = 9223372036854775807, B };").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));

    let parser = declarations("enum e { A = 9223372036854775807 };");
    let symbols = &parser.state().symbols;
    let a = symbols.find_enum("A", StorageClass::EnumConstant).unwrap();
    assert_eq!(symbols[a].location, Location::Constant(i64::MAX));
}

#[test]
fn oversized_arrays() {
    let err = compile("long a[4611686018427387904];").unwrap_err();
    assert!(matches!(err, CompileError::InvalidArraySize { ref name, .. } if name == "a"));

    let err = compile("struct s { long m[4611686018427387904]; };").unwrap_err();
    assert!(matches!(err, CompileError::InvalidArraySize { ref name, .. } if name == "m"));

    // Fits in a byte count but not in a stack frame.
    let err = compile(&wrap_in_main("char big[9223372036854775807]; return 0;")).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Symbol {
            source: SymbolError::Oversized(ref name),
            ..
        } if name == "big"
    ));
}

#[test]
fn glue_keeps_last_statement_on_the_right() {
    let chain = [1, 2, 3]
        .into_iter()
        .fold(None, |chain, v| Some(Node::glue(chain, Node::int(v, Type::INT))))
        .unwrap();
    assert_eq!(chain.op, AstOp::Glue);
    assert_eq!(chain.right.as_ref().and_then(|n| n.value()), Some(3));

    let earlier = chain.left.as_deref().unwrap();
    assert_eq!(earlier.op, AstOp::Glue);
    assert_eq!(earlier.left.as_ref().and_then(|n| n.value()), Some(1));
    assert_eq!(earlier.right.as_ref().and_then(|n| n.value()), Some(2));

    // Only the final statement counts towards the return check.
    let err = compile("int f() { int a; return 1; a = 2; }").unwrap_err();
    assert!(matches!(err, CompileError::MissingReturn { .. }));
    assert!(compile("int f() { int a; a = 2; return a; }").is_ok());
}
