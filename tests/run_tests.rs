//! Compiles small programs with the system assembler and linker and checks
//! their exit status. Skipped when no C toolchain is installed.

use std::{fs, process::Command};

use spcc::driver::{self, Input, Options};

fn toolchain_available() -> bool {
    Command::new("cc").arg("--version").output().is_ok()
}

fn compile_and_run(source: &str, test_name: &str) -> Option<i32> {
    let _ = env_logger::builder().is_test(true).try_init();
    if !toolchain_available() {
        eprintln!("skipping {}: no cc found", test_name);
        return None;
    }

    let dir = tempfile::tempdir().unwrap();
    let executable = dir.path().join(test_name);
    let options = Options {
        inputs: vec![Input {
            name: dir.path().join(format!("{}.c", test_name)).display().to_string(),
            source: source.to_string(),
        }],
        output: Some(executable.clone()),
        ..Options::default()
    };

    let produced = driver::run(&options).unwrap();
    assert_eq!(produced, vec![executable.clone()]);

    let status = Command::new(&executable).status().unwrap();
    Some(status.code().unwrap_or(-1))
}

fn check(source: &str, test_name: &str, expected: i32) {
    if let Some(code) = compile_and_run(source, test_name) {
        assert_eq!(code, expected, "{}", test_name);
    }
}

#[test]
fn return_constant() {
    check("int main() { return 5; }", "spcc_return_constant", 5);
}

#[test]
fn arithmetic() {
    check(
        "int main() { int a; int b; a = 7; b = 3; return (a * b - 1) / 4 % 7 + (a << 1 >> 2); }",
        "spcc_arithmetic",
        8,
    );
}

#[test]
fn if_else() {
    check(
        "int pick(int x) { if (x > 2) return 1; else x = 3; return x; } int main() { return pick(0); }",
        "spcc_if_else",
        3,
    );
}

#[test]
fn switch_without_fallthrough() {
    check(
        "int main() {
            int x; int r;
            x = 2; r = 0;
            switch (x) { case 1: r = 10; case 2: r = 20; default: r = r + 1; }
            return r;
        }",
        "spcc_switch",
        20,
    );
}

#[test]
fn many_arguments() {
    check(
        "long sum(long a, long b, long c, long d, long e, long f, long g, long h) {
            return a + b + c + d + e + f + g * 2 + h * 3;
        }
        long main() { return sum(1, 2, 3, 4, 5, 6, 7, 8); }",
        "spcc_many_arguments",
        59,
    );
}

#[test]
fn for_with_continue() {
    check(
        "int main() {
            int i; int n;
            n = 0;
            for (i = 0; i < 10; i++) { if (i % 2 == 1) continue; n = n + i; }
            return n;
        }",
        "spcc_for_continue",
        20,
    );
}

#[test]
fn struct_members() {
    check(
        "struct point { char tag; int x; long y; };
        struct point origin;
        long main() {
            struct point *p;
            p = &origin;
            p->x = 4;
            origin.y = 9;
            p->tag = 1;
            return p->x + origin.y + origin.tag;
        }",
        "spcc_struct_members",
        14,
    );
}

#[test]
fn logical_operators() {
    check(
        "int zero() { return 0; }
        int main() {
            int r; r = 0;
            if (1 && 2) r = r + 1;
            if (0 || zero()) r = r + 10;
            if (!zero() || zero()) r = r + 100;
            return r;
        }",
        "spcc_logical",
        101,
    );
}

#[test]
fn pointers_and_arrays() {
    check(
        "int a[4];
        int main() {
            int *p; int i;
            for (i = 0; i < 4; i++) a[i] = i * i;
            p = a;
            p = p + 2;
            return *p + a[3];
        }",
        "spcc_pointers",
        13,
    );
}

#[test]
fn string_literal_bytes() {
    check(
        "char *s = \"hello\"; int main() { return s[1]; }",
        "spcc_string",
        101,
    );
}

#[test]
fn global_variable() {
    check("int x; int main() { x = 5; return x; }", "spcc_global", 5);
}

#[test]
fn while_loop() {
    check(
        "int main() { int i; i = 0; while (i < 3) i = i + 1; return i; }",
        "spcc_while",
        3,
    );
}

#[test]
fn short_widens_to_int() {
    check(
        "short s; int main() { int i; s = 200; i = s + 1; return i - 160; }",
        "spcc_short",
        41,
    );
}

#[test]
fn increments() {
    check(
        "int main() {
            int i; int j; int k;
            i = 5;
            j = i++;
            k = ++i;
            return (j * 10 + k) * 2 - i;
        }",
        "spcc_increments",
        107,
    );
}

#[test]
fn pointer_increment_steps_by_element() {
    check(
        "int a[4];
        int main() {
            int *p;
            a[0] = 1; a[1] = 2; a[2] = 3;
            p = a;
            ++p;
            p++;
            return *p;
        }",
        "spcc_pointer_increment",
        3,
    );
}

#[test]
fn local_arrays() {
    check(
        "long main() {
            char c[3]; long b[3]; long *q; int i;
            for (i = 0; i < 3; i++) b[i] = (i + 1) * 10;
            c[0] = 1; c[2] = 2;
            q = b;
            q++;
            return *q + b[2] + c[2];
        }",
        "spcc_local_arrays",
        52,
    );
}

#[test]
fn union_members_share_storage() {
    check(
        "union u { char c; long l; };
        int main() { union u x; x.l = 258; return x.c; }",
        "spcc_union",
        2,
    );
}

#[test]
fn enum_and_typedef_in_body() {
    check(
        "enum color { red, green = 5, blue };
        typedef long word;
        long main() { word w; w = blue; return w + green + red; }",
        "spcc_enum_typedef",
        11,
    );
}

#[test]
fn local_shadows_global_per_function() {
    check(
        "int x;
        int f() { int x; x = 3; return x; }
        int g() { return x; }
        int main() { x = 4; return f() * 10 + g(); }",
        "spcc_shadowing",
        34,
    );
}

#[test]
fn inputs_with_the_same_stem() {
    let _ = env_logger::builder().is_test(true).try_init();
    if !toolchain_available() {
        eprintln!("skipping inputs_with_the_same_stem: no cc found");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let executable = dir.path().join("linked");
    let input = |sub: &str, source: &str| Input {
        name: dir.path().join(sub).join("prog.c").display().to_string(),
        source: source.to_string(),
    };
    let options = Options {
        inputs: vec![
            input("one", "int helper() { return 7; }"),
            input("two", "int helper(); int main() { return helper() + 1; }"),
        ],
        output: Some(executable.clone()),
        ..Options::default()
    };
    assert_eq!(driver::run(&options).unwrap(), vec![executable.clone()]);

    let status = Command::new(&executable).status().unwrap();
    assert_eq!(status.code(), Some(8));
    // Nothing but the executable is left behind.
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn assembly_output_only() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.s");
    let options = Options {
        inputs: vec![Input {
            name: "prog.c".to_string(),
            source: "int main() { return 0; }".to_string(),
        }],
        output: Some(output.clone()),
        compile_only: true,
        ..Options::default()
    };
    assert_eq!(driver::run(&options).unwrap(), vec![output.clone()]);
    assert!(fs::read_to_string(&output).unwrap().contains("main:"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
