//! End-to-end scenarios from spec §8, driven through the public
//! `Compiler::compile_source` API rather than the parser/codegen unit
//! tests living alongside their modules. Emits textual LLVM IR
//! (`EmitKind::LlvmIr`) so these tests never need to invoke a system
//! linker or execute the resulting binary.

use std::fs;

use quarkc::{CompileOptions, Compiler, EmitKind};

fn compile_ir(source: &str, name: &str) -> String {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = CompileOptions {
        output_path: dir.path().join(format!("{name}.ll")),
        emit: EmitKind::LlvmIr,
        use_cache: false,
        ..CompileOptions::default()
    };
    let mut compiler = Compiler::new();
    let path = compiler.compile_source(source, &format!("{name}.k"), &options).expect("compiles");
    fs::read_to_string(path).expect("read emitted ir")
}

#[test]
fn hello_world_emits_a_print_call_and_main() {
    let ir = compile_ir(r#"int main() { print("Hello"); ret 0; }"#, "hello");
    assert!(ir.contains("define i32 @main"));
    assert!(ir.contains("Hello"));
}

#[test]
fn arithmetic_and_format_keeps_literal_format_pieces() {
    let source = r#"int main() { var a = 2; var b = 3; print(format("{}+{}={}", a, b, a+b)); ret 0; }"#;
    let ir = compile_ir(source, "arith");
    assert!(ir.contains("+") || ir.contains("add"));
    assert!(ir.contains("="));
}

#[test]
fn range_for_with_break_lowers_to_branches() {
    let source = r#"int main() { for i in 0..10 { if i == 3 { break; } print(i); } ret 0; }"#;
    let ir = compile_ir(source, "range_for");
    assert!(ir.contains("br "));
    assert!(ir.contains("icmp"));
}

#[test]
fn struct_with_method_mangles_the_method_name() {
    let source = r#"struct P { data { int x; } } impl P { int get(this) { ret this.x; } } int main() { var p = P { x: 42 }; print(p.get()); ret 0; }"#;
    let ir = compile_ir(source, "struct_method");
    assert!(ir.contains("P_get"));
}

#[test]
fn array_push_and_length_reference_the_array_builtins() {
    let source = r#"int main() { var a: int[] = { 1, 2, 3 }; a = array_push(a, &4, 4); print(array_length(a)); ret 0; }"#;
    let ir = compile_ir(source, "array_push");
    assert!(ir.contains("array_push"));
    assert!(ir.contains("array_length"));
}

#[test]
fn cache_hit_reuses_identical_bitcode_across_runs() {
    let source = r#"int main() { var a = 2; var b = 3; print(format("{}+{}={}", a, b, a+b)); ret 0; }"#;
    let cache_dir = tempfile::tempdir().expect("tempdir");
    let output_dir = tempfile::tempdir().expect("tempdir");

    let options = CompileOptions {
        output_path: output_dir.path().join("run1.ll"),
        emit: EmitKind::LlvmIr,
        use_cache: true,
        cache_dir: cache_dir.path().to_path_buf(),
        ..CompileOptions::default()
    };
    let mut first_compiler = Compiler::new();
    let first_path = first_compiler.compile_source(source, "cache_hit.k", &options).expect("first compile");
    let first_ir = fs::read_to_string(&first_path).expect("read first output");

    let options = CompileOptions { output_path: output_dir.path().join("run2.ll"), ..options };
    let mut second_compiler = Compiler::new();
    let second_path = second_compiler.compile_source(source, "cache_hit.k", &options).expect("second compile");
    let second_ir = fs::read_to_string(&second_path).expect("read second output");

    assert_eq!(first_ir, second_ir);
}

#[test]
fn compiling_the_same_source_twice_is_deterministic() {
    let source = r#"int main() { print("Hello"); ret 0; }"#;
    let first = compile_ir(source, "det1");
    let second = compile_ir(source, "det2");
    assert_eq!(first, second);
}

#[test]
fn bare_top_level_statements_are_wrapped_into_a_generated_main() {
    let ir = compile_ir(r#"print("no explicit main");"#, "bare");
    assert!(ir.contains("define i32 @main"));
}

#[test]
fn freestanding_mode_rejects_libc_dependent_builtins() {
    let options = CompileOptions { emit: EmitKind::LlvmIr, freestanding: true, use_cache: false, ..CompileOptions::default() };
    let mut compiler = Compiler::new();
    let result = compiler.compile_source(r#"int main() { print("Hello"); ret 0; }"#, "freestanding.k", &options);
    assert!(result.is_err());
}

#[test]
fn float_var_widens_an_integer_literal_initializer() {
    let ir = compile_ir(r#"int main() { var x: float = 1; print(x); ret 0; }"#, "float_var");
    assert!(ir.contains("sitofp"));
}

#[test]
fn float_return_widens_an_integer_literal() {
    let source = r#"float make() { ret 1; } int main() { print(make()); ret 0; }"#;
    let ir = compile_ir(source, "float_return");
    assert!(ir.contains("sitofp"));
}

#[test]
fn float_parameter_widens_an_integer_argument() {
    let source = r#"float identity(float x) { ret x; } int main() { print(identity(2)); ret 0; }"#;
    let ir = compile_ir(source, "float_param");
    assert!(ir.contains("sitofp"));
}

#[test]
fn str_index_reads_a_byte() {
    let ir = compile_ir(r#"int main() { var s: str = "hi"; print(s[0]); ret 0; }"#, "str_index_read");
    assert!(ir.contains("load i8"));
    assert!(ir.contains("zext"));
}

#[test]
fn str_index_assignment_is_rejected() {
    let options = CompileOptions { emit: EmitKind::LlvmIr, use_cache: false, ..CompileOptions::default() };
    let mut compiler = Compiler::new();
    let result = compiler.compile_source(r#"int main() { var s: str = "hi"; s[0] = 65; ret 0; }"#, "str_index_write.k", &options);
    assert!(result.is_err());
}

#[test]
fn null_assigned_to_a_str_variable_is_rejected() {
    let options = CompileOptions { emit: EmitKind::LlvmIr, use_cache: false, ..CompileOptions::default() };
    let mut compiler = Compiler::new();
    let result = compiler.compile_source(r#"int main() { var s: str = null; ret 0; }"#, "null_str.k", &options);
    assert!(result.is_err());
}
