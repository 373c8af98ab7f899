//! Top-level compilation driver (spec §9's `GeneratorContext`-adjacent
//! pipeline owner): lexer → parser → module resolution/inlining → codegen →
//! optimizer → emitter, with cache short-circuiting.
//!
//! Grounded on `compile_file` in the `llts_driver` pipeline
//! (`examples/other_examples/..._llts_driver-src-pipeline-compile.rs.rs`):
//! resolve the module graph first (dependencies before the entry file),
//! then parse/lower each file in that order, then hand the merged module to
//! the optimizer and emitter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use inkwell::context::Context;

use crate::ast::{Expr, ExprKind, FunctionDef, Program, Stmt, StmtKind, TypeExpr};
use crate::builtins::BuiltinRegistry;
use crate::cache::{CacheLookup, CompilationCache};
use crate::codegen::Codegen;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticLocation, Severity};
use crate::error::{CompileError, CompileResult};
use crate::options::CompileOptions;
use crate::parser::{Parser, Strict};
use crate::resolver::ModuleResolver;
use crate::source::SourceFile;
use crate::span::Span;
use crate::{emit, optimize};

/// Owns the diagnostic bus and the compilation cache across calls, mirroring
/// the embedding interface's opaque handle (spec §6). One instance serializes
/// `compile_file`/`compile_source` under a single owner (spec §5).
pub struct Compiler {
    diagnostics: DiagnosticBus,
    cache: Option<CompilationCache>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self { diagnostics: DiagnosticBus::new(true), cache: None }
    }
}

impl Compiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_console_echo(&mut self, enabled: bool) {
        self.diagnostics.set_console_echo(enabled);
    }

    pub fn set_diagnostic_sink(&mut self, sink: Box<dyn crate::diagnostics::DiagnosticSink>) {
        self.diagnostics.set_structured_sink(sink);
    }

    pub fn set_raw_sink(&mut self, sink: Box<dyn FnMut(&str, bool)>) {
        self.diagnostics.set_raw_sink(sink);
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.diagnostics.warning_count()
    }

    /// Compiles the `.k` file at `options.input_path`, producing the
    /// artifact `options.emit` requests at `options.output_path`.
    pub fn compile_file(&mut self, options: &CompileOptions) -> CompileResult<PathBuf> {
        let source = SourceFile::read(&options.input_path).map_err(|err| CompileError::Io { message: err.to_string() })?;
        self.compile(source, options)
    }

    /// Compiles `text` as if it were a file named `virtual_filename`, for
    /// embedders that hold source in memory rather than on disk
    /// (spec §6 `compile_source`).
    pub fn compile_source(&mut self, text: &str, virtual_filename: &str, options: &CompileOptions) -> CompileResult<PathBuf> {
        let source = SourceFile::from_text(PathBuf::from(virtual_filename), text.to_owned());
        self.compile(source, options)
    }

    fn compile(&mut self, entry: SourceFile, options: &CompileOptions) -> CompileResult<PathBuf> {
        if options.clear_cache {
            CompilationCache::open(&options.cache_dir).clear();
        }
        if self.cache.is_none() || options.use_cache {
            self.cache = Some(CompilationCache::open(&options.cache_dir));
        }
        if let Some(cache) = &mut self.cache {
            cache.set_enabled(options.use_cache);
        }

        let project_dir = entry.canonical_path().parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let compiler_dir = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)).unwrap_or_else(|| PathBuf::from("."));
        let mut resolver = ModuleResolver::new(compiler_dir, project_dir);
        resolver.build_module_registry();
        for path in &options.library_paths {
            resolver.add_search_path(path.clone());
        }

        let mut visited = HashSet::new();
        let mut files = Vec::new();
        self.collect_module_graph(&entry, &resolver, &mut visited, &mut files)?;

        let mut dependencies = Vec::new();
        let mut merged = Program::default();
        for source in &files {
            let program = self.parse_one(source)?;
            if source.canonical_path() != entry.canonical_path() {
                dependencies.push(source.canonical_path().to_string_lossy().into_owned());
            }
            merged.statements.extend(program.statements);
        }
        let program = wrap_bare_statements(merged);

        let source_bytes = entry.text().as_bytes();
        if let Some(cache) = &mut self.cache {
            if let CacheLookup::Hit(bitcode) = cache.lookup(entry.canonical_path(), source_bytes, options.effective_opt_level(), options.freestanding) {
                self.emit(Severity::Info, "cache hit, reusing stored bitcode".to_owned());
                return self.rehydrate_and_emit(&bitcode, options);
            }
        }

        let context = Context::create();
        let module_name = entry.canonical_path().file_stem().and_then(|stem| stem.to_str()).unwrap_or("main");
        let mut codegen = Codegen::new(&context, module_name, options.freestanding);
        let builtins = BuiltinRegistry::standard();
        codegen.lower_program(&program, &builtins)?;
        codegen.module.verify().map_err(|err| CompileError::Codegen { span: None, message: err.to_string() })?;

        let machine = emit::host_machine(options.effective_opt_level())?;
        optimize::run(&codegen.module, &machine, options.effective_opt_level())?;

        let output_path = emit::emit(&codegen.module, &machine, options)?;

        if let Some(cache) = &mut self.cache {
            let bitcode = codegen.module.write_bitcode_to_memory();
            cache.store(entry.canonical_path(), source_bytes, bitcode.as_slice(), options.effective_opt_level(), options.freestanding, dependencies)?;
            cache.save()?;
        }

        self.emit(Severity::Success, format!("compiled `{}`", entry.canonical_path().display()));
        Ok(output_path)
    }

    /// Rehydrates cached bitcode into a fresh context and re-runs only the
    /// emitter (spec §4.9 "hits yield the cached bitcode which is
    /// rehydrated into the current IR module, skipping lex/parse/generation").
    fn rehydrate_and_emit(&mut self, bitcode: &[u8], options: &CompileOptions) -> CompileResult<PathBuf> {
        let context = Context::create();
        let buffer = inkwell::memory_buffer::MemoryBuffer::create_from_memory_range(bitcode, "cached");
        let module = inkwell::module::Module::parse_bitcode_from_buffer(&buffer, &context).map_err(|err| CompileError::Cache { message: err.to_string() })?;
        let machine = emit::host_machine(options.effective_opt_level())?;
        emit::emit(&module, &machine, options)
    }

    fn parse_one(&mut self, source: &SourceFile) -> CompileResult<Program> {
        let mut parser = Parser::new(source.text(), Strict);
        match parser.parse_program() {
            Ok(program) => Ok(program),
            Err(err) => {
                self.emit_error(source, &err);
                Err(err)
            }
        }
    }

    /// Walks `import` statements depth-first, resolving each to a file and
    /// recursing before registering the importing file, so the returned
    /// order has dependencies first and the entry file last (spec §5).
    fn collect_module_graph(&mut self, file: &SourceFile, resolver: &ModuleResolver, visited: &mut HashSet<PathBuf>, order: &mut Vec<SourceFile>) -> CompileResult<()> {
        let canonical = file.canonical_path().to_path_buf();
        if !visited.insert(canonical) {
            return Ok(());
        }

        let mut parser = Parser::new(file.text(), Strict);
        let program = parser.parse_program()?;
        for stmt in &program.statements {
            if let StmtKind::Import(paths) = &stmt.kind {
                for path in paths {
                    let resolved = resolver.resolve(path, Some(file.canonical_path()))?;
                    let dependency = SourceFile::read(&resolved).map_err(|err| CompileError::Io { message: err.to_string() })?;
                    self.collect_module_graph(&dependency, resolver, visited, order)?;
                }
            }
        }
        order.push(file.clone());
        Ok(())
    }

    fn emit(&mut self, severity: Severity, message: String) {
        self.diagnostics.emit(Diagnostic::new(severity, message));
    }

    fn emit_error(&mut self, source: &SourceFile, err: &CompileError) {
        let location = err.span().map(|span| {
            let start = source.line_col(span.start);
            DiagnosticLocation {
                file: source.canonical_path().to_string_lossy().into_owned(),
                span,
                start,
                code: err.code().to_owned(),
                caret_len: Some(span.len().max(1)),
            }
        });
        if let Some(location) = &location {
            let line_text = source.line_text(location.start.line);
            self.diagnostics.register_line(&location.file, line_text);
        }
        let mut diagnostic = Diagnostic::new(Severity::Error, err.to_string());
        if let Some(location) = location {
            diagnostic = diagnostic.with_location(location);
        }
        self.diagnostics.emit(diagnostic);
    }
}

/// `Program`s whose top level has no explicit `main` function get their
/// bare statements (everything that isn't a declaration) wrapped into a
/// generated `main` (spec §4.2 "top-level forms ... wrapped into a
/// generated `main` if no explicit `main` exists").
fn wrap_bare_statements(program: Program) -> Program {
    if program.functions().any(|def| def.name == "main") {
        return program;
    }

    let mut declarations = Vec::new();
    let mut bare = Vec::new();
    for stmt in program.statements {
        match &stmt.kind {
            StmtKind::Module(_) | StmtKind::Import(_) | StmtKind::ExternFn(..) | StmtKind::ExternStructDecl(_) | StmtKind::StructDef(..) | StmtKind::FunctionDef(_) | StmtKind::ImplBlock(..) => {
                declarations.push(stmt);
            }
            _ => bare.push(stmt),
        }
    }

    if bare.is_empty() {
        return Program::new(declarations);
    }

    let has_return = bare.iter().any(|stmt| matches!(stmt.kind, StmtKind::Return(_)));
    if !has_return {
        bare.push(Stmt::new(StmtKind::Return(Some(Expr { kind: ExprKind::Number(0), span: Span::default() })), Span::default()));
    }

    let main = FunctionDef { name: "main".to_owned(), return_type: TypeExpr::Int, params: Vec::new(), body: bare, span: Span::default() };
    declarations.push(Stmt::new(StmtKind::FunctionDef(main), Span::default()));
    Program::new(declarations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_statements_are_wrapped_into_a_generated_main() {
        let mut parser = Parser::new("print(\"hi\");", Strict);
        let program = parser.parse_program().expect("parse");
        let wrapped = wrap_bare_statements(program);
        assert!(wrapped.functions().any(|def| def.name == "main"));
    }

    #[test]
    fn explicit_main_is_left_untouched() {
        let mut parser = Parser::new("int main() { ret 0; }", Strict);
        let program = parser.parse_program().expect("parse");
        let statement_count = program.statements.len();
        let wrapped = wrap_bare_statements(program);
        assert_eq!(wrapped.statements.len(), statement_count);
    }
}
