//! `quarkc`: an ahead-of-time compiler for the Quark language, emitting
//! native executables through an LLVM intermediate representation.
//!
//! The pipeline is lexer → parser → semantic elaboration interleaved with
//! IR generation → optimizer → executable emitter, wired together by
//! [`Compiler`]. [`options::CompileOptions`] is the single struct shared by
//! the command interface and the embedding interface (spec §6).
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing between i64/i32/u32 source widths is checked at the AST boundary")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts only occur on values already known non-negative (array lengths, byte offsets)")]
#![expect(clippy::cast_possible_wrap, reason = "narrowing to LLVM's i32 index/size types mirrors the source language's own int width")]

mod ast;
mod builtins;
pub mod cache;
pub mod codegen;
pub mod compiler;
pub mod diagnostics;
mod emit;
mod error;
mod lexer;
mod optimize;
pub mod options;
mod parser;
pub mod resolver;
pub mod semantic;
pub mod source;
pub mod span;
mod token;

pub use crate::compiler::Compiler;
pub use crate::diagnostics::{Diagnostic, DiagnosticLocation, DiagnosticSink, Severity};
pub use crate::error::{CompileError, CompileResult, SemanticError};
pub use crate::options::{CompileOptions, EmitKind, OptLevel, Verbosity};
pub use crate::source::SourceFile;

/// Return codes for the embedding interface (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(i32)]
pub enum CompileStatus {
    Ok = 0,
    InvalidArgument = -1,
    Io = -2,
    Compilation = -3,
    Internal = -4,
}

impl From<&CompileError> for CompileStatus {
    fn from(err: &CompileError) -> Self {
        match err {
            CompileError::Io { .. } => Self::Io,
            CompileError::Internal { .. } => Self::Internal,
            CompileError::Lexical { .. }
            | CompileError::Syntactic { .. }
            | CompileError::Semantic { .. }
            | CompileError::SemanticTyped { .. }
            | CompileError::Codegen { .. }
            | CompileError::Cache { .. } => Self::Compilation,
        }
    }
}
