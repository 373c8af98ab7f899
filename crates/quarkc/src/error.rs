//! Named error kinds carried to the top of the pipeline (spec §7, §9).
//!
//! Each stage returns `Result<_, CompileError>` rather than raising a
//! language-level exception; the strict parser's fast-fail path is the one
//! deliberate exception to "no non-local control flow" the spec calls out,
//! implemented below as an ordinary early `?` return, not a panic or a
//! longjmp-style unwind.

use crate::span::Span;

/// The three named Open Question rulings from spec §9 that need more than a
/// free-text message: format-string arity, indexing a `str` as an lvalue,
/// and a type mismatch such as `null` where a `str` is expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemanticError {
    #[error("`format` expects {expected} argument(s), found {found}")]
    FormatArityMismatch { expected: usize, found: usize },

    #[error("assignment through a `str` index is not allowed")]
    ImmutableIndex,

    #[error("expected `{expected}`, found `{actual}`")]
    TypeMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("{message}")]
    Lexical { span: Span, message: String },

    #[error("{message}")]
    Syntactic { span: Span, message: String },

    #[error("{message}")]
    Semantic { span: Span, message: String },

    #[error("{kind}")]
    SemanticTyped { span: Span, kind: SemanticError },

    #[error("{message}")]
    Codegen { span: Option<Span>, message: String },

    #[error("{message}")]
    Io { message: String },

    #[error("{message}")]
    Cache { message: String },

    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl CompileError {
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexical { span, .. } | Self::Syntactic { span, .. } | Self::Semantic { span, .. } | Self::SemanticTyped { span, .. } => Some(*span),
            Self::Codegen { span, .. } => *span,
            Self::Io { .. } | Self::Cache { .. } | Self::Internal { .. } => None,
        }
    }

    /// Stable short code used by the diagnostic renderer (spec §4.10).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lexical { .. } => "E_LEX",
            Self::Syntactic { .. } => "E_SYNTAX",
            Self::Semantic { .. } | Self::SemanticTyped { .. } => "E_SEMA",
            Self::Codegen { .. } => "E_CODEGEN",
            Self::Io { .. } => "E_IO",
            Self::Cache { .. } => "E_CACHE",
            Self::Internal { .. } => "E_INTERNAL",
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
