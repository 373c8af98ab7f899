//! Shared grammar, two error disciplines (spec §4.2, §9).
//!
//! Rather than duplicate the grammar for compilation (fail fast) and for the
//! LSP front end (synchronize and keep going), [`Parser`](super::Parser) is
//! generic over an [`ErrorPolicy`]. `report` either aborts the parse
//! (`Strict`) or records a diagnostic and lets the caller fall through to a
//! synchronization point (`Recovering`).

use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticLocation, Severity};
use crate::error::CompileError;
use crate::span::LineCol;

pub trait ErrorPolicy {
    /// `Err` aborts the current parse immediately via `?`; `Ok(())` means
    /// the error was recorded and the caller should synchronize and
    /// continue with a placeholder node.
    fn report(&mut self, error: CompileError) -> Result<(), CompileError>;

    /// Whether the caller should attempt statement-boundary synchronization
    /// after a recorded (non-fatal) error.
    fn recovers(&self) -> bool;
}

/// Compilation's parser: the first unrecoverable mismatch fails the parse.
#[derive(Debug, Default)]
pub struct Strict;

impl ErrorPolicy for Strict {
    fn report(&mut self, error: CompileError) -> Result<(), CompileError> {
        Err(error)
    }

    fn recovers(&self) -> bool {
        false
    }
}

/// LSP's parser: every error is recorded on the bus and parsing continues
/// from the nearest statement boundary.
pub struct Recovering<'bus> {
    bus: &'bus mut DiagnosticBus,
    file: String,
    line_col: fn(u32) -> LineCol,
}

impl<'bus> Recovering<'bus> {
    pub fn new(bus: &'bus mut DiagnosticBus, file: impl Into<String>, line_col: fn(u32) -> LineCol) -> Self {
        Self { bus, file: file.into(), line_col }
    }
}

impl ErrorPolicy for Recovering<'_> {
    fn report(&mut self, error: CompileError) -> Result<(), CompileError> {
        let span = error.span().unwrap_or_default();
        let location = DiagnosticLocation {
            file: self.file.clone(),
            span,
            start: (self.line_col)(span.start),
            code: error.code().to_owned(),
            caret_len: Some(span.len().max(1)),
        };
        self.bus.emit(Diagnostic::new(Severity::Error, error.to_string()).with_location(location));
        Ok(())
    }

    fn recovers(&self) -> bool {
        true
    }
}
