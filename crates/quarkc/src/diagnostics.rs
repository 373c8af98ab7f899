//! The diagnostic bus (spec §4.10).
//!
//! Generalizes the teacher's `PrintWriter` family (`StdPrint`, `NoPrint`,
//! `CollectStringPrint`) from "where does interpreter stdout go" to "where
//! do compiler diagnostics go": a small trait with a handful of concrete
//! sinks, rather than a dynamic event-bus crate. Two subscribers run in
//! parallel per spec (a structured callback and a raw-text callback); the
//! default terminal sink is a third, and is suppressed by
//! [`crate::options::CompileOptions`] echo control in the embedding API.

use std::fmt;

use crate::span::{LineCol, Span};

/// Severity/category of one diagnostic event (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Success,
    Progress,
}

/// One event placed on the diagnostic bus.
///
/// Plain informational events (`Debug`/`Info`/`Success`/`Progress`) only
/// ever set `message` and `newline`; `Warning` and `Error` additionally may
/// carry source location data used by the caret-underline renderer.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub newline: bool,
    pub location: Option<DiagnosticLocation>,
}

/// Source-span detail attached to `Warning`/`Error` diagnostics.
#[derive(Debug, Clone)]
pub struct DiagnosticLocation {
    pub file: String,
    pub span: Span,
    pub start: LineCol,
    /// Error code, e.g. `E0042`; empty for warnings without a stable code.
    pub code: String,
    /// Number of source columns the caret underline should span; `None`
    /// falls back to a single caret when the lexeme length is unknown.
    pub caret_len: Option<u32>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            newline: true,
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: DiagnosticLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn without_newline(mut self) -> Self {
        self.newline = false;
        self
    }
}

/// Destination for diagnostic events.
///
/// Implementors decide how to render or forward `emit`'s argument; the
/// trait carries no other state so monomorphized call sites (as in the
/// teacher's `VmTracer`) compile down to a direct call with no dynamic
/// dispatch when a concrete sink type is known statically.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: &Diagnostic);
}

/// Default sink: renders to stderr, with a pretty-printed caret underline
/// for `Warning`/`Error` diagnostics that carry a location. ANSI
/// colorization is not performed here — per spec §1 that belongs to the
/// out-of-scope terminal-rendering collaborator, which can observe the same
/// events through a second, caller-supplied sink.
#[derive(Debug, Default)]
pub struct TerminalSink {
    source_lines: Vec<(String, String)>,
}

impl TerminalSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the text of one source line so the caret renderer can
    /// quote it. The compiler driver calls this once per diagnostic that
    /// carries a location, just before emitting.
    pub fn register_line(&mut self, file: &str, line_text: &str) {
        self.source_lines.push((file.to_owned(), line_text.to_owned()));
    }

    fn render_caret(&self, location: &DiagnosticLocation) -> Option<String> {
        let (_, line_text) = self
            .source_lines
            .iter()
            .rev()
            .find(|(file, _)| file == &location.file)?;
        let col = location.start.column.saturating_sub(1) as usize;
        let len = location.caret_len.unwrap_or(1).max(1) as usize;
        let mut underline = String::new();
        underline.extend(std::iter::repeat_n(' ', col));
        underline.extend(std::iter::repeat_n('^', len));
        Some(format!("{line_text}\n{underline}"))
    }
}

impl DiagnosticSink for TerminalSink {
    fn emit(&mut self, diagnostic: &Diagnostic) {
        let prefix = match diagnostic.severity {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
            Severity::Progress => "progress",
        };
        let end = if diagnostic.newline { "\n" } else { "" };
        if let Some(location) = &diagnostic.location {
            let code = if location.code.is_empty() {
                String::new()
            } else {
                format!("[{}] ", location.code)
            };
            eprint!(
                "{prefix}: {code}{message}\n --> {file}:{loc}{end}",
                message = diagnostic.message,
                file = location.file,
                loc = location.start,
            );
            if let Some(caret) = self.render_caret(location) {
                eprintln!("\n{caret}");
            }
        } else {
            eprint!("{prefix}: {message}{end}", message = diagnostic.message);
        }
    }
}

/// Sink that forwards every event to a boxed closure, used by the embedding
/// interface's `set_diagnostic_callback`.
pub struct CallbackSink {
    callback: Box<dyn FnMut(&Diagnostic)>,
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

impl CallbackSink {
    pub fn new(callback: impl FnMut(&Diagnostic) + 'static) -> Self {
        Self { callback: Box::new(callback) }
    }
}

impl DiagnosticSink for CallbackSink {
    fn emit(&mut self, diagnostic: &Diagnostic) {
        (self.callback)(diagnostic);
    }
}

/// Sink that buffers every event, used by the recovering parser and by
/// tests that want to assert on diagnostic text without capturing stderr.
#[derive(Debug, Default)]
pub struct CollectSink {
    events: Vec<Diagnostic>,
}

impl CollectSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Diagnostic> {
        self.events
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.events.iter().filter(|d| d.severity == Severity::Error).count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.events.iter().filter(|d| d.severity == Severity::Warning).count()
    }
}

impl DiagnosticSink for CollectSink {
    fn emit(&mut self, diagnostic: &Diagnostic) {
        self.events.push(diagnostic.clone());
    }
}

/// Fans one diagnostic out to up to three subscribers: a structured
/// callback, a raw-text callback, and (unless echo is disabled) the
/// terminal sink. This is the bus the compilation driver actually holds;
/// the individual sinks above are its building blocks.
#[derive(Default)]
pub struct DiagnosticBus {
    structured: Option<Box<dyn DiagnosticSink>>,
    raw: Option<Box<dyn FnMut(&str, bool)>>,
    terminal: Option<TerminalSink>,
    error_count: usize,
    warning_count: usize,
}

impl fmt::Debug for DiagnosticBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticBus")
            .field("error_count", &self.error_count)
            .field("warning_count", &self.warning_count)
            .finish_non_exhaustive()
    }
}

impl DiagnosticBus {
    #[must_use]
    pub fn new(echo_to_terminal: bool) -> Self {
        Self {
            terminal: echo_to_terminal.then(TerminalSink::new),
            ..Default::default()
        }
    }

    pub fn set_structured_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.structured = Some(sink);
    }

    pub fn set_raw_sink(&mut self, sink: Box<dyn FnMut(&str, bool)>) {
        self.raw = Some(sink);
    }

    pub fn set_console_echo(&mut self, enabled: bool) {
        self.terminal = enabled.then(TerminalSink::new);
    }

    /// Registers a source line for caret rendering, forwarded to the
    /// terminal sink only (structured/raw subscribers receive the span and
    /// can render their own caret if they want one).
    pub fn register_line(&mut self, file: &str, line_text: &str) {
        if let Some(terminal) = &mut self.terminal {
            terminal.register_line(file, line_text);
        }
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            _ => {}
        }
        if let Some(sink) = &mut self.structured {
            sink.emit(&diagnostic);
        }
        if let Some(raw) = &mut self.raw {
            raw(&diagnostic.message, diagnostic.newline);
        }
        if let Some(terminal) = &mut self.terminal {
            terminal.emit(&diagnostic);
        }
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_counts_errors_and_warnings() {
        let mut bus = DiagnosticBus::new(false);
        bus.emit(Diagnostic::new(Severity::Error, "boom"));
        bus.emit(Diagnostic::new(Severity::Warning, "careful"));
        bus.emit(Diagnostic::new(Severity::Info, "fyi"));
        assert_eq!(bus.error_count(), 1);
        assert_eq!(bus.warning_count(), 1);
    }

    #[test]
    fn collect_sink_buffers_events() {
        let mut sink = CollectSink::new();
        sink.emit(&Diagnostic::new(Severity::Error, "bad"));
        sink.emit(&Diagnostic::new(Severity::Warning, "meh"));
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 1);
        assert_eq!(sink.events().len(), 2);
    }
}
