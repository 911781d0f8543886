//! The diagnostics channel shared by every build phase.
//!
//! Conflicts and specification errors never abort the analysis on their
//! own; they are accumulated here so that a single run surfaces as many
//! problems as possible.  The collected messages are also mirrored to the
//! `tracing` subscriber.

use std::{fmt, io};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// The kind of condition a diagnostic reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    SymbolRedeclared,
    UnknownSymbol,
    ProductionPrecedenceAmbiguous,
    ShiftReduceConflict,
    ReduceReduceConflict,
    NonassocConflict,
    ProductionNeverReduced,
    UnusedSymbol,
    TableOverflow,
    UnexpectedConflictCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
}

/// Accumulator for everything the generator has to say about a grammar.
#[derive(Debug, Default)]
pub struct Diagnostics {
    emitted: Vec<Diagnostic>,
    warnings: u32,
    errors: u32,
    fatals: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.warnings += 1;
        self.push(Severity::Warning, kind, message.into());
    }

    pub fn error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.errors += 1;
        self.push(Severity::Error, kind, message.into());
    }

    pub fn fatal(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.fatals += 1;
        self.push(Severity::Fatal, kind, message.into());
    }

    fn push(&mut self, severity: Severity, kind: ErrorKind, message: String) {
        match severity {
            Severity::Warning => tracing::warn!(?kind, "{}", message),
            Severity::Error | Severity::Fatal => tracing::error!(?kind, "{}", message),
        }
        self.emitted.push(Diagnostic {
            severity,
            kind,
            message,
        });
    }

    pub fn emitted(&self) -> &[Diagnostic] {
        &self.emitted
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }

    pub fn error_count(&self) -> u32 {
        self.errors + self.fatals
    }

    /// The process exit status a driver should report: 0 on success, 1 as
    /// soon as any error has been emitted.  (2 is reserved for I/O and
    /// internal failures outside this crate.)
    pub fn exit_status(&self) -> i32 {
        if self.error_count() > 0 {
            1
        } else {
            0
        }
    }

    /// Write every collected diagnostic as a severity-tagged line block to
    /// the given sink, usually standard error.
    pub fn write_to(&self, mut sink: impl io::Write) -> io::Result<()> {
        for diagnostic in &self.emitted {
            writeln!(sink, "{}: {}", diagnostic.severity, diagnostic.message)?;
        }
        Ok(())
    }
}
