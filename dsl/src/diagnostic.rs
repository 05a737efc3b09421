//! Provides definition for diagnostics, which are normally errors and
//! warnings associated with compilation.
//!
//! Diagnostics are accumulated rather than terminating compilation: the
//! parser continues with a placeholder value after reporting so that a
//! single run surfaces every problem it can find.

use crate::core::SourceSpan;
use crate::problems::{Problem, ProblemKind};

/// A label that refers to some range in a file and possibly associated
/// with a message related to that range.
///
/// Normally this indicates the location of an error along with a text
/// message describing that position.
#[derive(Debug)]
pub struct Label {
    /// The position of the label.
    pub span: SourceSpan,

    /// A message describing this label.
    pub message: String,
}

impl Label {
    pub fn span(span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }

    /// A label with no position. Used by the code generator, which does
    /// not track source positions; the parser relocates such labels to
    /// the current token before recording them.
    pub fn unpositioned(message: impl Into<String>) -> Self {
        Self {
            span: SourceSpan::default(),
            message: message.into(),
        }
    }
}

/// A diagnostic. Diagnostics have a code that is indicative of the
/// category, a primary location and a possibly non-zero set of secondary
/// locations.
#[derive(Debug)]
pub struct Diagnostic {
    /// The problem this diagnostic reports.
    pub problem: Problem,

    /// The primary label for the diagnostic.
    pub primary: Label,

    /// Additional descriptions beyond the constant problem message.
    pub described: Vec<String>,

    /// Additional information about the diagnostic.
    pub secondary: Vec<Label>,
}

impl Diagnostic {
    /// Creates a diagnostic from the problem code and with the specified
    /// label. The label associates the problem to a particular position
    /// in an Oberon-0 source file.
    pub fn problem(problem: Problem, primary: Label) -> Self {
        Self {
            problem,
            primary,
            described: vec![],
            secondary: vec![],
        }
    }

    /// Adds to the problem description additional context about the
    /// problem that does not need to be related to a position in a
    /// source file.
    pub fn with_context(mut self, description: &str, item: &str) -> Self {
        self.described.push(format!("{}={}", description, item));
        self
    }

    pub fn with_secondary(mut self, label: Label) -> Self {
        self.secondary.push(label);
        self
    }

    /// Moves the primary label to the given span if the diagnostic does
    /// not already carry a real position.
    pub fn relocate(mut self, span: &SourceSpan) -> Self {
        if self.primary.span.is_default() {
            self.primary.span = span.clone();
        }
        self
    }

    /// The stable user-facing code.
    pub fn code(&self) -> &'static str {
        self.problem.code()
    }

    pub fn kind(&self) -> ProblemKind {
        self.problem.kind()
    }

    /// Returns the description for the diagnostic. This may add in other
    /// data in addition to the constant problem message.
    pub fn description(&self) -> String {
        if self.described.is_empty() {
            self.problem.message().to_owned()
        } else {
            format!("{} ({})", self.problem.message(), self.described.join(", "))
        }
    }
}
