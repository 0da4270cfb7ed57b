//! Hand-off of finished error occurrences to logging back-ends.

use std::fmt;

use crate::context::ErrorContext;
use crate::frame::Frame;
use crate::id::{ClassId, NamespaceId, OccurrenceId};
use crate::stack::StackTrace;

/// An error occurrence handed to a [`ReportSink`].
///
/// The sink owns the report; it renders what it needs and then calls
/// [`Report::release`]. A report that is dropped instead goes back to the pool
/// through the reclamation backstop.
#[must_use = "a report must be released after rendering"]
pub struct Report(ErrorContext);

impl Report {
    pub(crate) fn new(context: ErrorContext) -> Self {
        Self(context)
    }

    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.0.class_id()
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        self.0.class_name()
    }

    #[must_use]
    pub fn namespace_id(&self) -> NamespaceId {
        self.0.namespace_id()
    }

    #[must_use]
    pub fn occurrence_id(&self) -> OccurrenceId {
        self.0.occurrence_id()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.0.cursor()
    }

    /// Frames from 0 up to the cursor
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> + '_ {
        self.0.frames()
    }

    /// Captured call stack, empty for lightweight occurrences
    #[must_use]
    pub fn stack(&self) -> Option<&StackTrace> {
        self.0.stack()
    }

    /// The underlying context, for classification queries
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.0
    }

    /// Return the occurrence to its pool
    pub fn release(self) {
        self.0.release();
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Report").field(&self.0).finish()
    }
}

/// Consumer of finished error occurrences.
///
/// Implementations must release every report they receive.
pub trait ReportSink {
    fn consume(&self, report: Report);
}

/// Sink that emits each report as a `tracing` event.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: tracing::Level,
    with_stack: bool,
}

impl TracingSink {
    /// Emit reports at `level`, without the call stack
    #[must_use]
    pub const fn new(level: tracing::Level) -> Self {
        Self {
            level,
            with_stack: false,
        }
    }

    /// Also render the captured call stack into the event
    #[must_use]
    pub const fn with_stack(mut self, with_stack: bool) -> Self {
        self.with_stack = with_stack;
        self
    }

    /// Level events are emitted at
    #[must_use]
    pub const fn level(&self) -> tracing::Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(tracing::Level::ERROR)
    }
}

impl ReportSink for TracingSink {
    fn consume(&self, report: Report) {
        let stack = match report.stack() {
            Some(stack) if self.with_stack && !stack.is_empty() => stack.to_string(),
            _ => String::new(),
        };

        macro_rules! emit {
            ($macro:ident) => {
                tracing::$macro!(
                    class = report.class_name(),
                    class_id = %report.class_id(),
                    namespace_id = %report.namespace_id(),
                    occurrence_id = %report.occurrence_id(),
                    cursor = report.cursor(),
                    detail = %format_args!("{:#}", report),
                    stack = %stack,
                    "{}",
                    report
                )
            };
        }

        match self.level {
            tracing::Level::ERROR => emit!(error),
            tracing::Level::WARN => emit!(warn),
            tracing::Level::INFO => emit!(info),
            tracing::Level::DEBUG => emit!(debug),
            _ => emit!(trace),
        }

        report.release();
    }
}
