//! The error context builder.
//!
//! An [`ErrorContext`] is one error occurrence checked out of its registry's
//! pool. Mutators take and return the context so calls chain; every call on
//! an invalid context does nothing, so a chain started from an invalid class
//! degrades to an empty error instead of panicking.
//!
//! A context ends in exactly one of three ways: [`ErrorContext::release`],
//! [`ErrorContext::log`], or being dropped. Dropping is the backstop; it
//! returns the instance to the pool and counts it as a reclamation.

use std::borrow::Cow;
use std::fmt;

use crate::field::{Field, FieldValue};
use crate::frame::Frame;
use crate::id::{ClassId, NamespaceId, OccurrenceId};
use crate::pool::Occurrence;
use crate::registry::{Class, Namespace, Registry};
use crate::report::{Report, ReportSink};
use crate::stack::StackTrace;

struct Slot {
    occ: Box<Occurrence>,
    registry: Registry,
}

/// A pooled error occurrence with its frames, fields and stack.
#[must_use = "an error context must be released, logged or returned"]
pub struct ErrorContext {
    slot: Option<Slot>,
}

impl ErrorContext {
    /// A context that ignores every call and renders as the empty string
    pub const fn invalid() -> Self {
        Self { slot: None }
    }

    #[inline(never)]
    pub(crate) fn create(
        class: &Class,
        message: &str,
        cause: Option<&str>,
        lightweight: bool,
    ) -> Self {
        let Some(entry) = class.entry() else {
            return Self::invalid();
        };
        let cause = match cause.map(str::trim) {
            Some("") => return Self::invalid(),
            other => other,
        };

        let registry = class.registry();
        let mut occ = registry.pool().acquire();
        occ.class = entry.id;
        occ.namespace = entry.namespace;
        occ.class_name = Some(class.full_name());
        occ.occurrence_id = registry.mint_occurrence_id();
        occ.lightweight = lightweight;
        if !lightweight {
            occ.stack.capture(&registry.config().stack);
        }

        occ.frames.seed();
        let message = message.trim();
        match cause {
            Some(cause) if message.is_empty() => occ.frames.set_message(cause),
            Some(cause) => occ.frames.set_message(&format!("{message}: {cause}")),
            None if message.is_empty() => {}
            None => occ.frames.set_message(message),
        }

        Self {
            slot: Some(Slot {
                occ,
                registry: registry.clone(),
            }),
        }
    }

    fn occ(&self) -> Option<&Occurrence> {
        self.slot.as_ref().map(|slot| &*slot.occ)
    }

    // Ids are registry-local; only handles from our own registry can match.
    fn owned_by(&self, registry: &Registry) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| slot.registry.ptr_eq(registry))
    }

    fn occ_mut(&mut self) -> Option<&mut Occurrence> {
        self.slot.as_mut().map(|slot| &mut *slot.occ)
    }

    // ── mutators ─────────────────────────────────────────────────────────

    /// Set the current frame's message, replacing any earlier one.
    ///
    /// The text is trimmed; blank text leaves the frame unchanged.
    pub fn add_message(mut self, text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        if !text.is_empty()
            && let Some(occ) = self.occ_mut()
        {
            occ.frames.set_message(text);
        }
        self
    }

    /// Attach a field to the current frame.
    ///
    /// Reserved and malformed keys are dropped.
    pub fn add_field(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<FieldValue>,
    ) -> Self {
        if let Some(occ) = self.occ_mut()
            && let Some(field) = Field::new(key, value)
        {
            occ.frames.push_field(field);
        }
        self
    }

    /// Attach several fields to the current frame, in order
    pub fn add_fields<K, V, I>(mut self, fields: I) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        if let Some(occ) = self.occ_mut() {
            for (key, value) in fields {
                if let Some(field) = Field::new(key, value) {
                    occ.frames.push_field(field);
                }
            }
        }
        self
    }

    /// Flag the current frame as significant
    pub fn mark(mut self) -> Self {
        if let Some(occ) = self.occ_mut() {
            occ.frames.mark();
        }
        self
    }

    /// Move the cursor to the next frame.
    ///
    /// The cursor never passes the last captured stack frame, so a context
    /// holds at most [`ErrorContext::depth`] frames. Lightweight contexts
    /// stay on frame 0.
    pub fn throw(mut self) -> Self {
        if let Some(occ) = self.occ_mut()
            && !occ.lightweight
        {
            let limit = occ.stack.len();
            occ.frames.advance(limit);
        }
        self
    }

    // ── classification ───────────────────────────────────────────────────

    /// Whether this occurrence is exactly of `class`
    #[must_use]
    pub fn is(&self, class: &Class) -> bool {
        class.is_valid() && self.owned_by(class.registry()) && self.class_id() == class.id()
    }

    /// Whether this occurrence is exactly of one of `classes`
    pub fn is_any<'a, I>(&self, classes: I) -> bool
    where
        I: IntoIterator<Item = &'a Class>,
    {
        classes.into_iter().any(|class| self.is(class))
    }

    /// Whether this occurrence's class is one of `classes` or descends from one
    pub fn is_any_deep<'a, I>(&self, classes: I) -> bool
    where
        I: IntoIterator<Item = &'a Class>,
    {
        match &self.slot {
            Some(slot) => slot.registry.descends_from_any(
                slot.occ.class,
                classes
                    .into_iter()
                    .filter(|class| class.registry().ptr_eq(&slot.registry))
                    .map(Class::id),
            ),
            None => false,
        }
    }

    /// Whether this occurrence's class belongs to `namespace`
    #[must_use]
    pub fn of(&self, namespace: &Namespace) -> bool {
        namespace.is_valid()
            && self.owned_by(namespace.registry())
            && self.namespace_id() == namespace.id()
    }

    /// Whether this occurrence's class belongs to one of `namespaces`
    pub fn of_any<'a, I>(&self, namespaces: I) -> bool
    where
        I: IntoIterator<Item = &'a Namespace>,
    {
        namespaces.into_iter().any(|namespace| self.of(namespace))
    }

    // ── accessors ────────────────────────────────────────────────────────

    /// Whether this context holds an occurrence
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.occ().map_or(ClassId::INVALID, |occ| occ.class)
    }

    /// Full class name as it read when the occurrence was created
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.occ()
            .and_then(|occ| occ.class_name.as_deref())
            .unwrap_or("")
    }

    #[must_use]
    pub fn namespace_id(&self) -> NamespaceId {
        self.occ().map_or(NamespaceId::INVALID, |occ| occ.namespace)
    }

    #[must_use]
    pub fn occurrence_id(&self) -> OccurrenceId {
        self.occ().map_or(OccurrenceId::NIL, |occ| occ.occurrence_id)
    }

    /// Index of the frame mutators write to
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.occ().map_or(0, |occ| occ.frames.cursor())
    }

    /// Number of captured stack frames, the bound on [`ErrorContext::throw`]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.occ().map_or(0, |occ| occ.stack.len())
    }

    /// Whether stack capture was skipped for this occurrence
    #[must_use]
    pub fn is_lightweight(&self) -> bool {
        self.occ().is_some_and(|occ| occ.lightweight)
    }

    /// Frames from 0 up to the cursor
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> + '_ {
        self.occ().into_iter().flat_map(|occ| occ.frames.iter())
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> Option<Frame<'_>> {
        self.occ()?.frames.get(index)
    }

    /// Captured call stack; empty for lightweight occurrences
    #[must_use]
    pub fn stack(&self) -> Option<&StackTrace> {
        self.occ().map(|occ| &occ.stack)
    }

    /// Message of the frame under the cursor
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.occ()?.frames.current()?.message()
    }

    /// Registry the occurrence was created from
    #[must_use]
    pub fn registry(&self) -> Option<&Registry> {
        self.slot.as_ref().map(|slot| &slot.registry)
    }

    // ── termination ──────────────────────────────────────────────────────

    /// Return the occurrence to its pool.
    ///
    /// Disarms the drop backstop before handing the instance back.
    pub fn release(mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.occ.disarm();
            slot.registry.pool().release(slot.occ);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.occ().is_some_and(|occ| occ.armed)
    }

    /// Turn this context into a [`Report`] for a sink.
    pub fn into_report(self) -> Report {
        Report::new(self)
    }

    /// Hand the occurrence to `sink`, which releases it after rendering.
    ///
    /// Invalid contexts are not handed off.
    pub fn log(self, sink: &dyn ReportSink) {
        if self.is_valid() {
            sink.consume(self.into_report());
        }
    }

    fn write_detail(&self, occ: &Occurrence, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\n  occurrence: {}\n  cursor: {}",
            occ.occurrence_id,
            occ.frames.cursor()
        )?;
        for frame in occ.frames.iter() {
            let marker = if frame.is_significant() { "*" } else { "" };
            write!(f, "\n  [{}]{marker}", frame.index())?;
            if let Some(message) = frame.message() {
                write!(f, " {message}")?;
            }
            for field in frame.fields() {
                write!(f, " {field}")?;
            }
        }
        Ok(())
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Drop for ErrorContext {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            if slot.occ.armed {
                tracing::debug!(
                    class = slot.occ.class_name.as_deref().unwrap_or(""),
                    occurrence_id = %slot.occ.occurrence_id,
                    "error context dropped without release; reclaiming"
                );
            }
            slot.registry.pool().reclaim(slot.occ);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(occ) = self.occ() else {
            return Ok(());
        };
        f.write_str(occ.class_name.as_deref().unwrap_or(""))?;
        if let Some(message) = occ.frames.get(0).and_then(|frame| frame.message()) {
            write!(f, ": {message}")?;
        }
        if f.alternate() {
            self.write_detail(occ, f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.occ() {
            Some(occ) => f
                .debug_struct("ErrorContext")
                .field("class", &self.class_name())
                .field("occurrence_id", &occ.occurrence_id)
                .field("cursor", &occ.frames.cursor())
                .field("depth", &occ.stack.len())
                .field("lightweight", &occ.lightweight)
                .finish_non_exhaustive(),
            None => f.write_str("ErrorContext(invalid)"),
        }
    }
}

impl std::error::Error for ErrorContext {}
