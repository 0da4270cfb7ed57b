//! Per-occurrence frame storage.
//!
//! Frames live in one contiguous arena addressed by index. Their fields share
//! a second arena and their messages a text buffer; a frame only records the
//! spans it owns. Only the frame under the cursor is ever written and the
//! cursor only moves forward, so each frame's fields stay contiguous.
//!
//! Clearing keeps every buffer's capacity, which makes reuse of a pooled
//! store allocation-free for the common few-frame error.

use std::ops::Range;

use crate::config::Retention;
use crate::field::{Field, FieldValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    start: u32,
    len: u32,
}

impl Span {
    /// Span of `len` items at `start`, `None` when it does not fit in `u32`
    fn at(start: usize, len: usize) -> Option<Self> {
        let start = u32::try_from(start).ok()?;
        let len = u32::try_from(len).ok()?;
        start.checked_add(len)?;
        Some(Self { start, len })
    }

    fn range(self) -> Range<usize> {
        let start = self.start as usize;
        start..start + self.len as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    message: Option<Span>,
    fields: Span,
    significant: bool,
}

/// Ordered frames of one error occurrence with a write cursor.
#[derive(Debug, Default)]
pub struct FrameStore {
    slots: Vec<Slot>,
    fields: Vec<Field>,
    text: String,
}

impl FrameStore {
    /// Empty store with room for `retain`
    #[must_use]
    pub fn with_capacity(retain: &Retention) -> Self {
        Self {
            slots: Vec::with_capacity(retain.frames),
            fields: Vec::with_capacity(retain.fields),
            text: String::with_capacity(retain.text),
        }
    }

    /// Open frame 0. Idempotent.
    pub fn seed(&mut self) {
        if self.slots.is_empty() {
            self.slots.push(Slot {
                fields: self.next_field_span(),
                ..Slot::default()
            });
        }
    }

    /// Index of the frame under the cursor
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    /// Number of frames opened so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no frame has been opened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Move the cursor to a new frame unless that would reach `limit` frames.
    ///
    /// Returns whether the cursor moved.
    pub fn advance(&mut self, limit: usize) -> bool {
        if self.slots.is_empty() || self.slots.len() >= limit {
            return false;
        }
        let fields = self.next_field_span();
        self.slots.push(Slot {
            fields,
            ..Slot::default()
        });
        true
    }

    /// Replace the current frame's message with `text`.
    ///
    /// A replaced message at the end of the text buffer is overwritten in
    /// place. Text that would push the buffer past `u32::MAX` bytes is
    /// dropped and the previous message kept.
    pub fn set_message(&mut self, text: &str) {
        let Some(slot) = self.slots.last_mut() else {
            return;
        };
        let start = match slot.message {
            Some(old) if old.range().end == self.text.len() => old.start as usize,
            _ => self.text.len(),
        };
        let Some(span) = Span::at(start, text.len()) else {
            return;
        };
        self.text.truncate(start);
        self.text.push_str(text);
        slot.message = Some(span);
    }

    /// Append a field to the current frame.
    ///
    /// Dropped once the field arena holds `u32::MAX` entries.
    pub fn push_field(&mut self, field: Field) {
        if let Some(slot) = self.slots.last_mut()
            && let Some(len) = slot.fields.len.checked_add(1)
            && Span::at(self.fields.len(), 1).is_some()
        {
            self.fields.push(field);
            slot.fields.len = len;
        }
    }

    /// Flag the current frame significant
    pub fn mark(&mut self) {
        if let Some(slot) = self.slots.last_mut() {
            slot.significant = true;
        }
    }

    /// Frame at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Frame<'_>> {
        self.slots.get(index).map(|slot| Frame {
            index,
            store: self,
            slot: *slot,
        })
    }

    /// Frame under the cursor
    #[must_use]
    pub fn current(&self) -> Option<Frame<'_>> {
        self.get(self.cursor())
    }

    /// Frames in stack order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Frame<'_>> + '_ {
        self.slots.iter().enumerate().map(move |(index, slot)| Frame {
            index,
            store: self,
            slot: *slot,
        })
    }

    /// Drop all frames, shrinking buffers that grew past `retain`
    pub fn clear(&mut self, retain: &Retention) {
        self.slots.clear();
        self.fields.clear();
        self.text.clear();
        self.slots.shrink_to(retain.frames);
        self.fields.shrink_to(retain.fields);
        self.text.shrink_to(retain.text);
    }

    /// Current buffer capacities as (frames, fields, text bytes)
    #[must_use]
    pub fn capacity(&self) -> (usize, usize, usize) {
        (self.slots.capacity(), self.fields.capacity(), self.text.capacity())
    }

    fn next_field_span(&self) -> Span {
        // push_field keeps the arena length within u32.
        Span {
            start: u32::try_from(self.fields.len()).unwrap_or(u32::MAX),
            len: 0,
        }
    }

    /// Bytes currently held by the text buffer
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.text.len()
    }
}

/// Read view of one frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    index: usize,
    store: &'a FrameStore,
    slot: Slot,
}

impl<'a> Frame<'a> {
    /// Stack position of this frame
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Message attached to this frame
    #[must_use]
    pub fn message(&self) -> Option<&'a str> {
        self.slot.message.map(|span| &self.store.text[span.range()])
    }

    /// Fields attached to this frame, in insertion order
    #[must_use]
    pub fn fields(&self) -> &'a [Field] {
        &self.store.fields[self.slot.fields.range()]
    }

    /// Value of the first field named `key`
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&'a FieldValue> {
        self.fields()
            .iter()
            .find(|field| field.key() == key)
            .map(Field::value)
    }

    /// Whether the frame was flagged with `mark()`
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.slot.significant
    }

    /// Whether the frame carries neither message nor fields
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.slot.message.is_none() && self.slot.fields.len == 0
    }
}
