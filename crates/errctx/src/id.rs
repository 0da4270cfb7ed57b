//! Identifiers for namespaces, classes and error occurrences.
//!
//! Namespace and class ids are `u32` values handed out by a registry's
//! monotonic counters. `0` and [`u32::MAX`] are never assigned; the latter is
//! the sentinel carried by invalid handles.
//!
//! Occurrence ids are minted per error by an [`OccurrenceIdSource`]. The
//! default source produces ULIDs, which sort lexicographically by creation
//! time.

use std::fmt;

use parking_lot::Mutex;
use ulid::{Generator, Ulid};

/// Id carried by invalid namespaces and classes
pub const SENTINEL_ID: u32 = u32::MAX;

/// Whether `id` can name a registered namespace or class.
///
/// Pure check; says nothing about whether the id was actually assigned.
#[inline]
#[must_use]
pub const fn is_valid_id(id: u32) -> bool {
    id > 0 && id != SENTINEL_ID
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// The sentinel id of invalid handles
            pub const INVALID: Self = Self(SENTINEL_ID);

            /// Wrap a raw id without checking it
            #[inline]
            #[must_use]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw numeric value
            #[inline]
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }

            /// See [`is_valid_id`]
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                is_valid_id(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Registry-unique namespace identifier
    NamespaceId
);
define_id!(
    /// Registry-unique class identifier
    ClassId
);

/// Unique, time-sortable identifier of one error occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OccurrenceId(Ulid);

impl OccurrenceId {
    /// The all-zero id, carried by pooled instances between occurrences
    pub const NIL: Self = Self(Ulid::nil());

    /// Wrap a ULID
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// The underlying ULID
    #[must_use]
    pub const fn ulid(self) -> Ulid {
        self.0
    }

    /// Whether this is [`OccurrenceId::NIL`]
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }
}

impl Default for OccurrenceId {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Source of fresh occurrence ids.
///
/// Implementations must be safe to call from many threads at once and must
/// never return the same id twice.
pub trait OccurrenceIdSource: Send + Sync {
    /// Mint a new id
    fn next_id(&self) -> OccurrenceId;
}

/// Default source: a monotonic ULID generator.
///
/// Ids minted within the same millisecond increment the random part, so the
/// sequence is strictly increasing even under contention.
pub struct UlidSource {
    generator: Mutex<Generator>,
}

impl UlidSource {
    /// Create a new source
    #[must_use]
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UlidSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UlidSource").finish_non_exhaustive()
    }
}

impl OccurrenceIdSource for UlidSource {
    fn next_id(&self) -> OccurrenceId {
        let mut generator = self.generator.lock();
        // Overflow of the random part within one millisecond is the only
        // failure; a fresh random ULID is still unique with overwhelming odds.
        let ulid = generator.generate().unwrap_or_else(|_| Ulid::new());
        OccurrenceId(ulid)
    }
}
