//! # Nebula Error Context
//!
//! Classified, pooled error occurrences for the Nebula workflow engine.
//!
//! Errors are instances of registered classes. Classes live in namespaces and
//! may have subclasses, so a handler can match an exact class, a whole family,
//! or everything from one namespace. Each occurrence carries a captured call
//! stack, a unique occurrence id and a list of frames; a frame holds a message
//! and typed fields, and [`ErrorContext::throw`] moves on to the next frame as
//! the error propagates.
//!
//! Occurrence instances are recycled through a lock-free pool owned by the
//! [`Registry`], so building an error on a hot path allocates nothing once the
//! pool is warm.
//!
//! ```
//! use nebula_errctx::{Builtin, Registry};
//!
//! let registry = Registry::new();
//! let storage = registry.create_namespace("storage");
//! let io = storage.create_class("Io");
//! let disk_full = io.create_subclass("DiskFull");
//!
//! let err = disk_full
//!     .new_error("write rejected")
//!     .add_field("bytes", 4096u64)
//!     .throw()
//!     .add_message("flushing checkpoint");
//!
//! assert!(err.is_any_deep([&io]));
//! assert!(!err.is_any([&io]));
//! assert!(err.of(&storage));
//! assert_eq!(err.to_string(), "storage.Io.DiskFull: write rejected");
//! assert!(!err.is(&registry.builtin(Builtin::Internal)));
//! err.release();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod frame;
pub mod id;
pub mod registry;
pub mod report;
pub mod stack;

mod pool;

pub use config::{Config, Retention, StackConfig, StackDepth};
pub use context::ErrorContext;
pub use error::{Error, Result};
pub use field::{Field, FieldValue, RESERVED_KEYS, is_valid_key};
pub use frame::Frame;
pub use id::{
    ClassId, NamespaceId, OccurrenceId, OccurrenceIdSource, SENTINEL_ID, UlidSource, is_valid_id,
};
pub use pool::PoolStats;
pub use registry::{
    Builtin, COMMON_NAMESPACE, Class, DIRECT_SLOTS, Namespace, Registry, RegistryBuilder,
};
pub use report::{Report, ReportSink, TracingSink};
pub use stack::{Location, StackFrame, StackTrace};
