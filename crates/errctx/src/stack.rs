//! Call-stack capture with lazy symbolization.
//!
//! Capture only records instruction pointers. A frame is symbolized the first
//! time something asks for its function, location or rendered text, and the
//! result is cached on the frame.

use std::ffi::c_void;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::{Retention, StackConfig};

/// Symbol prefixes of frames that belong to the capture machinery itself.
const INTERNAL_PREFIXES: &[&str] = &[
    "nebula_errctx::",
    "<nebula_errctx::",
    "backtrace::",
    "<backtrace::",
];

/// Extra raw frames walked beyond the depth bound so that leading internal
/// frames can be filtered without shortening the user-visible stack.
const INTERNAL_ALLOWANCE: usize = 24;

/// Symbol information for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Demangled function name, without the trailing hash
    pub function: Option<String>,
    /// Source file
    pub file: Option<PathBuf>,
    /// Source line
    pub line: Option<u32>,
}

#[derive(Debug)]
struct Resolved {
    location: Location,
    rendered: String,
}

/// One captured stack level.
#[derive(Debug)]
pub struct StackFrame {
    ip: usize,
    resolved: OnceLock<Resolved>,
}

impl StackFrame {
    fn new(ip: usize) -> Self {
        Self {
            ip,
            resolved: OnceLock::new(),
        }
    }

    /// Instruction pointer recorded at capture
    #[must_use]
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Function, file and line of this frame; symbolized on first call
    pub fn location(&self) -> &Location {
        &self.resolve().location
    }

    /// `function (file:line)` rendering; computed once per frame
    pub fn render(&self) -> &str {
        &self.resolve().rendered
    }

    fn resolve(&self) -> &Resolved {
        self.resolved.get_or_init(|| {
            let location = locate(self.ip);
            let rendered = render_location(&location, self.ip);
            Resolved { location, rendered }
        })
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

/// Frames captured for one error occurrence, innermost first.
#[derive(Debug, Default)]
pub struct StackTrace {
    frames: Vec<StackFrame>,
}

impl StackTrace {
    /// Empty trace with room for `retain`
    #[must_use]
    pub fn with_capacity(retain: &Retention) -> Self {
        Self {
            frames: Vec::with_capacity(retain.stack),
        }
    }

    /// Replace the contents with the current call stack.
    ///
    /// Leading frames inside this crate or the unwinder are filtered first,
    /// then `config.skip` further frames are dropped, then the depth bound is
    /// applied.
    #[inline(never)]
    pub fn capture(&mut self, config: &StackConfig) {
        self.frames.clear();

        let limit = config.depth.limit();
        let walk_limit = limit.map(|n| n.saturating_add(config.skip + INTERNAL_ALLOWANCE));
        backtrace::trace(|frame| {
            self.frames.push(StackFrame::new(frame.ip() as usize));
            walk_limit.is_none_or(|max| self.frames.len() < max)
        });

        let internal = self
            .frames
            .iter()
            .take_while(|frame| is_internal(frame.ip))
            .count();
        let dropped = internal.saturating_add(config.skip).min(self.frames.len());
        self.frames.drain(..dropped);
        if let Some(limit) = limit {
            self.frames.truncate(limit);
        }
    }

    /// Drop all frames, shrinking storage that grew past `retain`
    pub fn clear(&mut self, retain: &Retention) {
        self.frames.clear();
        self.frames.shrink_to(retain.stack);
    }

    /// Number of captured frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at stack position `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StackFrame> {
        self.frames.get(index)
    }

    /// Frames innermost first
    pub fn iter(&self) -> std::slice::Iter<'_, StackFrame> {
        self.frames.iter()
    }
}

impl<'a> IntoIterator for &'a StackTrace {
    type Item = &'a StackFrame;
    type IntoIter = std::slice::Iter<'a, StackFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{index:>4}: {frame}")?;
        }
        Ok(())
    }
}

// Return addresses point past the call; step back into it before lookup.
fn lookup_addr(ip: usize) -> *mut c_void {
    ip.saturating_sub(1) as *mut c_void
}

fn is_internal(ip: usize) -> bool {
    let mut internal = false;
    backtrace::resolve(lookup_addr(ip), |symbol| {
        if let Some(name) = symbol.name() {
            let name = format!("{name:#}");
            internal |= INTERNAL_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix));
        }
    });
    internal
}

fn locate(ip: usize) -> Location {
    let mut location = Location::default();
    backtrace::resolve(lookup_addr(ip), |symbol| {
        if location.function.is_some() {
            return;
        }
        location.function = symbol.name().map(|name| format!("{name:#}"));
        location.file = symbol.filename().map(PathBuf::from);
        location.line = symbol.lineno();
    });
    location
}

fn render_location(location: &Location, ip: usize) -> String {
    let function = location.function.as_deref().unwrap_or("<unknown>");
    match (&location.file, location.line) {
        (Some(file), Some(line)) => format!("{function} ({}:{line})", file.display()),
        (Some(file), None) => format!("{function} ({})", file.display()),
        _ => format!("{function} ({ip:#x})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackDepth;

    #[test]
    fn capture_respects_bound() {
        let mut trace = StackTrace::default();
        trace.capture(&StackConfig {
            depth: StackDepth::Bounded(3),
            skip: 0,
        });
        assert!(!trace.is_empty());
        assert!(trace.len() <= 3);
    }

    #[test]
    fn skip_is_independent_of_depth() {
        let mut full = StackTrace::default();
        full.capture(&StackConfig {
            depth: StackDepth::Unbounded,
            skip: 0,
        });
        let mut skipped = StackTrace::default();
        skipped.capture(&StackConfig {
            depth: StackDepth::Unbounded,
            skip: 1,
        });
        assert_eq!(skipped.len() + 1, full.len());
    }

    #[test]
    fn leading_frames_are_not_internal() {
        let mut trace = StackTrace::default();
        trace.capture(&StackConfig::default());
        if let Some(function) = trace.get(0).and_then(|f| f.location().function.clone()) {
            assert!(!function.starts_with("backtrace::"), "{function}");
            assert!(!function.starts_with("nebula_errctx::"), "{function}");
        }
    }

    #[test]
    fn render_is_cached() {
        let mut trace = StackTrace::default();
        trace.capture(&StackConfig::default());
        let frame = trace.get(0).unwrap();
        let first = frame.render() as *const str;
        let second = frame.render() as *const str;
        assert_eq!(first, second);
    }

    #[test]
    fn clear_empties_trace() {
        let mut trace = StackTrace::default();
        trace.capture(&StackConfig::default());
        trace.clear(&Retention::default());
        assert!(trace.is_empty());
        assert_eq!(trace.to_string(), "");
    }

    #[test]
    fn unknown_location_renders_address() {
        let rendered = render_location(&Location::default(), 0x10);
        assert_eq!(rendered, "<unknown> (0x10)");
    }
}
