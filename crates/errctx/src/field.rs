//! Typed key-value fields attached to error frames.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Keys the renderer emits for system metadata; user fields may not shadow them.
pub const RESERVED_KEYS: &[&str] = &[
    "class",
    "class_id",
    "namespace_id",
    "occurrence_id",
    "message",
    "stack",
];

/// Whether `key` may name a user field.
///
/// Accepted keys are non-empty, not reserved, and made of ASCII
/// alphanumerics, `_`, `.` and `-`.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        && !RESERVED_KEYS.contains(&key)
}

/// Value of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    Uint(u64),
    /// Floating point number
    Float(f64),
    /// Text
    Str(Cow<'static, str>),
    /// Time span
    Duration(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Duration(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! impl_from_value {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for FieldValue {
                fn from(value: $source) -> Self {
                    Self::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from_value!(Int as i64: i8, i16, i32, i64);
impl_from_value!(Uint as u64: u8, u16, u32, u64);
impl_from_value!(Float as f64: f32, f64);

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<isize> for FieldValue {
    fn from(value: isize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        Self::Uint(value as u64)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(Cow::Owned(value.to_owned()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for FieldValue {
    fn from(value: Cow<'static, str>) -> Self {
        Self::Str(value)
    }
}

/// One key-value pair of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: Cow<'static, str>,
    value: FieldValue,
}

impl Field {
    /// Build a field, or `None` when the key is reserved or malformed
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<FieldValue>) -> Option<Self> {
        let key = key.into();
        is_valid_key(&key).then(|| Self {
            key,
            value: value.into(),
        })
    }

    /// Field key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Field value
    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("id", true)]
    #[case("user.id", true)]
    #[case("retry-after_ms", true)]
    #[case("", false)]
    #[case("has space", false)]
    #[case("naïve", false)]
    #[case("class", false)]
    #[case("occurrence_id", false)]
    #[case("stack", false)]
    fn key_validation(#[case] key: &str, #[case] expected: bool) {
        assert_eq!(is_valid_key(key), expected);
    }

    #[test]
    fn conversions_pick_variant() {
        assert_eq!(FieldValue::from(42), FieldValue::Int(42));
        assert_eq!(FieldValue::from(42u8), FieldValue::Uint(42));
        assert_eq!(FieldValue::from(7usize), FieldValue::Uint(7));
        assert_eq!(FieldValue::from(true), FieldValue::Bool(true));
        assert_eq!(FieldValue::from(1.5f32), FieldValue::Float(1.5));
        assert_eq!(FieldValue::from("x"), FieldValue::Str(Cow::Borrowed("x")));
    }

    #[test]
    fn field_rejects_reserved() {
        assert!(Field::new("message", "shadow").is_none());
        let field = Field::new("attempt", 3u32).unwrap();
        assert_eq!(field.key(), "attempt");
        assert_eq!(field.to_string(), "attempt=3");
    }

    #[test]
    fn string_values_render_quoted() {
        let field = Field::new("path", "/tmp/x").unwrap();
        assert_eq!(field.to_string(), "path=\"/tmp/x\"");
    }
}
