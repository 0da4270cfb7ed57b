//! Frame addressing: messages, fields and the throw cursor.

use nebula_errctx::{Builtin, Config, FieldValue, Registry, StackDepth};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn propagation_scenario() {
    let registry = Registry::new();
    let err = registry
        .builtin(Builtin::IllegalArgument)
        .new_error("")
        .add_message("bad value")
        .add_field("id", 42)
        .throw()
        .add_message("propagated");

    assert_eq!(err.cursor(), 1);
    assert_eq!(err.frames().count(), 2);

    let first = err.frame(0).unwrap();
    assert_eq!(first.message(), Some("bad value"));
    assert_eq!(first.fields().len(), 1);
    assert_eq!(first.field("id"), Some(&FieldValue::Int(42)));

    let second = err.frame(1).unwrap();
    assert_eq!(second.message(), Some("propagated"));
    assert!(second.fields().is_empty());
    err.release();
}

#[test]
fn mark_flags_only_current_frame() {
    let registry = Registry::new();
    let err = registry
        .builtin(Builtin::Internal)
        .new_error("root cause")
        .mark()
        .throw()
        .add_message("context");

    let flags: Vec<bool> = err.frames().map(|f| f.is_significant()).collect();
    assert_eq!(flags, [true, false]);
    err.release();
}

#[test]
fn throw_saturates_at_captured_depth() {
    let registry = Registry::builder()
        .config(Config {
            stack: nebula_errctx::StackConfig {
                depth: StackDepth::Bounded(2),
                skip: 0,
            },
            ..Config::default()
        })
        .build()
        .unwrap();

    let mut err = registry.builtin(Builtin::Internal).new_error("shallow");
    assert_eq!(err.depth(), 2);
    for _ in 0..10 {
        err = err.throw();
    }
    assert_eq!(err.cursor(), 1);
    assert_eq!(err.frames().count(), 2);

    let err = err.add_message("last");
    assert_eq!(err.frame(1).unwrap().message(), Some("last"));
    err.release();
}

#[test]
fn lightweight_stays_on_frame_zero() {
    let registry = Registry::new();
    let mut err = registry
        .builtin(Builtin::Timeout)
        .new_light("fast path")
        .add_field("attempt", 1);
    for _ in 0..5 {
        err = err.throw().add_message("overwritten");
    }

    assert!(err.is_lightweight());
    assert_eq!(err.cursor(), 0);
    assert_eq!(err.depth(), 0);
    assert!(err.stack().unwrap().is_empty());
    assert_eq!(err.frames().count(), 1);
    assert_eq!(err.message(), Some("overwritten"));
    assert_eq!(err.frame(0).unwrap().field("attempt"), Some(&FieldValue::Int(1)));
    err.release();
}

#[test]
fn new_error_with_attaches_fields() {
    let registry = Registry::new();
    let err = registry
        .builtin(Builtin::IllegalArgument)
        .new_error_with("out of range", [("min", 0), ("max", 10), ("value", 11)]);

    let keys: Vec<String> = err
        .frame(0)
        .unwrap()
        .fields()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(keys, ["min=0", "max=10", "value=11"]);
    err.release();
}

#[test]
fn wrap_light_merges_cause() {
    let registry = Registry::new();
    let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err = registry
        .builtin(Builtin::External)
        .wrap_light(&cause, "open config");

    assert_eq!(err.to_string(), "External: open config: no such file");
    assert!(err.is_lightweight());
    err.release();
}

#[test]
fn stack_starts_in_caller() {
    let registry = Registry::new();
    let err = registry.builtin(Builtin::Internal).new_error("where");
    let stack = err.stack().unwrap();
    assert!(!stack.is_empty());
    for frame in stack.iter().take(1) {
        if let Some(function) = &frame.location().function {
            assert!(!function.starts_with("nebula_errctx::"), "{function}");
        }
    }
    err.release();
}

proptest! {
    #[test]
    fn throws_open_one_frame_each(messages in prop::collection::vec("[a-z]{1,8}", 0..12)) {
        let registry = Registry::new();
        let mut err = registry.builtin(Builtin::Internal).new_error("start");
        let depth = err.depth();
        prop_assume!(depth > 0);

        for message in &messages {
            err = err.throw().add_message(message);
        }

        let expected = (messages.len() + 1).min(depth);
        prop_assert_eq!(err.frames().count(), expected);
        prop_assert_eq!(err.cursor(), expected - 1);
        if depth > 1 || messages.is_empty() {
            prop_assert_eq!(err.frame(0).unwrap().message(), Some("start"));
        }
        if expected == messages.len() + 1 {
            for (index, message) in messages.iter().enumerate() {
                prop_assert_eq!(err.frame(index + 1).unwrap().message(), Some(message.as_str()));
            }
        }
        err.release();
    }
}

#[test]
fn wrap_with_attaches_fields_to_merged_frame() {
    let registry = Registry::new();
    let err = registry.builtin(Builtin::External).wrap_with(
        "503 Service Unavailable",
        "call billing",
        [("attempt", 3)],
    );

    let frame = err.frame(0).unwrap();
    assert_eq!(frame.message(), Some("call billing: 503 Service Unavailable"));
    assert_eq!(frame.field("attempt"), Some(&FieldValue::Int(3)));
    assert!(!err.is_lightweight());
    err.release();
}
