//! Tests for adapters, the dispatch table and capsules

use std::ptr::NonNull;

use super::*;
use crate::error::{CallError, MarshalError};
use crate::Value;

struct Counter {
    count: i64,
}

fn args(items: Vec<Value>) -> Value {
    Value::Tuple(items)
}

fn adapter_of<Args, F: NativeCallable<Args>>(f: F) -> (Signature, Adapter) {
    (F::signature(), f.into_adapter())
}

fn method_of<T, Args, F: NativeMethod<T, Args>>(f: F) -> (Signature, Adapter) {
    (F::signature(), f.into_adapter())
}

#[test]
fn test_signature_describes_free_function() {
    let (sig, _) = adapter_of(|a: i64, b: f64| a as f64 + b);
    assert_eq!(sig.receiver, Receiver::None);
    assert_eq!(sig.arity(), 2);
    assert_eq!(sig.flags(), CallFlags::VarArgs);
    assert!(sig.returns_value);
    assert!(!sig.is_bound());
    assert_eq!(sig.to_string(), "(i64, f64) -> f64");
}

#[test]
fn test_signature_of_void_nullary() {
    let (sig, adapter) = adapter_of(|| {});
    assert_eq!(sig.flags(), CallFlags::NoArgs);
    assert!(!sig.returns_value);
    assert_eq!(adapter(None, &args(vec![])), Ok(Value::None));
}

#[test]
fn test_free_adapter_decodes_and_encodes() {
    let (_, add) = adapter_of(|a: i64, b: i64| a + b);
    assert_eq!(add(None, &args(vec![Value::Int(2), Value::Int(3)])), Ok(Value::Int(5)));
}

#[test]
fn test_arity_is_enforced() {
    let (_, add) = adapter_of(|a: i64, b: i64| a + b);
    for count in [0usize, 1, 3] {
        let items = vec![Value::Int(1); count];
        assert_eq!(
            add(None, &args(items)),
            Err(CallError::Marshal(MarshalError::Arity {
                expected: 2,
                found: count,
            }))
        );
    }

    let (_, nullary) = adapter_of(|| 1i64);
    assert!(nullary(None, &args(vec![Value::None])).is_err());
}

#[test]
fn test_decode_failure_names_the_argument() {
    let (_, add) = adapter_of(|a: i64, b: i64| a + b);
    let err = add(None, &args(vec![Value::str("a"), Value::Int(3)])).unwrap_err();
    match err {
        CallError::Marshal(MarshalError::Argument { position, source }) => {
            assert_eq!(position, 0);
            assert!(matches!(*source, MarshalError::TypeMismatch { expected: "int", .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_native_callable_is_not_invoked_on_bad_arguments() {
    use std::cell::Cell;
    use std::rc::Rc;

    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let (_, f) = adapter_of(move |x: i64| {
        seen.set(seen.get() + 1);
        x
    });

    assert!(f(None, &args(vec![Value::Float(1.5)])).is_err());
    assert_eq!(calls.get(), 0);
    assert_eq!(f(None, &args(vec![Value::Int(9)])), Ok(Value::Int(9)));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_result_return_becomes_native_error() {
    let (sig, div) = adapter_of(|a: i64, b: i64| -> Result<i64, String> {
        if b == 0 {
            Err("division by zero".to_string())
        } else {
            Ok(a / b)
        }
    });
    assert!(sig.returns_value);
    assert_eq!(div(None, &args(vec![Value::Int(6), Value::Int(3)])), Ok(Value::Int(2)));
    assert_eq!(
        div(None, &args(vec![Value::Int(1), Value::Int(0)])),
        Err(CallError::Native("division by zero".to_string()))
    );
}

#[test]
fn test_eight_argument_callable() {
    let (sig, sum) = adapter_of(
        |a: i64, b: i64, c: i64, d: i64, e: i64, f: i64, g: i64, h: i64| a + b + c + d + e + f + g + h,
    );
    assert_eq!(sig.arity(), 8);
    let items = (1..=8).map(Value::Int).collect();
    assert_eq!(sum(None, &args(items)), Ok(Value::Int(36)));
}

#[test]
fn test_bound_method_mutates_receiver() {
    let (sig, increment) = method_of::<Counter, _, _>(|c: &mut Counter, by: i64| c.count += by);
    assert_eq!(sig.receiver, Receiver::Exclusive);
    assert_eq!(sig.arity(), 1);
    assert!(!sig.returns_value);

    let (sig, get) = method_of::<Counter, _, _>(|c: &Counter| c.count);
    assert_eq!(sig.receiver, Receiver::Shared);

    let mut counter = Counter { count: 0 };
    let receiver = Value::Capsule(Capsule::new(NonNull::from(&mut counter)));

    assert_eq!(increment(Some(&receiver), &args(vec![Value::Int(2)])), Ok(Value::None));
    assert_eq!(increment(Some(&receiver), &args(vec![Value::Int(3)])), Ok(Value::None));
    assert_eq!(get(Some(&receiver), &args(vec![])), Ok(Value::Int(5)));
    assert_eq!(counter.count, 5);
}

#[test]
fn test_bound_method_checks_receiver() {
    let (_, get) = method_of::<Counter, _, _>(|c: &Counter| c.count);

    assert_eq!(
        get(None, &args(vec![])),
        Err(CallError::Marshal(MarshalError::MissingReceiver))
    );

    let mut other = 3u32;
    let wrong = Value::Capsule(Capsule::new(NonNull::from(&mut other)));
    assert!(matches!(
        get(Some(&wrong), &args(vec![])),
        Err(CallError::Marshal(MarshalError::CapsuleMismatch { .. }))
    ));
}

#[test]
fn test_dispatch_table_slots_are_stable() {
    let mut table = DispatchTable::new();
    assert!(table.is_empty());

    let double = table.stabilize("m.double", adapter_of(|x: i64| x * 2).1);
    let negate = table.stabilize("m.negate", adapter_of(|x: i64| -x).1);
    for i in 0..32 {
        table.stabilize(format!("m.filler{}", i), adapter_of(|| ()).1);
    }

    assert_eq!(table.len(), 34);
    assert_eq!(double.slot().index(), 0);
    assert_eq!(negate.slot().index(), 1);
    assert_eq!(table.label(negate.slot()), Some("m.negate"));

    assert_eq!(double.invoke(&table, None, &args(vec![Value::Int(4)])), Ok(Value::Int(8)));
    assert_eq!(negate.invoke(&table, None, &args(vec![Value::Int(4)])), Ok(Value::Int(-4)));
}

#[test]
fn test_stable_fn_rejects_foreign_table() {
    let mut first = DispatchTable::new();
    let second = DispatchTable::new();
    let f = first.stabilize("m.f", adapter_of(|| 1i64).1);

    assert_eq!(
        f.invoke(&second, None, &args(vec![])),
        Err(CallError::ForeignSlot(f.slot()))
    );
}

#[test]
fn test_dispatch_stats_count_failures() {
    let mut table = DispatchTable::new();
    let f = table.stabilize("m.f", adapter_of(|x: i64| -> Result<i64, &'static str> {
        if x < 0 {
            Err("negative")
        } else {
            Ok(x)
        }
    }).1);

    let _ = f.invoke(&table, None, &args(vec![Value::Int(1)]));
    let _ = f.invoke(&table, None, &args(vec![Value::str("x")]));
    let _ = f.invoke(&table, None, &args(vec![Value::Int(-1)]));

    let stats = table.stats();
    assert_eq!(stats.slots, 1);
    assert_eq!(stats.calls_made, 3);
    assert_eq!(stats.marshaling_errors, 1);
    assert_eq!(stats.native_errors, 1);
}

#[test]
fn test_capsule_resolution_checks_tag() {
    let mut counter = Counter { count: 7 };
    let capsule = Capsule::new(NonNull::from(&mut counter));

    assert!(capsule.is::<Counter>());
    assert_eq!(capsule.key(), TypeKey::of::<Counter>());
    assert!(capsule.key().name().ends_with("Counter"));

    let ptr = capsule.resolve::<Counter>().unwrap();
    assert_eq!(unsafe { ptr.as_ref() }.count, 7);
    assert!(capsule.resolve::<String>().is_err());

    let value = Value::Capsule(capsule);
    assert_eq!(capsule_of(&value), Some(capsule));
    assert!(resolve::<Counter>(&value).is_ok());
    assert!(resolve::<Counter>(&Value::Int(1)).is_err());
}

#[test]
fn test_null_raw_pointer_has_no_capsule() {
    assert!(Capsule::from_raw(std::ptr::null_mut::<Counter>()).is_none());
}
