//! Tests for value marshaling

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ptr::NonNull;

use super::*;
use crate::interop::Capsule;

#[test]
fn test_integer_range_checks() {
    assert_eq!(try_decode::<u8>(&Value::Int(255)), Ok(255));
    assert_eq!(
        try_decode::<u8>(&Value::Int(256)),
        Err(MarshalError::OutOfRange {
            value: "256".to_string(),
            target: "u8",
        })
    );
    assert!(try_decode::<u32>(&Value::Int(-1)).is_err());
    assert_eq!(try_decode::<i64>(&Value::Int(i64::MIN.into())), Ok(i64::MIN));
    assert!(try_decode::<i64>(&Value::Int(i128::from(i64::MAX) + 1)).is_err());
}

#[test]
fn test_bool_is_not_an_int() {
    assert_eq!(
        try_decode::<i32>(&Value::Bool(true)),
        Err(MarshalError::TypeMismatch {
            expected: "int",
            found: "bool",
        })
    );
    assert!(try_decode::<bool>(&Value::Int(1)).is_err());
}

#[test]
fn test_full_width_unsigned_is_lossless() {
    assert_eq!(encode(u64::MAX), Value::Int(u64::MAX.into()));
    assert_eq!(try_decode::<u64>(&encode(u64::MAX)), Ok(u64::MAX));
    assert_eq!(try_decode::<usize>(&encode(usize::MAX)), Ok(usize::MAX));

    let mut out = 0u64;
    assert!(decode(&encode(u64::MAX), &mut out));
    assert_eq!(out, u64::MAX);

    // Above the unsigned target, never wrapped into the signed one
    assert!(try_decode::<i64>(&encode(u64::MAX)).is_err());
}

#[test]
fn test_float_accepts_int() {
    assert_eq!(try_decode::<f64>(&Value::Int(3)), Ok(3.0));
    assert_eq!(try_decode::<f32>(&Value::Float(0.5)), Ok(0.5));
    assert!(matches!(
        try_decode::<f32>(&Value::Float(1e300)),
        Err(MarshalError::OutOfRange { .. })
    ));
    assert!(try_decode::<f64>(&Value::str("1.0")).is_err());
}

#[test]
fn test_strings_and_bytes() {
    assert_eq!(encode("hi"), Value::str("hi"));
    assert_eq!(try_decode::<String>(&Value::Bytes(b"ok".to_vec())), Ok("ok".to_string()));
    assert_eq!(
        try_decode::<String>(&Value::Bytes(vec![0xff, 0xfe])),
        Err(MarshalError::InvalidUtf8)
    );
    assert_eq!(try_decode::<char>(&Value::str("x")), Ok('x'));
    assert!(try_decode::<char>(&Value::str("xy")).is_err());

    let buf = try_decode::<ByteBuf>(&Value::Bytes(vec![1, 2, 3])).unwrap();
    assert_eq!(buf.into_inner(), vec![1, 2, 3]);
    assert!(try_decode::<ByteBuf>(&Value::str("abc")).is_err());
}

#[test]
fn test_decode_leaves_output_untouched_on_failure() {
    let mut out = 17i32;
    assert!(!decode(&Value::str("nope"), &mut out));
    assert_eq!(out, 17);

    assert!(decode(&Value::Int(4), &mut out));
    assert_eq!(out, 4);
}

#[test]
fn test_unit_and_option() {
    assert_eq!(encode(()), Value::None);
    assert_eq!(try_decode::<Option<i64>>(&Value::None), Ok(None));
    assert_eq!(try_decode::<Option<i64>>(&Value::Int(2)), Ok(Some(2)));
    assert_eq!(encode(None::<i64>), Value::None);
}

#[test]
fn test_tuples_require_exact_arity() {
    let value = Value::tuple([Value::Int(1), Value::str("a")]);
    assert_eq!(try_decode::<(i32, String)>(&value), Ok((1, "a".to_string())));

    let list = Value::list([Value::Int(1), Value::str("a")]);
    assert_eq!(try_decode::<(i32, String)>(&list), Ok((1, "a".to_string())));

    assert_eq!(
        try_decode::<(i32, String, bool)>(&value),
        Err(MarshalError::Arity {
            expected: 3,
            found: 2,
        })
    );
}

#[test]
fn test_element_errors_name_their_index() {
    let value = Value::list([Value::Int(1), Value::str("two"), Value::Int(3)]);
    let err = try_decode::<Vec<i64>>(&value).unwrap_err();
    match &err {
        MarshalError::Element { index, .. } => assert_eq!(*index, 1),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        err.root(),
        &MarshalError::TypeMismatch {
            expected: "int",
            found: "str",
        }
    );
}

#[test]
fn test_fixed_arrays() {
    let value = Value::tuple([Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]);
    assert_eq!(try_decode::<[f64; 3]>(&value), Ok([1.0, 2.0, 3.0]));
    assert!(matches!(
        try_decode::<[f64; 4]>(&value),
        Err(MarshalError::Arity { expected: 4, found: 3 })
    ));
}

#[test]
fn test_sequences_keep_order() {
    let deque: VecDeque<i32> = VecDeque::from(vec![3, 1, 2]);
    let value = encode(deque.clone());
    assert_eq!(value, Value::list([Value::Int(3), Value::Int(1), Value::Int(2)]));
    assert_eq!(try_decode::<VecDeque<i32>>(&value), Ok(deque));
}

#[test]
fn test_maps_accept_only_dicts() {
    let mut map = HashMap::new();
    map.insert("a".to_string(), 1i64);
    map.insert("b".to_string(), 2i64);

    let value = encode(map.clone());
    assert_eq!(try_decode::<HashMap<String, i64>>(&value), Ok(map));

    let ordered = try_decode::<BTreeMap<String, i64>>(&value).unwrap();
    assert_eq!(ordered.keys().collect::<Vec<_>>(), vec!["a", "b"]);

    let pairs = Value::list([Value::tuple([Value::str("a"), Value::Int(1)])]);
    assert!(matches!(
        try_decode::<HashMap<String, i64>>(&pairs),
        Err(MarshalError::TypeMismatch { expected: "dict", .. })
    ));
}

#[test]
fn test_sets_accept_set_or_list() {
    let from_list = try_decode::<BTreeSet<i32>>(&Value::list([Value::Int(2), Value::Int(1), Value::Int(2)]));
    assert_eq!(from_list, Ok([1, 2].into_iter().collect()));

    let set: BTreeSet<i32> = [5, 6].into_iter().collect();
    assert_eq!(try_decode::<BTreeSet<i32>>(&encode(set.clone())), Ok(set));
}

#[test]
fn test_pointers_travel_as_tagged_capsules() {
    let mut slot = 41u32;
    let ptr: *mut u32 = &mut slot;

    let value = encode(ptr);
    assert!(matches!(value, Value::Capsule(_)));

    let back = try_decode::<*mut u32>(&value).unwrap();
    assert_eq!(back, ptr);

    assert!(matches!(
        try_decode::<*mut u64>(&value),
        Err(MarshalError::CapsuleMismatch { .. })
    ));

    let nn = try_decode::<NonNull<u32>>(&value).unwrap();
    assert_eq!(nn.as_ptr(), ptr);
}

#[test]
fn test_null_pointer_is_none() {
    assert_eq!(encode(std::ptr::null_mut::<u8>()), Value::None);
    assert!(try_decode::<*const u8>(&Value::None).unwrap().is_null());
    assert!(try_decode::<NonNull<u8>>(&Value::None).is_err());
}

#[test]
fn test_capsule_passthrough() {
    let mut data = [0u8; 4];
    let capsule = Capsule::from_raw(data.as_mut_ptr()).unwrap();
    assert_eq!(try_decode::<Capsule>(&encode(capsule)), Ok(capsule));
    assert!(try_decode::<Capsule>(&Value::Int(0)).is_err());
}

#[test]
fn test_value_passes_through() {
    let value = Value::dict([(Value::str("k"), Value::list([Value::None]))]);
    assert_eq!(try_decode::<Value>(&value), Ok(value.clone()));
    assert_eq!(encode(&value), value);
}
