//! Container conversions
//!
//! Sequences accept either a tuple or a list. Maps accept only a dict.
//! Sets accept a set or a list. Native maps and sets already hold unique
//! keys, so encoding them collects straight into the indexed containers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};

use super::{element, sequence, FromValue, IntoValue};
use crate::error::MarshalError;
use crate::Value;

fn decode_all<T: FromValue>(items: &[Value]) -> Result<Vec<T>, MarshalError> {
    (0..items.len()).map(|i| element(items, i)).collect()
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        decode_all(sequence(value, "list")?)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for VecDeque<T> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        Vec::<T>::from_value(value).map(VecDeque::from)
    }
}

impl<T: IntoValue> IntoValue for VecDeque<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue, const N: usize> FromValue for [T; N] {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        let items = sequence(value, "list")?;
        if items.len() != N {
            return Err(MarshalError::Arity {
                expected: N,
                found: items.len(),
            });
        }
        let decoded = decode_all::<T>(items)?;
        decoded.try_into().map_err(|rest: Vec<T>| MarshalError::Arity {
            expected: N,
            found: rest.len(),
        })
    }
}

impl<T: IntoValue, const N: usize> IntoValue for [T; N] {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<K, V, S> FromValue for HashMap<K, V, S>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
    S: BuildHasher + Default,
{
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Dict(map) => map
                .iter()
                .enumerate()
                .map(|(index, (k, v))| decode_pair(index, k, v))
                .collect(),
            other => Err(MarshalError::mismatch("dict", other)),
        }
    }
}

impl<K: IntoValue, V: IntoValue, S> IntoValue for HashMap<K, V, S> {
    fn into_value(self) -> Value {
        Value::Dict(self.into_iter().map(|(k, v)| (k.into_value(), v.into_value())).collect())
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Dict(map) => map
                .iter()
                .enumerate()
                .map(|(index, (k, v))| decode_pair(index, k, v))
                .collect(),
            other => Err(MarshalError::mismatch("dict", other)),
        }
    }
}

impl<K: IntoValue, V: IntoValue> IntoValue for BTreeMap<K, V> {
    fn into_value(self) -> Value {
        Value::Dict(self.into_iter().map(|(k, v)| (k.into_value(), v.into_value())).collect())
    }
}

fn decode_pair<K: FromValue, V: FromValue>(
    index: usize,
    key: &Value,
    value: &Value,
) -> Result<(K, V), MarshalError> {
    let wrap = |source| MarshalError::Element {
        index,
        source: Box::new(source),
    };
    Ok((
        K::from_value(key).map_err(wrap)?,
        V::from_value(value).map_err(wrap)?,
    ))
}

fn set_items(value: &Value) -> Result<Vec<&Value>, MarshalError> {
    match value {
        Value::Set(items) => Ok(items.iter().collect()),
        Value::List(items) => Ok(items.iter().collect()),
        other => Err(MarshalError::mismatch("set", other)),
    }
}

fn decode_members<T: FromValue, C: FromIterator<T>>(value: &Value) -> Result<C, MarshalError> {
    set_items(value)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            T::from_value(item).map_err(|source| MarshalError::Element {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

impl<T, S> FromValue for HashSet<T, S>
where
    T: FromValue + Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        decode_members::<T, Self>(value)
    }
}

impl<T: IntoValue, S> IntoValue for HashSet<T, S> {
    fn into_value(self) -> Value {
        Value::Set(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        decode_members::<T, Self>(value)
    }
}

impl<T: IntoValue> IntoValue for BTreeSet<T> {
    fn into_value(self) -> Value {
        Value::Set(self.into_iter().map(IntoValue::into_value).collect())
    }
}

macro_rules! impl_tuple {
    ($len:expr => $($idx:tt $name:ident),+) => {
        impl<$($name: IntoValue),+> IntoValue for ($($name,)+) {
            fn into_value(self) -> Value {
                Value::Tuple(vec![$(self.$idx.into_value()),+])
            }
        }

        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn from_value(value: &Value) -> Result<Self, MarshalError> {
                let items = sequence(value, "tuple")?;
                if items.len() != $len {
                    return Err(MarshalError::Arity {
                        expected: $len,
                        found: items.len(),
                    });
                }
                Ok(($(element::<$name>(items, $idx)?,)+))
            }
        }
    };
}

impl_tuple!(1 => 0 A);
impl_tuple!(2 => 0 A, 1 B);
impl_tuple!(3 => 0 A, 1 B, 2 C);
impl_tuple!(4 => 0 A, 1 B, 2 C, 3 D);
impl_tuple!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_tuple!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_tuple!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_tuple!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
