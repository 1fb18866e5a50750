//! Value marshaling - native types ↔ interpreter values
//!
//! Design: two traits, one per direction, implemented for every supported
//! native shape:
//! - `primitives.rs` - integers, floats, bool, strings, bytes, unit, Option
//! - `containers.rs` - tuples, fixed arrays, sequences, maps, sets
//! - `pointers.rs` - raw pointers and capsules through tagged capsules
//!
//! Applications add their own types by implementing both traits.

mod containers;
mod pointers;
mod primitives;

pub use primitives::ByteBuf;

use crate::error::MarshalError;
use crate::logging;
use crate::Value;

/// Convert a native value into an interpreter value
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Convert an interpreter value into a native value
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, MarshalError>;
}

/// Encode a native value
#[inline]
pub fn encode<T: IntoValue>(value: T) -> Value {
    value.into_value()
}

/// Decode into `out`, leaving it untouched on failure
pub fn decode<T: FromValue>(value: &Value, out: &mut T) -> bool {
    match T::from_value(value) {
        Ok(decoded) => {
            *out = decoded;
            true
        }
        Err(err) => {
            logging::log_marshal_failure(std::any::type_name::<T>(), &err);
            false
        }
    }
}

/// Decode, reporting why conversion failed
#[inline]
pub fn try_decode<T: FromValue>(value: &Value) -> Result<T, MarshalError> {
    T::from_value(value)
}

/// Elements of a tuple or list
pub(crate) fn sequence<'a>(
    value: &'a Value,
    expected: &'static str,
) -> Result<&'a [Value], MarshalError> {
    value
        .as_sequence()
        .ok_or_else(|| MarshalError::mismatch(expected, value))
}

/// Decode one element, tagging failures with its index
pub(crate) fn element<T: FromValue>(items: &[Value], index: usize) -> Result<T, MarshalError> {
    T::from_value(&items[index]).map_err(|source| MarshalError::Element {
        index,
        source: Box::new(source),
    })
}

#[cfg(test)]
mod tests;
