//! Pointer conversions through tagged capsules
//!
//! Encoding never transfers ownership. Decoding checks the capsule tag, the
//! caller still owns the question of whether the pointee is alive.

use std::ptr::NonNull;

use super::{FromValue, IntoValue};
use crate::error::MarshalError;
use crate::interop::{self, Capsule};
use crate::Value;

impl FromValue for Capsule {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        interop::capsule_of(value).ok_or_else(|| MarshalError::mismatch("capsule", value))
    }
}

impl IntoValue for Capsule {
    #[inline]
    fn into_value(self) -> Value {
        Value::Capsule(self)
    }
}

impl<T: 'static> FromValue for NonNull<T> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        interop::resolve::<T>(value)
    }
}

impl<T: 'static> IntoValue for NonNull<T> {
    fn into_value(self) -> Value {
        Value::Capsule(Capsule::new(self))
    }
}

// Null pointers travel as None
impl<T: 'static> FromValue for *mut T {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::None => Ok(std::ptr::null_mut()),
            other => interop::resolve::<T>(other).map(NonNull::as_ptr),
        }
    }
}

impl<T: 'static> IntoValue for *mut T {
    fn into_value(self) -> Value {
        Capsule::from_raw(self).map_or(Value::None, Value::Capsule)
    }
}

impl<T: 'static> FromValue for *const T {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        <*mut T>::from_value(value).map(|ptr| ptr as *const T)
    }
}

impl<T: 'static> IntoValue for *const T {
    fn into_value(self) -> Value {
        (self as *mut T).into_value()
    }
}
