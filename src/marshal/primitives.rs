//! Scalar conversions

use super::{FromValue, IntoValue};
use crate::error::MarshalError;
use crate::Value;

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, MarshalError> {
                match value {
                    Value::Int(n) => <$ty>::try_from(*n).map_err(|_| MarshalError::OutOfRange {
                        value: n.to_string(),
                        target: stringify!($ty),
                    }),
                    other => Err(MarshalError::mismatch("int", other)),
                }
            }
        }

        // Lossless: every source type fits in i128
        impl IntoValue for $ty {
            #[inline]
            fn into_value(self) -> Value {
                Value::Int(self as i128)
            }
        }
    )*};
}

impl_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Float(x) => Ok(*x),
            Value::Int(n) => Ok(*n as f64),
            other => Err(MarshalError::mismatch("float", other)),
        }
    }
}

impl IntoValue for f64 {
    #[inline]
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        let wide = f64::from_value(value)?;
        let narrow = wide as f32;
        if wide.is_finite() && narrow.is_infinite() {
            return Err(MarshalError::OutOfRange {
                value: wide.to_string(),
                target: "f32",
            });
        }
        Ok(narrow)
    }
}

impl IntoValue for f32 {
    #[inline]
    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(MarshalError::mismatch("bool", other)),
        }
    }
}

impl IntoValue for bool {
    #[inline]
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            Value::Bytes(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| MarshalError::InvalidUtf8)
            }
            other => Err(MarshalError::mismatch("str", other)),
        }
    }
}

impl IntoValue for String {
    #[inline]
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    #[inline]
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl FromValue for char {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        let s = value
            .as_str()
            .ok_or_else(|| MarshalError::mismatch("str", value))?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(MarshalError::Arity {
                expected: 1,
                found: s.chars().count(),
            }),
        }
    }
}

impl IntoValue for char {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

/// Owned byte buffer, marshaled as `bytes`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuf(pub Vec<u8>);

impl ByteBuf {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(bytes: Vec<u8>) -> Self {
        ByteBuf(bytes)
    }
}

impl FromValue for ByteBuf {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::Bytes(bytes) => Ok(ByteBuf(bytes.clone())),
            other => Err(MarshalError::mismatch("bytes", other)),
        }
    }
}

impl IntoValue for ByteBuf {
    #[inline]
    fn into_value(self) -> Value {
        Value::Bytes(self.0)
    }
}

impl IntoValue for &[u8] {
    fn into_value(self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

// Unit is the "no value" sentinel
impl FromValue for () {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::None => Ok(()),
            other => Err(MarshalError::mismatch("None", other)),
        }
    }
}

impl IntoValue for () {
    #[inline]
    fn into_value(self) -> Value {
        Value::None
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        match value {
            Value::None => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(inner) => inner.into_value(),
            None => Value::None,
        }
    }
}

impl FromValue for Value {
    #[inline]
    fn from_value(value: &Value) -> Result<Self, MarshalError> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    #[inline]
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &Value {
    #[inline]
    fn into_value(self) -> Value {
        self.clone()
    }
}
