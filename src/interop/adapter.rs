//! Call adapters - uniform entry points generated from native signatures
//!
//! Every registered callable is erased to one shape:
//! `(receiver, args) -> Result<Value, CallError>`. The arity, argument types,
//! return type and receiver kind come from the callable's static type, so the
//! generated adapter decodes exactly what the native code expects.

use std::any::{type_name, TypeId};
use std::fmt;

use super::capsule;
use crate::error::{CallError, MarshalError};
use crate::marshal::{FromValue, IntoValue};
use crate::Value;

/// Type-erased adapter stored in the dispatch table
pub type Adapter = Box<dyn Fn(Option<&Value>, &Value) -> Result<Value, CallError>>;

/// Calling convention flags reported to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFlags {
    /// Takes no arguments
    NoArgs,
    /// Takes a positional argument tuple
    VarArgs,
}

/// How a callable receives its instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    None,
    Shared,
    Exclusive,
}

/// Static description of a native callable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub receiver: Receiver,
    pub params: Vec<&'static str>,
    pub ret: &'static str,
    pub returns_value: bool,
}

impl Signature {
    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn flags(&self) -> CallFlags {
        if self.params.is_empty() {
            CallFlags::NoArgs
        } else {
            CallFlags::VarArgs
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.receiver != Receiver::None
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        match self.receiver {
            Receiver::None => {}
            Receiver::Shared => f.write_str("&self")?,
            Receiver::Exclusive => f.write_str("&mut self")?,
        }
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 || self.is_bound() {
                f.write_str(", ")?;
            }
            f.write_str(param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// Return values a native callable may produce
///
/// Any `IntoValue` is returned as-is, `()` is the "no value" sentinel.
/// `Result` lets callables raise an error into the interpreter.
pub trait IntoReturn {
    fn into_return(self) -> Result<Value, CallError>;

    fn returns_value() -> bool;
}

impl<T: IntoValue + 'static> IntoReturn for T {
    #[inline]
    fn into_return(self) -> Result<Value, CallError> {
        Ok(self.into_value())
    }

    fn returns_value() -> bool {
        TypeId::of::<T>() != TypeId::of::<()>()
    }
}

impl<T: IntoValue + 'static, E: fmt::Display> IntoReturn for Result<T, E> {
    fn into_return(self) -> Result<Value, CallError> {
        self.map(IntoValue::into_value)
            .map_err(|err| CallError::Native(err.to_string()))
    }

    fn returns_value() -> bool {
        TypeId::of::<T>() != TypeId::of::<()>()
    }
}

/// Free function convertible into an adapter
pub trait NativeCallable<Args>: 'static {
    fn signature() -> Signature;

    fn into_adapter(self) -> Adapter;
}

/// Receiver-bound function convertible into an adapter
pub trait NativeMethod<T, Args>: 'static {
    fn signature() -> Signature;

    fn into_adapter(self) -> Adapter;
}

/// Marker for `Fn(&T, ...)`
pub struct ByRef;

/// Marker for `Fn(&mut T, ...)`
pub struct ByMut;

#[inline]
fn erase<F>(adapter: F) -> Adapter
where
    F: Fn(Option<&Value>, &Value) -> Result<Value, CallError> + 'static,
{
    Box::new(adapter)
}

/// Check the argument tuple carries exactly `arity` elements
#[inline]
fn unpack_args(args: &Value, arity: usize) -> Result<&[Value], MarshalError> {
    let items = match args {
        Value::Tuple(items) => items.as_slice(),
        other => return Err(MarshalError::mismatch("tuple", other)),
    };
    if items.len() != arity {
        return Err(MarshalError::Arity {
            expected: arity,
            found: items.len(),
        });
    }
    Ok(items)
}

#[inline]
fn decode_arg<T: FromValue>(items: &[Value], position: usize) -> Result<T, MarshalError> {
    T::from_value(&items[position]).map_err(|source| MarshalError::Argument {
        position,
        source: Box::new(source),
    })
}

#[inline]
fn receiver_ptr<T: 'static>(receiver: Option<&Value>) -> Result<*mut T, MarshalError> {
    let handle = receiver.ok_or(MarshalError::MissingReceiver)?;
    capsule::resolve::<T>(handle).map(|ptr| ptr.as_ptr())
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_native_callable {
    ($($arg:ident)*) => {
        impl<F, R, $($arg,)*> NativeCallable<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: IntoReturn,
            $($arg: FromValue + 'static,)*
        {
            fn signature() -> Signature {
                Signature {
                    receiver: Receiver::None,
                    params: vec![$(type_name::<$arg>()),*],
                    ret: type_name::<R>(),
                    returns_value: R::returns_value(),
                }
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_adapter(self) -> Adapter {
                erase(move |_receiver, args| {
                    let items = unpack_args(args, count!($($arg)*))?;
                    let mut position = 0usize;
                    $(
                        let $arg = decode_arg::<$arg>(items, position)?;
                        position += 1;
                    )*
                    (self)($($arg),*).into_return()
                })
            }
        }
    };
}

macro_rules! impl_native_method {
    ($($arg:ident)*) => {
        impl<T, F, R, $($arg,)*> NativeMethod<T, (ByMut, $($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            R: IntoReturn,
            $($arg: FromValue + 'static,)*
        {
            fn signature() -> Signature {
                Signature {
                    receiver: Receiver::Exclusive,
                    params: vec![$(type_name::<$arg>()),*],
                    ret: type_name::<R>(),
                    returns_value: R::returns_value(),
                }
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_adapter(self) -> Adapter {
                erase(move |receiver, args| {
                    let this = receiver_ptr::<T>(receiver)?;
                    let items = unpack_args(args, count!($($arg)*))?;
                    let mut position = 0usize;
                    $(
                        let $arg = decode_arg::<$arg>(items, position)?;
                        position += 1;
                    )*
                    // SAFETY: the pointer came from a capsule tagged with `T`,
                    // and `Interpreter::expose` requires the instance to stay
                    // alive and unaliased while handles to it exist.
                    let this = unsafe { &mut *this };
                    (self)(this, $($arg),*).into_return()
                })
            }
        }

        impl<T, F, R, $($arg,)*> NativeMethod<T, (ByRef, $($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&T, $($arg),*) -> R + 'static,
            R: IntoReturn,
            $($arg: FromValue + 'static,)*
        {
            fn signature() -> Signature {
                Signature {
                    receiver: Receiver::Shared,
                    params: vec![$(type_name::<$arg>()),*],
                    ret: type_name::<R>(),
                    returns_value: R::returns_value(),
                }
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_adapter(self) -> Adapter {
                erase(move |receiver, args| {
                    let this = receiver_ptr::<T>(receiver)?;
                    let items = unpack_args(args, count!($($arg)*))?;
                    let mut position = 0usize;
                    $(
                        let $arg = decode_arg::<$arg>(items, position)?;
                        position += 1;
                    )*
                    // SAFETY: see the exclusive variant above.
                    let this = unsafe { &*this };
                    (self)(this, $($arg),*).into_return()
                })
            }
        }
    };
}

impl_native_callable!();
impl_native_callable!(A1);
impl_native_callable!(A1 A2);
impl_native_callable!(A1 A2 A3);
impl_native_callable!(A1 A2 A3 A4);
impl_native_callable!(A1 A2 A3 A4 A5);
impl_native_callable!(A1 A2 A3 A4 A5 A6);
impl_native_callable!(A1 A2 A3 A4 A5 A6 A7);
impl_native_callable!(A1 A2 A3 A4 A5 A6 A7 A8);

impl_native_method!();
impl_native_method!(A1);
impl_native_method!(A1 A2);
impl_native_method!(A1 A2 A3);
impl_native_method!(A1 A2 A3 A4);
impl_native_method!(A1 A2 A3 A4 A5);
impl_native_method!(A1 A2 A3 A4 A5 A6);
impl_native_method!(A1 A2 A3 A4 A5 A6 A7);
