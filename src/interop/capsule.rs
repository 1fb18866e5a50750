//! Tagged capsules - opaque native pointers with a type identity check
//!
//! A capsule never owns its pointee. The tag is the `TypeId` of the pointee,
//! checked on every resolution so a handle of one class can never be read
//! as another.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use crate::error::MarshalError;
use crate::Value;

/// Type identity key for registered classes and capsule tags
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Non-owning pointer tagged with its pointee type
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Capsule {
    ptr: NonNull<()>,
    key: TypeKey,
}

impl Capsule {
    pub fn new<T: 'static>(ptr: NonNull<T>) -> Self {
        Self {
            ptr: ptr.cast(),
            key: TypeKey::of::<T>(),
        }
    }

    /// Wrap a raw pointer, `None` when null
    pub fn from_raw<T: 'static>(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(Self::new)
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.key.id == TypeId::of::<T>()
    }

    /// Recover the typed pointer, checking the tag
    pub fn resolve<T: 'static>(&self) -> Result<NonNull<T>, MarshalError> {
        if self.is::<T>() {
            Ok(self.ptr.cast())
        } else {
            Err(MarshalError::CapsuleMismatch {
                expected: type_name::<T>(),
                found: self.key.name,
            })
        }
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<capsule {} at {:#x}>", self.key.name, self.addr())
    }
}

/// Capsule carried by a capsule value or a handle object
pub fn capsule_of(value: &Value) -> Option<Capsule> {
    match value {
        Value::Capsule(capsule) => Some(*capsule),
        Value::Object(instance) => Some(instance.capsule()),
        _ => None,
    }
}

/// Resolve a handle back to the native instance it wraps
pub fn resolve<T: 'static>(handle: &Value) -> Result<NonNull<T>, MarshalError> {
    capsule_of(handle)
        .ok_or_else(|| MarshalError::mismatch("capsule", handle))?
        .resolve::<T>()
}
