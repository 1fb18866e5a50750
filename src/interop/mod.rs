//! Interoperability - native callables and instances behind interpreter values
//!
//! Design: generate one adapter per callable, park it behind a plain entry
//! pointer, and hand native instances across as tagged capsules
//!
//! Architecture:
//! - `adapter.rs` - Call adapter generation from native signatures
//! - `dispatch.rs` - Dispatch table and stable entry pointers
//! - `capsule.rs` - Tagged capsules and handle resolution

mod adapter;
mod capsule;
mod dispatch;

pub use adapter::{
    Adapter, ByMut, ByRef, CallFlags, IntoReturn, NativeCallable, NativeMethod, Receiver,
    Signature,
};
pub use capsule::{capsule_of, resolve, Capsule, TypeKey};
pub use dispatch::{DispatchStats, DispatchTable, NativeEntry, SlotId, StableFn};

#[cfg(test)]
mod tests;
