//! Function pointer stabilization - adapters behind plain `fn` pointers
//!
//! The interpreter's registration surface stores a plain function pointer
//! per callable, which cannot capture state. Each adapter is parked in a
//! numbered slot of a `DispatchTable`, and the interpreter keeps the shared
//! `trampoline` pointer plus the slot id. Slots are append-only, so a slot id
//! is bound to exactly one adapter for the table's whole life.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use super::adapter::Adapter;
use crate::error::CallError;
use crate::Value;

static NEXT_TABLE_ID: AtomicU32 = AtomicU32::new(1);

/// Registry-assigned slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Uniform native entry point
pub type NativeEntry =
    fn(&DispatchTable, SlotId, Option<&Value>, &Value) -> Result<Value, CallError>;

/// Stable projection of an adapter: entry pointer plus slot
#[derive(Clone, Copy)]
pub struct StableFn {
    table: u32,
    slot: SlotId,
    entry: NativeEntry,
}

impl StableFn {
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    #[inline]
    pub fn entry(&self) -> NativeEntry {
        self.entry
    }

    /// Call through the entry pointer
    #[inline]
    pub fn invoke(
        &self,
        table: &DispatchTable,
        receiver: Option<&Value>,
        args: &Value,
    ) -> Result<Value, CallError> {
        if table.id != self.table {
            return Err(CallError::ForeignSlot(self.slot));
        }
        (self.entry)(table, self.slot, receiver, args)
    }
}

impl fmt::Debug for StableFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableFn")
            .field("table", &self.table)
            .field("slot", &self.slot)
            .finish()
    }
}

struct Slot {
    label: String,
    adapter: Adapter,
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub slots: usize,
    pub calls_made: u64,
    pub marshaling_errors: u64,
    pub native_errors: u64,
}

/// Append-only table of adapters
pub struct DispatchTable {
    id: u32,
    slots: Vec<Slot>,
    calls: Cell<u64>,
    marshal_failures: Cell<u64>,
    native_failures: Cell<u64>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            calls: Cell::new(0),
            marshal_failures: Cell::new(0),
            native_failures: Cell::new(0),
        }
    }

    /// Park an adapter in a fresh slot
    pub fn stabilize(&mut self, label: impl Into<String>, adapter: Adapter) -> StableFn {
        let slot = SlotId(self.slots.len() as u32);
        let label = label.into();
        trace!(event = "slot_bound", slot = %slot, label = %label, "Adapter stabilized");
        self.slots.push(Slot { label, adapter });
        StableFn {
            table: self.id,
            slot,
            entry: trampoline,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Label the slot was bound with (`module.name` or `module.Class.name`)
    pub fn label(&self, slot: SlotId) -> Option<&str> {
        self.slots.get(slot.index()).map(|s| s.label.as_str())
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            slots: self.slots.len(),
            calls_made: self.calls.get(),
            marshaling_errors: self.marshal_failures.get(),
            native_errors: self.native_failures.get(),
        }
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("id", &self.id)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Shared entry pointer behind every `StableFn`
fn trampoline(
    table: &DispatchTable,
    slot: SlotId,
    receiver: Option<&Value>,
    args: &Value,
) -> Result<Value, CallError> {
    let bound = table
        .slots
        .get(slot.index())
        .ok_or(CallError::UnboundSlot(slot))?;
    table.calls.set(table.calls.get() + 1);

    let result = (bound.adapter)(receiver, args);
    match &result {
        Err(CallError::Marshal(_)) => table.marshal_failures.set(table.marshal_failures.get() + 1),
        Err(_) => table.native_failures.set(table.native_failures.get() + 1),
        Ok(_) => {}
    }
    result
}
