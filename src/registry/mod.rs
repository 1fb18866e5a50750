//! Binding registry - module, function and class definitions
//!
//! Design: an explicit `Registry` value owns every module definition plus the
//! dispatch table their adapters live in. It is filled before the interpreter
//! starts and handed to `Interpreter::initialize`, which prepares it.
//!
//! Architecture:
//! - `module.rs` - Module definitions, registration builder, module objects
//! - `class.rs` - Class definitions and the Unprepared → Prepared → Imported states

mod class;
mod module;

pub use class::{ClassDef, ClassState, InstanceRecord, MemberDef, MethodDef};
pub use module::{CustomInit, FunctionDef, ModuleBuilder, ModuleDef};

use std::collections::BTreeMap;

use crate::error::BindError;
use crate::interop::DispatchTable;
use crate::logging;

/// Owner of all module definitions
#[derive(Debug, Default)]
pub struct Registry {
    modules: BTreeMap<String, ModuleDef>,
    dispatch: DispatchTable,
    prepared: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the module named `name`, creating it on first use
    ///
    /// `docs` only applies when the module is created.
    pub fn create_or_get(&mut self, name: &str, docs: &str) -> Result<ModuleBuilder<'_>, BindError> {
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }
        if self.prepared && !self.modules.contains_key(name) {
            return Err(BindError::Sealed("registry".to_string()));
        }

        let Registry {
            modules, dispatch, ..
        } = self;
        let module = modules.entry(name.to_string()).or_insert_with(|| {
            logging::log_module_created(name);
            ModuleDef::new(name.to_string(), docs.to_string())
        });
        Ok(ModuleBuilder { module, dispatch })
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDef> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleDef> {
        self.modules.get_mut(name)
    }

    /// Module definitions ordered by name
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDef> {
        self.modules.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Prepare every module. Registration is closed afterwards.
    pub fn prepare(&mut self) {
        for module in self.modules.values_mut() {
            module.prepare();
        }
        self.prepared = true;
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }
}
