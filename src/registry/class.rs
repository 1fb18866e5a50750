//! Class definitions and their preparation state machine

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::BindError;
use crate::interop::{Signature, StableFn, TypeKey};
use crate::object::{MemberKind, MemberSlot, NativeFunction, TypeObject, CAPSULE_MEMBER};

/// Lifecycle of a registered class
///
/// `Unprepared` accepts methods and members. `prepare` locks the tables and
/// synthesizes the type object. `Imported` means a module object binds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    Unprepared,
    Prepared,
    Imported,
}

impl fmt::Display for ClassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassState::Unprepared => "unprepared",
            ClassState::Prepared => "prepared",
            ClassState::Imported => "imported",
        };
        f.write_str(name)
    }
}

/// Registered method
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub doc: Option<String>,
    pub entry: StableFn,
    pub signature: Signature,
}

/// Registered member attribute
#[derive(Debug, Clone)]
pub struct MemberDef {
    pub name: String,
    pub doc: Option<String>,
    pub getter: StableFn,
    pub setter: Option<StableFn>,
    pub value_type: &'static str,
}

/// Exposed instance bookkeeping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub addr: usize,
    pub name: String,
}

/// Native class registered in a module
#[derive(Debug)]
pub struct ClassDef {
    key: TypeKey,
    name: String,
    module: String,
    methods: Vec<MethodDef>,
    members: Vec<MemberDef>,
    names: HashSet<String>,
    state: ClassState,
    type_object: Option<Rc<TypeObject>>,
    instances: Vec<InstanceRecord>,
}

impl ClassDef {
    pub(crate) fn new(key: TypeKey, name: String, module: String) -> Self {
        let mut names = HashSet::new();
        names.insert(CAPSULE_MEMBER.to_string());
        Self {
            key,
            name,
            module,
            methods: Vec::new(),
            members: Vec::new(),
            names,
            state: ClassState::Unprepared,
            type_object: None,
            instances: Vec::new(),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClassState {
        self.state
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn members(&self) -> &[MemberDef] {
        &self.members
    }

    /// Instances exposed so far, in exposure order
    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    /// Type object, available once prepared
    pub fn type_object(&self) -> Option<&Rc<TypeObject>> {
        self.type_object.as_ref()
    }

    fn scope(&self) -> String {
        format!("class {}.{}", self.module, self.name)
    }

    /// Fail unless `name` may still be added to this class
    pub(crate) fn check_name(&self, name: &str) -> Result<(), BindError> {
        if self.state != ClassState::Unprepared {
            return Err(BindError::Sealed(self.scope()));
        }
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }
        if self.names.contains(name) {
            return Err(BindError::DuplicateName {
                scope: self.scope(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn add_method(&mut self, method: MethodDef) -> Result<(), BindError> {
        self.check_name(&method.name)?;
        self.names.insert(method.name.clone());
        self.methods.push(method);
        Ok(())
    }

    pub(crate) fn add_member(&mut self, member: MemberDef) -> Result<(), BindError> {
        self.check_name(&member.name)?;
        self.names.insert(member.name.clone());
        self.members.push(member);
        Ok(())
    }

    /// Lock the tables and build the type object. No-op once prepared.
    pub(crate) fn prepare(&mut self) {
        if self.state != ClassState::Unprepared {
            return;
        }

        let methods = self
            .methods
            .iter()
            .map(|m| {
                Rc::new(NativeFunction {
                    name: m.name.clone(),
                    doc: m.doc.clone(),
                    entry: m.entry,
                    signature: m.signature.clone(),
                })
            })
            .collect();

        let mut members = Vec::with_capacity(self.members.len() + 1);
        members.push(MemberSlot {
            name: CAPSULE_MEMBER.to_string(),
            doc: Some("capsule of the wrapped native instance".to_string()),
            kind: MemberKind::Capsule,
        });
        members.extend(self.members.iter().map(|m| MemberSlot {
            name: m.name.clone(),
            doc: m.doc.clone(),
            kind: MemberKind::Native {
                getter: m.getter,
                setter: m.setter,
            },
        }));

        self.type_object = Some(Rc::new(TypeObject::new(
            self.name.clone(),
            self.module.clone(),
            self.key,
            methods,
            members,
        )));
        self.state = ClassState::Prepared;
        debug!(
            event = "class_prepared",
            module = %self.module,
            class = %self.name,
            methods = self.methods.len(),
            members = self.members.len(),
            "Class prepared"
        );
    }

    /// Hand the type object to a module object being built
    pub(crate) fn bind(&mut self) -> Result<Rc<TypeObject>, BindError> {
        let unprepared = || BindError::UnpreparedClass {
            module: self.module.clone(),
            class: self.name.clone(),
        };
        let type_object = match self.state {
            ClassState::Unprepared => return Err(unprepared()),
            ClassState::Prepared | ClassState::Imported => {
                self.type_object.clone().ok_or_else(unprepared)?
            }
        };
        self.state = ClassState::Imported;
        Ok(type_object)
    }

    pub(crate) fn record_instance(&mut self, addr: usize, name: &str) {
        self.instances.push(InstanceRecord {
            addr,
            name: name.to_string(),
        });
    }
}
