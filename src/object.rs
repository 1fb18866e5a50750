//! Interpreter-visible objects: modules, native types, handles, callables

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use rustpython_parser::ast::Stmt;

use crate::error::MarshalError;
use crate::interop::{Capsule, Signature, StableFn, TypeKey};
use crate::interp::{Builtin, LineIndex};
use crate::Value;

/// Name of the member every handle exposes its capsule under
pub const CAPSULE_MEMBER: &str = "c_ptr";

/// Module namespace
#[derive(Debug)]
pub struct ModuleObject {
    name: String,
    doc: String,
    attrs: RefCell<HashMap<String, Value>>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Rc<Self> {
        let name = name.into();
        let doc = doc.into();
        let mut attrs = HashMap::new();
        attrs.insert("__name__".to_string(), Value::Str(name.clone()));
        attrs.insert("__doc__".to_string(), Value::Str(doc.clone()));
        Rc::new(Self {
            name,
            doc,
            attrs: RefCell::new(attrs),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.borrow().contains_key(name)
    }

    /// Attribute names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attrs.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Native function as the interpreter sees it
#[derive(Debug)]
pub struct NativeFunction {
    pub name: String,
    pub doc: Option<String>,
    pub entry: StableFn,
    pub signature: Signature,
}

/// How a member attribute is read and written
#[derive(Debug)]
pub enum MemberKind {
    /// Built-in read-only capsule of the instance
    Capsule,
    Native {
        getter: StableFn,
        setter: Option<StableFn>,
    },
}

/// Entry of a type's member table
#[derive(Debug)]
pub struct MemberSlot {
    pub name: String,
    pub doc: Option<String>,
    pub kind: MemberKind,
}

/// Type object synthesized for a registered class
#[derive(Debug)]
pub struct TypeObject {
    name: String,
    module: String,
    key: TypeKey,
    methods: Vec<Rc<NativeFunction>>,
    members: Vec<MemberSlot>,
}

impl TypeObject {
    pub(crate) fn new(
        name: String,
        module: String,
        key: TypeKey,
        methods: Vec<Rc<NativeFunction>>,
        members: Vec<MemberSlot>,
    ) -> Self {
        Self {
            name,
            module,
            key,
            methods,
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module.Name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn method(&self, name: &str) -> Option<&Rc<NativeFunction>> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn methods(&self) -> &[Rc<NativeFunction>] {
        &self.methods
    }

    pub fn member(&self, name: &str) -> Option<&MemberSlot> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn members(&self) -> &[MemberSlot] {
        &self.members
    }

    /// Wrap a capsule in a new handle, checking it points at this type
    pub fn instantiate(self: &Rc<Self>, capsule: Capsule) -> Result<Rc<Instance>, MarshalError> {
        if capsule.key() != self.key {
            return Err(MarshalError::CapsuleMismatch {
                expected: self.key.name(),
                found: capsule.key().name(),
            });
        }
        Ok(Rc::new(Instance {
            class: Rc::clone(self),
            capsule,
        }))
    }
}

/// Handle object wrapping a native instance
#[derive(Debug)]
pub struct Instance {
    class: Rc<TypeObject>,
    capsule: Capsule,
}

impl Instance {
    pub fn class(&self) -> &Rc<TypeObject> {
        &self.class
    }

    #[inline]
    pub fn capsule(&self) -> Capsule {
        self.capsule
    }
}

/// Function defined by a script
#[derive(Debug)]
pub struct ScriptFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<[Stmt]>,
    pub lines: Rc<LineIndex>,
    pub globals: Weak<ModuleObject>,
}

/// Anything the interpreter can call
#[derive(Debug)]
pub enum Callable {
    Native(Rc<NativeFunction>),
    /// Native method bound to a handle
    Bound {
        receiver: Value,
        method: Rc<NativeFunction>,
    },
    Builtin(Builtin),
    /// Builtin method bound to a value, such as `str.split`
    BuiltinMethod {
        receiver: Value,
        name: &'static str,
    },
    Script(ScriptFunction),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Native(f) => &f.name,
            Callable::Bound { method, .. } => &method.name,
            Callable::Builtin(b) => b.name(),
            Callable::BuiltinMethod { name, .. } => name,
            Callable::Script(f) => &f.name,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Callable::Native(f) => format!("built-in function {}", f.name),
            Callable::Bound { receiver, method } => {
                format!("bound method {}.{}", receiver.describe(), method.name)
            }
            Callable::Builtin(b) => format!("built-in function {}", b.name()),
            Callable::BuiltinMethod { receiver, name } => {
                format!("built-in method {} of {}", name, receiver.type_name())
            }
            Callable::Script(f) => format!("function {}", f.name),
        }
    }
}
