//! Module definitions and the registration builder

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error};

use super::class::{ClassDef, MemberDef, MethodDef};
use crate::error::BindError;
use crate::interop::{
    ByMut, ByRef, DispatchTable, NativeCallable, NativeMethod, Signature, StableFn, TypeKey,
};
use crate::logging;
use crate::marshal::{FromValue, IntoValue};
use crate::object::{ModuleObject, NativeFunction};
use crate::Value;

/// Hook run on a freshly built module object
pub type CustomInit = Box<dyn Fn(&Rc<ModuleObject>)>;

/// Registered free function
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub doc: Option<String>,
    pub entry: StableFn,
    pub signature: Signature,
}

/// Everything registered under one module name
pub struct ModuleDef {
    name: String,
    doc: String,
    functions: Vec<FunctionDef>,
    function_names: HashSet<String>,
    classes: Vec<ClassDef>,
    class_index: HashMap<TypeKey, usize>,
    custom_init: Option<CustomInit>,
    sealed: bool,
}

impl ModuleDef {
    pub(crate) fn new(name: String, doc: String) -> Self {
        Self {
            name,
            doc,
            functions: Vec::new(),
            function_names: HashSet::new(),
            classes: Vec::new(),
            class_index: HashMap::new(),
            custom_init: None,
            sealed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Classes in registration order
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn class_of<T: 'static>(&self) -> Option<&ClassDef> {
        self.class_by_key(TypeKey::of::<T>())
    }

    pub fn class_by_key(&self, key: TypeKey) -> Option<&ClassDef> {
        self.class_index.get(&key).map(|&i| &self.classes[i])
    }

    pub(crate) fn class_by_key_mut(&mut self, key: TypeKey) -> Option<&mut ClassDef> {
        match self.class_index.get(&key) {
            Some(&i) => Some(&mut self.classes[i]),
            None => None,
        }
    }

    /// Whether `prepare` has run
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Prepare every class and stop accepting registrations
    pub fn prepare(&mut self) {
        for class in &mut self.classes {
            class.prepare();
        }
        if !self.sealed {
            self.sealed = true;
            debug!(
                event = "module_prepared",
                module = %self.name,
                functions = self.functions.len(),
                classes = self.classes.len(),
                "Module prepared"
            );
        }
    }

    /// Build the interpreter module object
    ///
    /// Fails without producing anything when a class was never prepared.
    pub fn build_module_object(&mut self) -> Result<Rc<ModuleObject>, BindError> {
        if let Some(class) = self
            .classes
            .iter()
            .find(|c| c.type_object().is_none())
        {
            let err = BindError::UnpreparedClass {
                module: self.name.clone(),
                class: class.name().to_string(),
            };
            error!(event = "unprepared_class", module = %self.name, error = %err, "Module build aborted");
            return Err(err);
        }

        let module = ModuleObject::new(self.name.clone(), self.doc.clone());
        for function in &self.functions {
            let native = NativeFunction {
                name: function.name.clone(),
                doc: function.doc.clone(),
                entry: function.entry,
                signature: function.signature.clone(),
            };
            module.set(
                function.name.clone(),
                Value::Function(Rc::new(crate::object::Callable::Native(Rc::new(native)))),
            );
        }
        for class in &mut self.classes {
            let type_object = class.bind()?;
            module.set(class.name().to_string(), Value::Type(type_object));
        }

        if let Some(hook) = &self.custom_init {
            hook(&module);
        }
        logging::log_module_built(&self.name, self.functions.len(), self.classes.len());
        Ok(module)
    }

    fn scope(&self) -> String {
        format!("module {}", self.name)
    }

    fn check_open(&self) -> Result<(), BindError> {
        if self.sealed {
            Err(BindError::Sealed(self.scope()))
        } else {
            Ok(())
        }
    }

    fn check_function_name(&self, name: &str) -> Result<(), BindError> {
        self.check_open()?;
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }
        if self.function_names.contains(name) || self.classes.iter().any(|c| c.name() == name) {
            return Err(BindError::DuplicateName {
                scope: self.scope(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn class_for<T: 'static>(&mut self) -> Result<&mut ClassDef, BindError> {
        let module = self.name.clone();
        self.class_by_key_mut(TypeKey::of::<T>())
            .ok_or(BindError::UnknownClass {
                module,
                type_name: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("classes", &self.classes)
            .field("sealed", &self.sealed)
            .finish()
    }
}

fn doc_option(docs: &str) -> Option<String> {
    if docs.is_empty() {
        None
    } else {
        Some(docs.to_string())
    }
}

/// Registration handle for one module
///
/// Borrows the module definition together with the registry's dispatch
/// table, so every adapter lands in the table that will serve its calls.
pub struct ModuleBuilder<'r> {
    pub(crate) module: &'r mut ModuleDef,
    pub(crate) dispatch: &'r mut DispatchTable,
}

impl<'r> ModuleBuilder<'r> {
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn def(&self) -> &ModuleDef {
        self.module
    }

    /// Register a free function under `name`
    pub fn register_function<Args, F>(
        &mut self,
        name: &str,
        callable: F,
        docs: &str,
    ) -> Result<&mut Self, BindError>
    where
        F: NativeCallable<Args>,
    {
        self.module.check_function_name(name)?;
        let signature = F::signature();
        let entry = self
            .dispatch
            .stabilize(format!("{}.{}", self.module.name, name), callable.into_adapter());

        logging::log_function_registered(&self.module.name, name, &signature);
        self.module.function_names.insert(name.to_string());
        self.module.functions.push(FunctionDef {
            name: name.to_string(),
            doc: doc_option(docs),
            entry,
            signature,
        });
        Ok(self)
    }

    /// Register native type `T` as a class. Returns `false` if already present.
    pub fn register_class<T: 'static>(&mut self, name: &str) -> Result<bool, BindError> {
        let key = TypeKey::of::<T>();
        if self.module.class_index.contains_key(&key) {
            return Ok(false);
        }
        self.module.check_function_name(name)?;

        let index = self.module.classes.len();
        self.module
            .classes
            .push(ClassDef::new(key, name.to_string(), self.module.name.clone()));
        self.module.class_index.insert(key, index);
        logging::log_class_registered(&self.module.name, name, key.name());
        Ok(true)
    }

    /// Register a method on the class registered for `T`
    pub fn register_member_function<T, Args, F>(
        &mut self,
        name: &str,
        callable: F,
        docs: &str,
    ) -> Result<&mut Self, BindError>
    where
        T: 'static,
        F: NativeMethod<T, Args>,
    {
        let module_name = self.module.name.clone();
        let label = {
            let class = self.module.class_for::<T>()?;
            class.check_name(name)?;
            format!("{}.{}.{}", module_name, class.name(), name)
        };

        let signature = F::signature();
        let entry = self.dispatch.stabilize(label, callable.into_adapter());
        logging::log_function_registered(&module_name, name, &signature);

        let class = self.module.class_for::<T>()?;
        class.add_method(MethodDef {
            name: name.to_string(),
            doc: doc_option(docs),
            entry,
            signature,
        })?;
        Ok(self)
    }

    /// Register a read-only attribute computed from the instance
    pub fn register_member<T, V, G>(
        &mut self,
        name: &str,
        getter: G,
        docs: &str,
    ) -> Result<&mut Self, BindError>
    where
        T: 'static,
        V: IntoValue + 'static,
        G: Fn(&T) -> V + 'static,
    {
        self.add_member::<T, V>(
            name,
            <G as NativeMethod<T, (ByRef,)>>::into_adapter(getter),
            None,
            docs,
        )
    }

    /// Register a readable and writable attribute
    pub fn register_property<T, V, G, S>(
        &mut self,
        name: &str,
        getter: G,
        setter: S,
        docs: &str,
    ) -> Result<&mut Self, BindError>
    where
        T: 'static,
        V: IntoValue + FromValue + 'static,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        self.add_member::<T, V>(
            name,
            <G as NativeMethod<T, (ByRef,)>>::into_adapter(getter),
            Some(<S as NativeMethod<T, (ByMut, V)>>::into_adapter(setter)),
            docs,
        )
    }

    fn add_member<T: 'static, V>(
        &mut self,
        name: &str,
        getter: crate::interop::Adapter,
        setter: Option<crate::interop::Adapter>,
        docs: &str,
    ) -> Result<&mut Self, BindError> {
        let class_name = {
            let class = self.module.class_for::<T>()?;
            class.check_name(name)?;
            class.name().to_string()
        };

        let label = format!("{}.{}.{}", self.module.name, class_name, name);
        let getter = self.dispatch.stabilize(label.clone(), getter);
        let setter = setter.map(|adapter| self.dispatch.stabilize(format!("{}=", label), adapter));

        let class = self.module.class_for::<T>()?;
        class.add_member(MemberDef {
            name: name.to_string(),
            doc: doc_option(docs),
            getter,
            setter,
            value_type: std::any::type_name::<V>(),
        })?;
        Ok(self)
    }

    /// Run `hook` on the module object each time it is built
    pub fn set_custom_init<H>(&mut self, hook: H) -> Result<&mut Self, BindError>
    where
        H: Fn(&Rc<ModuleObject>) + 'static,
    {
        self.module.check_open()?;
        self.module.custom_init = Some(Box::new(hook));
        Ok(self)
    }
}
