//! Reference interpreter and embedding API
//!
//! Design: an owned `Interpreter` holds at most one live session. A session
//! owns the prepared `Registry`, the module cache, the main module and the
//! error indicator. Everything is `Rc`-based and stays on the owning thread.
//!
//! Architecture:
//! - `syntax.rs` - `rustpython-parser` front end, nesting bound, line index
//! - `eval.rs` - Tree-walking evaluator and attribute protocol
//! - `builtins.rs` - Builtin functions and methods of builtin types

mod builtins;
mod eval;
mod syntax;

pub use builtins::Builtin;
pub use syntax::{parse_program, LineIndex, Program, MAX_NESTING};

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;

use parking_lot::Mutex;

use crate::config::EmbedConfig;
use crate::error::{BindError, Error, ErrorKind, Result, ScriptError};
use crate::interop::{Capsule, DispatchStats, TypeKey};
use crate::logging;
use crate::marshal::{FromValue, IntoValue};
use crate::object::ModuleObject;
use crate::registry::Registry;
use crate::Value;

use eval::{Args, Machine};

/// Serializes `run`, `run_file` and `load_script` across the process
static COMMAND_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// State of one initialized interpreter
pub(crate) struct Session {
    pub(crate) registry: Registry,
    pub(crate) modules: HashMap<String, Rc<ModuleObject>>,
    pub(crate) main: Rc<ModuleObject>,
    error: Option<ScriptError>,
}

/// Embedded interpreter
pub struct Interpreter {
    config: EmbedConfig,
    session: Option<Session>,
    output: Box<dyn Write>,
}

/// Argument list from an encoded value: a tuple spreads, `None` is no arguments
fn spread(args: Value) -> Args {
    match args {
        Value::Tuple(items) => Args::from_vec(items),
        Value::None => Args::new(),
        single => Args::from_elem(single, 1),
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EmbedConfig::default())
    }

    /// Build from `config`, installing its subscriber when `[logging] install` is set
    pub fn with_config(config: EmbedConfig) -> Self {
        if config.logging.install {
            logging::init_with_config(config.to_log_config());
        }
        Self {
            config,
            session: None,
            output: Box::new(io::stdout()),
        }
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Redirect what the `print` builtin writes
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = Box::new(output);
    }

    /// Start a session over `registry`, preparing every module in it
    ///
    /// A live session is finalized first.
    pub fn initialize(&mut self, mut registry: Registry) -> Result<()> {
        if self.session.is_some() {
            self.finalize();
        }

        let main_name = self.config.interpreter.main_module.clone();
        if registry.contains(&main_name) {
            return Err(BindError::DuplicateName {
                scope: "interpreter".to_string(),
                name: main_name,
            }
            .into());
        }

        registry.prepare();
        logging::log_session_start(&main_name, registry.modules().count());

        let main = ModuleObject::new(main_name.clone(), "");
        let mut modules = HashMap::new();
        modules.insert(main_name, Rc::clone(&main));
        self.session = Some(Session {
            registry,
            modules,
            main,
            error: None,
        });
        Ok(())
    }

    /// End the session, handing the registry back
    pub fn finalize(&mut self) -> Option<Registry> {
        let session = self.session.take()?;
        logging::log_session_shutdown(session.registry.dispatch().stats().calls_made);
        Some(session.registry)
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::NotInitialized)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::NotInitialized)
    }

    /// Run `f` on a machine over the live session, recording any error
    fn execute<R>(
        &mut self,
        f: impl FnOnce(&mut Machine<'_>) -> std::result::Result<R, ScriptError>,
    ) -> Result<R> {
        let Self {
            config,
            session,
            output,
        } = self;
        let session = session.as_mut().ok_or(Error::NotInitialized)?;

        let mut machine = Machine::new(session, &mut **output, &config.interpreter);
        match f(&mut machine) {
            Ok(value) => Ok(value),
            Err(err) => {
                logging::log_script_error(&err);
                session.error = Some(err.clone());
                Err(Error::Script(err))
            }
        }
    }

    fn read_source(&mut self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|source| {
            if let Some(session) = self.session.as_mut() {
                session.error = Some(ScriptError::new(
                    ErrorKind::System,
                    format!("cannot read {}: {}", path.display(), source),
                ));
            }
            Error::Io {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    // ========================================================================
    // Script execution
    // ========================================================================

    /// Run source in the main module
    ///
    /// Returns the value of the last top-level expression statement, or
    /// `None` when the source ends with any other statement.
    pub fn run(&mut self, source: &str) -> Result<Value> {
        let _guard = COMMAND_LOCK.lock();
        let _perf = logging::perf::track("run");
        self.execute(|machine| {
            let main = Rc::clone(&machine.session.main);
            machine.run_source(source, &main)
        })
    }

    /// Run a file's contents in the main module
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let _guard = COMMAND_LOCK.lock();
        self.session()?;
        let source = self.read_source(path.as_ref())?;
        self.execute(|machine| {
            let main = Rc::clone(&machine.session.main);
            machine.run_source(&source, &main)
        })
    }

    /// Load a file as an importable module named after the file stem
    pub fn load_script(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let _guard = COMMAND_LOCK.lock();
        let path = path.as_ref();
        self.session()?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| Error::Config(format!("{} has no file name", path.display())))?;
        let source = self.read_source(path)?;
        self.execute(|machine| machine.load_module(&name, &source))
            .map(Value::Module)
    }

    /// Import a native module, a loaded script, or a script on the search path
    pub fn import(&mut self, name: &str) -> Result<Value> {
        self.execute(|machine| machine.import(name))
            .map(Value::Module)
    }

    pub fn main_module(&self) -> Result<Value> {
        Ok(Value::Module(Rc::clone(&self.session()?.main)))
    }

    // ========================================================================
    // Attribute access and calls
    // ========================================================================

    /// Read `obj.name` and decode it
    pub fn get_attr<T: FromValue>(&self, obj: &Value, name: &str) -> Result<T> {
        let session = self.session()?;
        if !eval::has_attribute(obj, name) {
            return Err(Error::AttributeNotFound {
                object: obj.describe(),
                name: name.to_string(),
            });
        }
        let value = eval::get_attribute(session.registry.dispatch(), obj, name)?;
        T::from_value(&value).map_err(|err| {
            logging::log_marshal_failure(std::any::type_name::<T>(), &err);
            Error::Marshal(err)
        })
    }

    /// Whether `obj.name` exists. Never fails.
    pub fn has_attr(&self, obj: &Value, name: &str) -> bool {
        self.session.is_some() && eval::has_attribute(obj, name)
    }

    /// Write `obj.name`
    pub fn set_attr(&self, obj: &Value, name: &str, value: impl IntoValue) -> Result<()> {
        let session = self.session()?;
        eval::set_attribute(session.registry.dispatch(), obj, name, value.into_value())?;
        Ok(())
    }

    /// Call `obj.name(*args)`
    ///
    /// A tuple spreads into positional arguments and `()` passes none.
    pub fn call(&mut self, obj: &Value, name: &str, args: impl IntoValue) -> Result<Value> {
        let args = spread(args.into_value());
        self.execute(|machine| {
            let callee = eval::get_attribute(machine.session.registry.dispatch(), obj, name)?;
            machine.call(&callee, args)
        })
    }

    /// Call a callable value
    pub fn call_value(&mut self, callable: &Value, args: impl IntoValue) -> Result<Value> {
        let args = spread(args.into_value());
        self.execute(|machine| machine.call(callable, args))
    }

    // ========================================================================
    // Object exposure
    // ========================================================================

    /// Expose a native instance as a handle of its registered class
    ///
    /// The handle is bound as `name` on `target`, or on the main module when
    /// `target` is `None`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T` that outlives every handle and capsule
    /// the interpreter keeps for it. Nothing here takes ownership, and no
    /// other reference to the instance may be active while a method runs.
    pub unsafe fn expose<T: 'static>(
        &mut self,
        module: &str,
        ptr: *mut T,
        name: &str,
        target: Option<&Value>,
    ) -> Result<Value> {
        let session = self.session_mut()?;
        if name.is_empty() {
            return Err(BindError::EmptyName.into());
        }
        let ptr = NonNull::new(ptr).ok_or_else(|| BindError::NullInstance(name.to_string()))?;
        let key = TypeKey::of::<T>();

        let (type_object, class_name) = {
            let def = session
                .registry
                .module(module)
                .ok_or_else(|| BindError::UnknownModule(module.to_string()))?;
            let class = def
                .class_by_key(key)
                .ok_or_else(|| BindError::UnregisteredType {
                    module: module.to_string(),
                    type_name: key.name(),
                })?;
            let type_object = class.type_object().cloned().ok_or_else(|| {
                BindError::UnpreparedClass {
                    module: module.to_string(),
                    class: class.name().to_string(),
                }
            })?;
            (type_object, class.name().to_string())
        };

        let handle = Value::Object(type_object.instantiate(Capsule::new(ptr))?);
        match target {
            Some(target) => eval::set_attribute(
                session.registry.dispatch(),
                target,
                name,
                handle.clone(),
            )?,
            None => session.main.set(name, handle.clone()),
        }

        let addr = ptr.as_ptr() as usize;
        if let Some(class) = session
            .registry
            .module_mut(module)
            .and_then(|def| def.class_by_key_mut(key))
        {
            class.record_instance(addr, name);
        }
        logging::log_instance_exposed(module, &class_name, name, addr);
        Ok(handle)
    }

    // ========================================================================
    // Error indicator
    // ========================================================================

    /// Pending error, if the last failing call left one
    pub fn error(&self) -> Option<&ScriptError> {
        self.session.as_ref().and_then(|s| s.error.as_ref())
    }

    /// Write the pending error to stderr and clear it
    pub fn print_error(&mut self) {
        if let Some(err) = self.session.as_mut().and_then(|s| s.error.take()) {
            logging::log_script_error(&err);
            eprintln!("{}", err);
        }
    }

    pub fn clear_error(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.error = None;
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Registry of the live session
    pub fn registry(&self) -> Option<&Registry> {
        self.session.as_ref().map(|s| &s.registry)
    }

    pub fn stats(&self) -> Option<DispatchStats> {
        self.registry().map(|r| r.dispatch().stats())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests;
