//! Liaison - bindings between native Rust code and an embedded interpreter
//!
//! Native code registers functions and classes into a [`Registry`], hands it
//! to an [`Interpreter`], and scripts call back into native code through
//! generated adapters. Native instances cross the boundary as tagged
//! capsules and are resolved back with a type check.
//!
//! ```
//! use liaison::{Interpreter, Registry, Value};
//!
//! let mut registry = Registry::new();
//! registry
//!     .create_or_get("calc", "Arithmetic helpers")?
//!     .register_function("add", |a: i64, b: i64| a + b, "Add two integers")?;
//!
//! let mut interp = Interpreter::new();
//! interp.initialize(registry)?;
//! let result = interp.run("import calc\ncalc.add(2, 3)")?;
//! assert_eq!(result, Value::Int(5));
//! # Ok::<(), liaison::Error>(())
//! ```
//!
//! Modules:
//! - `marshal` - conversions between native values and [`Value`]
//! - `interop` - call adapters, the dispatch table and capsules
//! - `registry` - module and class definitions
//! - `interp` - the reference interpreter and embedding API
//! - `object` - interpreter-visible modules, types and handles

pub mod config;
pub mod error;
pub mod interop;
pub mod interp;
pub mod logging;
pub mod marshal;
pub mod object;
pub mod registry;
pub mod value;

pub use config::EmbedConfig;
pub use error::{BindError, CallError, Error, ErrorKind, MarshalError, Result, ScriptError};
pub use interop::{capsule_of, resolve, Capsule, DispatchTable, Signature, StableFn, TypeKey};
pub use interp::Interpreter;
pub use marshal::{decode, encode, try_decode, ByteBuf, FromValue, IntoValue};
pub use registry::{ModuleBuilder, Registry};
pub use value::Value;
