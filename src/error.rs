//! Error taxonomy for registration, marshaling, calls and script execution
//!
//! Design: one enum per phase so callers can match on what failed:
//! - `MarshalError` - a value could not cross the boundary
//! - `CallError` - an adapter invocation failed
//! - `BindError` - a registration or exposure contract was violated
//! - `ScriptError` - the interpreter's error indicator
//! - `Error` - top-level embedding error

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::interop::SlotId;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Value conversion failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected {expected} item(s), found {found}")]
    Arity { expected: usize, found: usize },

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<MarshalError>,
    },

    #[error("argument {position}: {source}")]
    Argument {
        position: usize,
        #[source]
        source: Box<MarshalError>,
    },

    #[error("capsule holds {found}, expected {expected}")]
    CapsuleMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("bytes are not valid UTF-8")]
    InvalidUtf8,

    #[error("bound call without a receiver")]
    MissingReceiver,
}

impl MarshalError {
    /// Build a type mismatch against the dynamic type of `found`
    pub fn mismatch(expected: &'static str, found: &crate::Value) -> Self {
        MarshalError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }

    /// Innermost error, skipping positional context
    pub fn root(&self) -> &MarshalError {
        match self {
            MarshalError::Element { source, .. } | MarshalError::Argument { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

/// Adapter invocation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("{0}")]
    Native(String),

    #[error("no adapter bound to slot {0}")]
    UnboundSlot(SlotId),

    #[error("slot {0} belongs to another dispatch table")]
    ForeignSlot(SlotId),
}

/// Registration or exposure contract violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("'{name}' is already registered in {scope}")]
    DuplicateName { scope: String, name: String },

    #[error("class {type_name} is not registered in module '{module}'")]
    UnknownClass {
        module: String,
        type_name: &'static str,
    },

    #[error("module '{0}' is not registered")]
    UnknownModule(String),

    #[error("'{0}' is sealed and no longer accepts registrations")]
    Sealed(String),

    #[error("cannot expose a null instance as '{0}'")]
    NullInstance(String),

    #[error("type {type_name} has no class in module '{module}'")]
    UnregisteredType {
        module: String,
        type_name: &'static str,
    },

    #[error("class '{class}' in module '{module}' was never prepared")]
    UnpreparedClass { module: String, class: String },
}

/// Category of a script error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Name,
    Attribute,
    Type,
    Value,
    Index,
    Key,
    Import,
    ZeroDivision,
    Overflow,
    Recursion,
    Marshal,
    Runtime,
    System,
}

impl ErrorKind {
    /// Name shown to script authors
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Name => "NameError",
            ErrorKind::Attribute => "AttributeError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Import => "ImportError",
            ErrorKind::ZeroDivision => "ZeroDivisionError",
            ErrorKind::Overflow => "OverflowError",
            ErrorKind::Recursion => "RecursionError",
            ErrorKind::Marshal => "MarshalError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::System => "SystemError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised inside the interpreter
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attach a line number unless one is already recorded
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}: {}", line, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<CallError> for ScriptError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Marshal(inner) => ScriptError::new(ErrorKind::Marshal, inner.to_string()),
            CallError::Native(message) => ScriptError::new(ErrorKind::Runtime, message),
            other => ScriptError::new(ErrorKind::System, other.to_string()),
        }
    }
}

impl From<MarshalError> for ScriptError {
    fn from(err: MarshalError) -> Self {
        ScriptError::new(ErrorKind::Marshal, err.to_string())
    }
}

impl From<BindError> for ScriptError {
    fn from(err: BindError) -> Self {
        ScriptError::new(ErrorKind::System, err.to_string())
    }
}

/// Top-level embedding error
#[derive(Debug, Error)]
pub enum Error {
    #[error("interpreter is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("'{object}' has no attribute '{name}'")]
    AttributeNotFound { object: String, name: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Script error carried by this error, if any
    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            Error::Script(err) => Some(err),
            _ => None,
        }
    }
}
