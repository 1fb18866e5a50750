//! Structured `tracing` events for the binding layer and the interpreter
//!
//! Nothing is installed implicitly. A host either installs its own
//! subscriber, calls `init`/`init_with_config`, or sets `install = true`
//! under `[logging]` so `Interpreter::with_config` does it. Only the first
//! installation takes effect.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{CallError, MarshalError, ScriptError};
use crate::interop::Signature;

/// Settings of the first installation; `timings` is read by `perf::track`
static INSTALLED: OnceCell<LogConfig> = OnceCell::new();

/// Subscriber settings
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: Level,
    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
    pub json: bool,
    /// Emit span enter/close events
    pub spans: bool,
    /// Emit `perf::track` durations
    pub timings: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file: None,
            json: false,
            spans: false,
            timings: false,
        }
    }
}

/// Level from its name, any case; `warning` is accepted for `warn`
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "" | "0" | "false" | "off"))
}

impl LogConfig {
    /// Defaults overridden by the `LIAISON_LOG_*` variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `LIAISON_LOG_LEVEL`, `_FILE`, `_JSON`, `_SPANS` and `_PERF` on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = std::env::var("LIAISON_LOG_LEVEL").ok().and_then(|l| parse_level(&l)) {
            self.level = level;
        }
        if let Ok(path) = std::env::var("LIAISON_LOG_FILE") {
            self.file = Some(PathBuf::from(path));
        }
        self.json = env_flag("LIAISON_LOG_JSON").unwrap_or(self.json);
        self.spans = env_flag("LIAISON_LOG_SPANS").unwrap_or(self.spans);
        self.timings = env_flag("LIAISON_LOG_PERF").unwrap_or(self.timings);
        self
    }

    fn writer(&self) -> BoxMakeWriter {
        let Some(path) = self.file.as_deref() else {
            return BoxMakeWriter::new(io::stderr);
        };
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "liaison.log".to_string());
        BoxMakeWriter::new(tracing_appender::rolling::never(directory, file_name))
    }

    fn filter(&self) -> EnvFilter {
        // RUST_LOG wins when set
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("liaison={}", self.level.as_str().to_ascii_lowercase()))
        })
    }
}

/// Install a subscriber configured from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Install a subscriber for `config`; later calls keep the first one
pub fn init_with_config(config: LogConfig) {
    INSTALLED.get_or_init(|| {
        let span_events = if config.spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_writer(config.writer())
            .with_span_events(span_events)
            .with_target(true);
        let layer = if config.json {
            layer.json().boxed()
        } else {
            layer.with_ansi(config.file.is_none()).boxed()
        };

        // A host subscriber already in place is left alone
        let _ = tracing_subscriber::registry()
            .with(config.filter())
            .with(layer)
            .try_init();
        config
    });
}

pub fn is_initialized() -> bool {
    INSTALLED.get().is_some()
}

/// Settings the installed subscriber was built from
pub fn installed_config() -> Option<&'static LogConfig> {
    INSTALLED.get()
}

// ============================================================================
// Registration events
// ============================================================================

pub fn log_module_created(name: &str) {
    use tracing::debug;
    debug!(event = "module_created", module = name, "Module definition created");
}

pub fn log_function_registered(module: &str, name: &str, signature: &Signature) {
    use tracing::debug;
    debug!(
        event = "function_registered",
        module = module,
        function = name,
        signature = %signature,
        "Native function registered"
    );
}

pub fn log_class_registered(module: &str, name: &str, type_name: &str) {
    use tracing::debug;
    debug!(
        event = "class_registered",
        module = module,
        class = name,
        native_type = type_name,
        "Native class registered"
    );
}

/// Log materialization of a module object on first import
pub fn log_module_built(name: &str, functions: usize, classes: usize) {
    use tracing::info;
    info!(
        event = "module_built",
        module = name,
        functions = functions,
        classes = classes,
        "Native module imported"
    );
}

// ============================================================================
// Call path events
// ============================================================================

#[inline]
pub fn log_native_call(function: &str, arg_count: usize) {
    use tracing::trace;
    trace!(
        event = "native_call",
        function = function,
        args = arg_count,
        "Native function called"
    );
}

pub fn log_native_error(function: &str, error: &CallError) {
    use tracing::warn;
    warn!(
        event = "native_error",
        function = function,
        error = %error,
        "Native call failed"
    );
}

pub fn log_marshal_failure(target: &str, error: &MarshalError) {
    use tracing::warn;
    warn!(
        event = "marshal_failure",
        target_type = target,
        error = %error,
        "Value conversion failed"
    );
}

pub fn log_instance_exposed(module: &str, class: &str, name: &str, addr: usize) {
    use tracing::debug;
    debug!(
        event = "instance_exposed",
        module = module,
        class = class,
        name = name,
        address = %format!("{:#x}", addr),
        "Native instance exposed"
    );
}

// ============================================================================
// Session events
// ============================================================================

pub fn log_script_loaded(module: &str) {
    use tracing::debug;
    debug!(event = "script_loaded", module = module, "Script module executed");
}

pub fn log_script_error(error: &ScriptError) {
    use tracing::error;
    error!(
        event = "script_error",
        kind = error.kind.as_str(),
        line = ?error.line,
        error = %error.message,
        "Script error"
    );
}

pub fn log_session_start(main_module: &str, modules: usize) {
    use tracing::info;
    info!(
        event = "session_start",
        main_module = main_module,
        registered_modules = modules,
        "Interpreter session starting"
    );
}

pub fn log_session_shutdown(calls_made: u64) {
    use tracing::info;
    info!(
        event = "session_shutdown",
        calls_made = calls_made,
        "Interpreter session shutting down"
    );
}

/// Duration events for embedding commands
pub mod perf {
    use std::time::Instant;

    /// Logs the elapsed time of `operation` when dropped, if timings are on
    #[must_use]
    pub struct CommandTimer {
        operation: &'static str,
        start: Instant,
    }

    pub fn track(operation: &'static str) -> Option<CommandTimer> {
        super::installed_config()
            .filter(|config| config.timings)
            .map(|_| CommandTimer {
                operation,
                start: Instant::now(),
            })
    }

    impl Drop for CommandTimer {
        fn drop(&mut self) {
            tracing::debug!(
                event = "command_timed",
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "Command finished"
            );
        }
    }
}
