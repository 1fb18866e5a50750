//! `[logging] install = true` installs the configured subscriber.
//!
//! Lives in its own binary so no other test installs first.

use liaison::logging;
use liaison::{EmbedConfig, Interpreter, Registry, Value};

#[test]
fn interpreter_installs_configured_subscriber() {
    assert!(!logging::is_initialized());
    let _plain = Interpreter::new();
    assert!(!logging::is_initialized());

    let config = EmbedConfig::parse(
        "[logging]\nlevel = \"warn\"\nspans = true\ntimings = true\ninstall = true\n",
    )
    .unwrap();
    let mut interp = Interpreter::with_config(config);

    let installed = logging::installed_config().unwrap();
    assert_eq!(installed.level, tracing::Level::WARN);
    assert!(installed.spans);
    assert!(installed.timings);

    // Timed commands still run normally
    interp.initialize(Registry::new()).unwrap();
    assert_eq!(interp.run("6 * 7").unwrap(), Value::Int(42));
}
