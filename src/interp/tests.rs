//! Tests for the interpreter and its embedding API

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use super::*;
use crate::error::{Error, ErrorKind};
use crate::registry::Registry;
use crate::Value;

/// Writer that keeps everything `print` produced
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn started() -> Interpreter {
    let mut interp = Interpreter::new();
    interp.initialize(Registry::new()).unwrap();
    interp
}

fn eval(interp: &mut Interpreter, source: &str) -> Value {
    interp
        .run(source)
        .unwrap_or_else(|e| panic!("{} failed: {}", source, e))
}

fn kind_of(result: Result<Value>) -> ErrorKind {
    match result {
        Err(Error::Script(err)) => err.kind,
        other => panic!("expected a script error, got {:?}", other),
    }
}

#[test]
fn test_lifecycle() {
    let mut interp = Interpreter::new();
    assert!(!interp.is_initialized());
    assert!(matches!(interp.run("1"), Err(Error::NotInitialized)));

    interp.initialize(Registry::new()).unwrap();
    assert!(interp.is_initialized());
    assert!(interp.finalize().is_some());
    assert!(!interp.is_initialized());
    assert!(interp.finalize().is_none());
}

#[test]
fn test_reinitialize_starts_fresh_session() {
    let mut interp = started();
    eval(&mut interp, "x = 1");
    interp.initialize(Registry::new()).unwrap();
    assert_eq!(kind_of(interp.run("x")), ErrorKind::Name);
}

#[test]
fn test_main_module_name_must_be_free() {
    let mut registry = Registry::new();
    registry.create_or_get("__main__", "").unwrap();
    let mut interp = Interpreter::new();
    assert!(matches!(
        interp.initialize(registry),
        Err(Error::Bind(crate::error::BindError::DuplicateName { .. }))
    ));
}

#[test]
fn test_run_returns_last_expression() {
    let mut interp = started();
    assert_eq!(eval(&mut interp, "x = 4\nx * 2"), Value::Int(8));
    assert_eq!(eval(&mut interp, "y = 1"), Value::None);
    assert_eq!(eval(&mut interp, "x"), Value::Int(4));
}

#[test]
fn test_arithmetic_and_logic() {
    let mut interp = started();
    assert_eq!(eval(&mut interp, "2 + 3 * 4 ** 2"), Value::Int(50));
    assert_eq!(eval(&mut interp, "7 // 2, 7 % 3, 7 / 2"), Value::tuple([
        Value::Int(3),
        Value::Int(1),
        Value::Float(3.5),
    ]));
    assert_eq!(eval(&mut interp, "-2 ** 2"), Value::Int(-4));
    assert_eq!(eval(&mut interp, "0 or 'fallback'"), Value::str("fallback"));
    assert_eq!(eval(&mut interp, "1 and None"), Value::None);
    assert_eq!(eval(&mut interp, "not 3 in [1, 2]"), Value::Bool(true));
    assert_eq!(eval(&mut interp, "'ab' + 'cd' == 'abcd'"), Value::Bool(true));
}

#[test]
fn test_control_flow() {
    let mut interp = started();
    let source = "
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    elif i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
total, n
";
    assert_eq!(eval(&mut interp, source), Value::tuple([Value::Int(16), Value::Int(3)]));
}

#[test]
fn test_functions_and_recursion() {
    let mut interp = started();
    let source = "
def fact(n):
    if n <= 1:
        return 1
    return n * fact(n - 1)
fact(10)
";
    assert_eq!(eval(&mut interp, source), Value::Int(3_628_800));
    assert_eq!(kind_of(interp.run("fact(1, 2)")), ErrorKind::Type);
}

#[test]
fn test_recursion_limit() {
    let mut config = EmbedConfig::default();
    config.interpreter.max_call_depth = 20;
    let mut interp = Interpreter::with_config(config);
    interp.initialize(Registry::new()).unwrap();

    eval(&mut interp, "def down(n):\n    return down(n + 1)");
    assert_eq!(kind_of(interp.run("down(0)")), ErrorKind::Recursion);
}

#[test]
fn test_collections_and_methods() {
    let mut interp = started();
    assert_eq!(eval(&mut interp, "d = {'a': 1}\nd['b'] = 2\nlen(d)"), Value::Int(2));
    assert_eq!(eval(&mut interp, "d.get('c', 0)"), Value::Int(0));
    assert_eq!(eval(&mut interp, "xs = [1, 2, 3]\nxs[-1] = 9\nxs"), Value::list([
        Value::Int(1),
        Value::Int(2),
        Value::Int(9),
    ]));
    assert_eq!(
        eval(&mut interp, "'-'.join('a b c'.split())"),
        Value::str("a-b-c")
    );
    assert_eq!(eval(&mut interp, "'hi'.encode().decode().upper()"), Value::str("HI"));
    assert_eq!(eval(&mut interp, "len({1, 2, 2, 3})"), Value::Int(3));
}

#[test]
fn test_print_goes_to_configured_output() {
    let mut interp = started();
    let out = Captured::default();
    interp.set_output(out.clone());

    eval(&mut interp, "print('a', 1, [2, 'b'], None)");
    assert_eq!(out.text(), "a 1 [2, 'b'] None\n");
}

#[test]
fn test_errors_carry_kind_and_line() {
    let mut interp = started();
    match interp.run("x = 1\ny = undefined_name") {
        Err(Error::Script(err)) => {
            assert_eq!(err.kind, ErrorKind::Name);
            assert_eq!(err.line, Some(2));
            assert!(err.message.contains("undefined_name"));
        }
        other => panic!("unexpected: {:?}", other),
    }

    assert_eq!(kind_of(interp.run("1 / 0")), ErrorKind::ZeroDivision);
    assert_eq!(kind_of(interp.run("[1][5]")), ErrorKind::Index);
    assert_eq!(kind_of(interp.run("{}['k']")), ErrorKind::Key);
    assert_eq!(kind_of(interp.run("'a' + 1")), ErrorKind::Type);
    assert_eq!(kind_of(interp.run("def f(:")), ErrorKind::Syntax);
    assert_eq!(kind_of(interp.run("import nowhere")), ErrorKind::Import);
    assert_eq!(kind_of(interp.run("return 1")), ErrorKind::Syntax);
}

#[test]
fn test_error_indicator_lifecycle() {
    let mut interp = started();
    assert!(interp.error().is_none());

    assert!(interp.run("missing").is_err());
    assert_eq!(interp.error().map(|e| e.kind), Some(ErrorKind::Name));

    // A later success does not clear it
    eval(&mut interp, "1");
    assert!(interp.error().is_some());

    interp.print_error();
    assert!(interp.error().is_none());

    assert!(interp.run("missing").is_err());
    interp.clear_error();
    assert!(interp.error().is_none());
}

#[test]
fn test_failed_statement_keeps_earlier_effects() {
    let mut interp = started();
    assert!(interp.run("a = 1\nb = a + 'x'\nc = 3").is_err());
    let main = interp.main_module().unwrap();
    assert_eq!(interp.get_attr::<i64>(&main, "a").unwrap(), 1);
    assert!(!interp.has_attr(&main, "b"));
    assert!(!interp.has_attr(&main, "c"));
}

#[test]
fn test_attribute_access_from_native_side() {
    let mut interp = started();
    eval(&mut interp, "name = 'liaison'\nsizes = [1, 2]");
    let main = interp.main_module().unwrap();

    assert_eq!(interp.get_attr::<String>(&main, "name").unwrap(), "liaison");
    assert_eq!(interp.get_attr::<Vec<u8>>(&main, "sizes").unwrap(), vec![1, 2]);
    assert!(matches!(
        interp.get_attr::<i64>(&main, "name"),
        Err(Error::Marshal(_))
    ));
    assert!(matches!(
        interp.get_attr::<i64>(&main, "nothing"),
        Err(Error::AttributeNotFound { .. })
    ));

    interp.set_attr(&main, "limit", 10i64).unwrap();
    assert_eq!(eval(&mut interp, "limit + 1"), Value::Int(11));
    assert!(interp.set_attr(&Value::Int(1), "x", 2i64).is_err());

    // Native-side attribute access never touches the error indicator
    assert!(interp.error().is_none());
}

#[test]
fn test_call_script_function_from_native_side() {
    let mut interp = started();
    eval(&mut interp, "def greet(who, times):\n    return ('hi ' + who) * times");
    let main = interp.main_module().unwrap();

    let greeting = interp.call(&main, "greet", ("bob", 2i64)).unwrap();
    assert_eq!(greeting, Value::str("hi bobhi bob"));

    let greet = interp.get_attr::<Value>(&main, "greet").unwrap();
    assert_eq!(
        interp.call_value(&greet, ("x", 1i64)).unwrap(),
        Value::str("hi x")
    );

    assert!(interp.call(&main, "greet", ()).is_err());
    assert_eq!(interp.error().map(|e| e.kind), Some(ErrorKind::Type));
}

#[test]
fn test_builtin_method_as_value() {
    let mut interp = started();
    assert_eq!(eval(&mut interp, "up = 'abc'.upper\nup()"), Value::str("ABC"));
    assert_eq!(eval(&mut interp, "len.__name__"), Value::str("len"));
}

#[test]
fn test_modules_can_be_aliased() {
    let mut registry = Registry::new();
    registry
        .create_or_get("tools", "")
        .unwrap()
        .register_function("twice", |x: i64| x * 2, "")
        .unwrap();
    let mut interp = Interpreter::new();
    interp.initialize(registry).unwrap();

    assert_eq!(eval(&mut interp, "import tools as t\nt.twice(4)"), Value::Int(8));
    assert_eq!(eval(&mut interp, "from tools import twice as tw\ntw(5)"), Value::Int(10));
    assert_eq!(kind_of(interp.run("from tools import thrice")), ErrorKind::Import);
}

#[test]
fn test_stats_follow_native_calls() {
    let mut registry = Registry::new();
    registry
        .create_or_get("m", "")
        .unwrap()
        .register_function("id", |x: i64| x, "")
        .unwrap();
    let mut interp = Interpreter::new();
    interp.initialize(registry).unwrap();

    eval(&mut interp, "import m\nm.id(1)\nm.id(2)");
    assert!(interp.run("m.id('x')").is_err());

    let stats = interp.stats().unwrap();
    assert_eq!(stats.slots, 1);
    assert_eq!(stats.calls_made, 3);
    assert_eq!(stats.marshaling_errors, 1);
}

#[test]
fn test_richer_statement_forms() {
    let mut interp = started();
    let source = "
a, (b, c) = 1, [2, 3]
found = None
for x in [4, 5, 6]:
    if x == 9:
        found = x
        break
else:
    found = 'none'
found, a + b + c, 1 < a + 1 < 3 < 2
";
    assert_eq!(
        eval(&mut interp, source),
        Value::tuple([Value::str("none"), Value::Int(6), Value::Bool(false)])
    );
    assert_eq!(
        eval(&mut interp, "'yes' if a else 'no'"),
        Value::str("yes")
    );
    assert_eq!(kind_of(interp.run("p, q = [1, 2, 3]")), ErrorKind::Value);
}

#[test]
fn test_calls_spread_and_dicts_merge() {
    let mut interp = started();
    eval(&mut interp, "def add3(a, b, c):\n    return a + b + c");
    assert_eq!(eval(&mut interp, "args = [2, 3]\nadd3(1, *args)"), Value::Int(6));

    let merged = eval(&mut interp, "base = {'b': 1, 'a': 2}\n{**base, 'a': 3, 'c': 4}");
    assert_eq!(merged.repr(), "{'b': 1, 'a': 3, 'c': 4}");
    assert_eq!(kind_of(interp.run("add3(1, 2, c=3)")), ErrorKind::Type);
}

#[test]
fn test_star_import_binds_public_names() {
    let mut registry = Registry::new();
    registry
        .create_or_get("tools", "")
        .unwrap()
        .register_function("twice", |x: i64| x * 2, "")
        .unwrap();
    let mut interp = Interpreter::new();
    interp.initialize(registry).unwrap();

    assert_eq!(eval(&mut interp, "from tools import *\ntwice(21)"), Value::Int(42));
}

#[test]
fn test_integers_wider_than_64_bits() {
    let mut interp = started();
    assert_eq!(
        eval(&mut interp, "18446744073709551615 + 1"),
        Value::Int(i128::from(u64::MAX) + 1)
    );
    assert_eq!(eval(&mut interp, "2 ** 100 // 2 ** 99"), Value::Int(2));
    assert_eq!(kind_of(interp.run("2 ** 127")), ErrorKind::Overflow);
    assert_eq!(kind_of(interp.run("int(1e300)")), ErrorKind::Overflow);
    let huge = format!("x = 1{}", "0".repeat(60));
    assert_eq!(kind_of(interp.run(&huge)), ErrorKind::Overflow);
}

#[test]
fn test_unsupported_syntax_is_reported() {
    let mut interp = started();
    for source in [
        "class A:\n    pass",
        "[x for x in range(3)]",
        "lambda: 1",
        "def f(a=1):\n    return a",
        "try:\n    pass\nexcept:\n    pass",
    ] {
        assert_eq!(kind_of(interp.run(source)), ErrorKind::Syntax, "{}", source);
    }
}
