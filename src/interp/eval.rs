//! Tree-walking evaluator over the `rustpython` AST
//!
//! A `Machine` borrows the live session for the duration of one embedding
//! call. Attribute access is also exposed as free functions so the embedding
//! API can read and write attributes without running any script.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use rustpython_parser::ast::{self, CmpOp, Constant, Expr, Operator, Stmt, UnaryOp};
use smallvec::SmallVec;

use super::builtins::{self, Builtin};
use super::syntax::{self, LineIndex, Program, MAX_NESTING};
use super::Session;
use crate::config::InterpreterConfig;
use crate::error::{ErrorKind, ScriptError};
use crate::interop::{capsule_of, DispatchTable};
use crate::logging;
use crate::object::{Callable, MemberKind, ModuleObject, NativeFunction, ScriptFunction};
use crate::Value;

/// Argument vector on the call path
pub(crate) type Args = SmallVec<[Value; 4]>;

/// Upper bound on the length produced by sequence repetition
const MAX_REPEAT: usize = 10_000_000;

/// Expression nesting allowed within one frame
const MAX_EXPR_DEPTH: usize = MAX_NESTING;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Frame {
    globals: Rc<ModuleObject>,
    locals: Option<HashMap<String, Value>>,
    lines: Rc<LineIndex>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.as_ref().and_then(|l| l.get(name)) {
            return Some(value.clone());
        }
        self.globals.get(name)
    }

    fn assign(&mut self, name: &str, value: Value) {
        match &mut self.locals {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => self.globals.set(name, value),
        }
    }
}

fn error(kind: ErrorKind, message: impl Into<String>) -> ScriptError {
    ScriptError::new(kind, message)
}

fn unsupported_syntax(what: &str) -> ScriptError {
    error(ErrorKind::Syntax, format!("{} is not supported", what))
}

/// Evaluator bound to a live session
pub(crate) struct Machine<'s> {
    pub(crate) session: &'s mut Session,
    output: &'s mut dyn Write,
    config: &'s InterpreterConfig,
    depth: usize,
    nesting: usize,
}

impl<'s> Machine<'s> {
    pub(crate) fn new(
        session: &'s mut Session,
        output: &'s mut dyn Write,
        config: &'s InterpreterConfig,
    ) -> Self {
        Self {
            session,
            output,
            config,
            depth: 0,
            nesting: 0,
        }
    }

    fn dispatch(&self) -> &DispatchTable {
        self.session.registry.dispatch()
    }

    /// Run `source` in `module`, returning the value of the last expression statement
    pub(crate) fn run_source(
        &mut self,
        source: &str,
        module: &Rc<ModuleObject>,
    ) -> Result<Value, ScriptError> {
        let program = syntax::parse_program(source, module.name())?;
        self.exec_module_body(&program, module)
    }

    fn exec_module_body(
        &mut self,
        program: &Program,
        module: &Rc<ModuleObject>,
    ) -> Result<Value, ScriptError> {
        let mut frame = Frame {
            globals: Rc::clone(module),
            locals: None,
            lines: Rc::clone(&program.lines),
        };
        let mut last = Value::None;
        for stmt in &program.body {
            let line = program.lines.line_at(stmt);
            last = Value::None;
            if let Stmt::Expr(ast::StmtExpr { value, .. }) = stmt {
                last = self.eval(value, &mut frame).map_err(|e| e.at_line(line))?;
                continue;
            }
            match self.exec(stmt, &mut frame)? {
                Flow::Normal => {}
                Flow::Return(_) => {
                    return Err(error(ErrorKind::Syntax, "'return' outside function").at_line(line))
                }
                Flow::Break | Flow::Continue => {
                    return Err(error(ErrorKind::Syntax, "'break' or 'continue' outside loop")
                        .at_line(line))
                }
            }
        }
        Ok(last)
    }

    /// Execute `source` as a fresh module registered under `name`
    ///
    /// On failure the module cache keeps whatever `name` resolved to before.
    pub(crate) fn load_module(
        &mut self,
        name: &str,
        source: &str,
    ) -> Result<Rc<ModuleObject>, ScriptError> {
        let program = syntax::parse_program(source, name)?;
        let module = ModuleObject::new(name, "");

        // Importable from its own body while it runs
        let previous = self
            .session
            .modules
            .insert(name.to_string(), Rc::clone(&module));
        if let Err(err) = self.exec_module_body(&program, &module) {
            match previous {
                Some(previous) => {
                    self.session.modules.insert(name.to_string(), previous);
                }
                None => {
                    self.session.modules.remove(name);
                }
            }
            return Err(err);
        }
        logging::log_script_loaded(name);
        Ok(module)
    }

    /// Resolve a module: cache, then native registry, then search paths
    pub(crate) fn import(&mut self, name: &str) -> Result<Rc<ModuleObject>, ScriptError> {
        if let Some(module) = self.session.modules.get(name) {
            return Ok(Rc::clone(module));
        }

        if let Some(def) = self.session.registry.module_mut(name) {
            let module = def.build_module_object()?;
            self.session
                .modules
                .insert(name.to_string(), Rc::clone(&module));
            return Ok(module);
        }

        let config = self.config;
        let file_name = format!("{}.{}", name.replace('.', "/"), config.script_extension);
        for dir in &config.search_paths {
            let path = dir.join(&file_name);
            if path.is_file() {
                let source = std::fs::read_to_string(&path).map_err(|e| {
                    error(
                        ErrorKind::Import,
                        format!("cannot read {}: {}", path.display(), e),
                    )
                })?;
                return self.load_module(name, &source);
            }
        }

        Err(error(
            ErrorKind::Import,
            format!("No module named '{}'", name),
        ))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, ScriptError> {
        let result = self.exec_stmt(stmt, frame);
        result.map_err(|e| e.at_line(frame.lines.line_at(stmt)))
    }

    fn exec_block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec(stmt, frame)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Expr(ast::StmtExpr { value, .. }) => {
                self.eval(value, frame)?;
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let value = self.eval(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            Stmt::AugAssign(ast::StmtAugAssign {
                target, op, value, ..
            }) => {
                let current = self.load_target(target, frame)?;
                let rhs = self.eval(value, frame)?;
                let updated = binary(op, &current, &rhs)?;
                self.assign(target, updated, frame)?;
            }
            Stmt::Import(ast::StmtImport { names, .. }) => {
                for alias in names {
                    let name = alias.name.as_str();
                    let module = self.import(name)?;
                    let binding = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        None => name.rsplit('.').next().unwrap_or(name),
                    };
                    frame.assign(binding, Value::Module(module));
                }
            }
            Stmt::ImportFrom(ast::StmtImportFrom { module, names, .. }) => {
                let module_name = module
                    .as_ref()
                    .map(|m| m.as_str())
                    .ok_or_else(|| unsupported_syntax("relative import"))?;
                let source = self.import(module_name)?;
                for alias in names {
                    let name = alias.name.as_str();
                    if name == "*" {
                        for public in source.names().into_iter().filter(|n| !n.starts_with('_')) {
                            if let Some(value) = source.get(&public) {
                                frame.assign(&public, value);
                            }
                        }
                        continue;
                    }
                    let value = source.get(name).ok_or_else(|| {
                        error(
                            ErrorKind::Import,
                            format!("cannot import name '{}' from '{}'", name, module_name),
                        )
                    })?;
                    let binding = alias.asname.as_ref().map_or(name, |a| a.as_str());
                    frame.assign(binding, value);
                }
            }
            Stmt::FunctionDef(def) => {
                let function = define(def, frame)?;
                frame.assign(def.name.as_str(), function);
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If(ast::StmtIf {
                test, body, orelse, ..
            }) => {
                let branch = if self.eval(test, frame)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, frame);
            }
            Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            }) => {
                while self.eval(test, frame)?.truthy() {
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                let iterable = self.eval(iter, frame)?;
                for item in builtins::iterate(&iterable)? {
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Continue(_) => return Ok(Flow::Continue),
            Stmt::Pass(_) => {}
            _ => return Err(unsupported_syntax("this statement")),
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Expr, value: Value, frame: &mut Frame) -> Result<(), ScriptError> {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => {
                frame.assign(id.as_str(), value);
                Ok(())
            }
            Expr::Attribute(ast::ExprAttribute {
                value: object,
                attr,
                ..
            }) => {
                let object = self.eval(object, frame)?;
                set_attribute(self.dispatch(), &object, attr.as_str(), value)
            }
            Expr::Subscript(ast::ExprSubscript {
                value: container,
                slice,
                ..
            }) => {
                let name = container_name(container)?;
                let index = self.eval(slice, frame)?;
                let current = frame.lookup(name).ok_or_else(|| name_error(name))?;
                let updated = set_item(current, index, value)?;
                frame.assign(name, updated);
                Ok(())
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                let items = builtins::iterate(&value)?;
                if items.len() != elts.len() {
                    return Err(error(
                        ErrorKind::Value,
                        format!(
                            "expected {} values to unpack, got {}",
                            elts.len(),
                            items.len()
                        ),
                    ));
                }
                for (target, item) in elts.iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
                Ok(())
            }
            _ => Err(error(ErrorKind::Syntax, "cannot assign to expression")),
        }
    }

    fn load_target(&mut self, target: &Expr, frame: &mut Frame) -> Result<Value, ScriptError> {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => {
                frame.lookup(id.as_str()).ok_or_else(|| name_error(id.as_str()))
            }
            Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let object = self.eval(value, frame)?;
                get_attribute(self.dispatch(), &object, attr.as_str())
            }
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                let name = container_name(value)?;
                let container = frame.lookup(name).ok_or_else(|| name_error(name))?;
                let index = self.eval(slice, frame)?;
                subscript(&container, &index)
            }
            _ => Err(error(
                ErrorKind::Syntax,
                "illegal expression for augmented assignment",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value, ScriptError> {
        if self.nesting >= MAX_EXPR_DEPTH {
            return Err(error(
                ErrorKind::Recursion,
                "maximum expression nesting exceeded",
            ));
        }
        self.nesting += 1;
        let result = self.eval_expr(expr, frame);
        self.nesting -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value, ScriptError> {
        match expr {
            Expr::Constant(ast::ExprConstant { value, .. }) => constant(value),
            Expr::Name(ast::ExprName { id, .. }) => load_name(id.as_str(), frame),
            Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let object = self.eval(value, frame)?;
                get_attribute(self.dispatch(), &object, attr.as_str())
            }
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                let object = self.eval(value, frame)?;
                let index = self.eval(slice, frame)?;
                subscript(&object, &index)
            }
            Expr::Call(call) => self.eval_call(call, frame),
            Expr::BinOp(ast::ExprBinOp {
                left, op, right, ..
            }) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                binary(op, &left, &right)
            }
            Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.eval(operand, frame)?;
                unary(op, &operand)
            }
            Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                let stop_when = matches!(op, ast::BoolOp::Or);
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value, frame)?;
                    if last.truthy() == stop_when {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare(cmp) => self.eval_compare(cmp, frame),
            Expr::IfExp(ast::ExprIfExp {
                test, body, orelse, ..
            }) => {
                if self.eval(test, frame)?.truthy() {
                    self.eval(body, frame)
                } else {
                    self.eval(orelse, frame)
                }
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) => Ok(Value::Tuple(self.eval_all(elts, frame)?)),
            Expr::List(ast::ExprList { elts, .. }) => Ok(Value::List(self.eval_all(elts, frame)?)),
            Expr::Set(ast::ExprSet { elts, .. }) => Ok(Value::set(self.eval_all(elts, frame)?)),
            Expr::Dict(dict) => self.eval_dict(dict, frame),
            Expr::Slice(_) => Err(unsupported_syntax("slicing")),
            Expr::Starred(_) => Err(error(
                ErrorKind::Syntax,
                "starred expression is only allowed in a call",
            )),
            _ => Err(unsupported_syntax("this expression")),
        }
    }

    fn eval_all(&mut self, items: &[Expr], frame: &mut Frame) -> Result<Vec<Value>, ScriptError> {
        items.iter().map(|item| self.eval(item, frame)).collect()
    }

    fn eval_call(&mut self, call: &ast::ExprCall, frame: &mut Frame) -> Result<Value, ScriptError> {
        if !call.keywords.is_empty() {
            return Err(error(
                ErrorKind::Type,
                "keyword arguments are not supported",
            ));
        }
        let callee = self.eval(&call.func, frame)?;
        let mut args = Args::with_capacity(call.args.len());
        for arg in &call.args {
            match arg {
                Expr::Starred(ast::ExprStarred { value, .. }) => {
                    let spread = self.eval(value, frame)?;
                    args.extend(builtins::iterate(&spread)?);
                }
                other => args.push(self.eval(other, frame)?),
            }
        }
        self.call(&callee, args)
    }

    fn eval_compare(&mut self, cmp: &ast::ExprCompare, frame: &mut Frame) -> Result<Value, ScriptError> {
        let mut left = self.eval(&cmp.left, frame)?;
        let mut result = Value::Bool(true);
        // `a < b < c` stops at the first false link
        for (op, right) in cmp.ops.iter().zip(&cmp.comparators) {
            let right = self.eval(right, frame)?;
            result = compare(op, &left, &right)?;
            if !result.truthy() {
                break;
            }
            left = right;
        }
        Ok(result)
    }

    fn eval_dict(&mut self, dict: &ast::ExprDict, frame: &mut Frame) -> Result<Value, ScriptError> {
        let mut map = crate::value::DictMap::with_capacity(dict.values.len());
        for (key, value) in dict.keys.iter().zip(&dict.values) {
            match key {
                Some(key) => {
                    let key = self.eval(key, frame)?;
                    let value = self.eval(value, frame)?;
                    map.insert(key, value);
                }
                // `{**other}`
                None => match self.eval(value, frame)? {
                    Value::Dict(other) => map.extend(other),
                    other => {
                        return Err(error(
                            ErrorKind::Type,
                            format!("'{}' object is not a mapping", other.type_name()),
                        ))
                    }
                },
            }
        }
        Ok(Value::Dict(map))
    }

    /// Invoke any callable value
    pub(crate) fn call(&mut self, callee: &Value, args: Args) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(callable) => match callable.as_ref() {
                Callable::Native(function) => self.call_native(function, None, args),
                Callable::Bound { receiver, method } => {
                    self.call_native(method, Some(receiver), args)
                }
                Callable::Builtin(builtin) => {
                    builtins::call_builtin(*builtin, args.into_vec(), &mut *self.output)
                }
                Callable::BuiltinMethod { receiver, name } => {
                    builtins::call_method(receiver, name, args.into_vec())
                }
                Callable::Script(function) => self.call_script(function, args),
            },
            Value::Type(ty) => {
                let capsule = match args.as_slice() {
                    [arg] => capsule_of(arg),
                    _ => None,
                }
                .ok_or_else(|| {
                    error(
                        ErrorKind::Type,
                        format!("{}() takes the capsule of a native instance", ty.name()),
                    )
                })?;
                Ok(Value::Object(ty.instantiate(capsule)?))
            }
            other => Err(error(
                ErrorKind::Type,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    fn call_native(
        &self,
        function: &NativeFunction,
        receiver: Option<&Value>,
        args: Args,
    ) -> Result<Value, ScriptError> {
        let mut args = args.into_vec();
        let unbound_receiver: Value;
        let receiver = match receiver {
            Some(receiver) => Some(receiver),
            None if function.signature.is_bound() => {
                if args.is_empty() {
                    return Err(error(
                        ErrorKind::Type,
                        format!("method '{}' needs an instance argument", function.name),
                    ));
                }
                unbound_receiver = args.remove(0);
                Some(&unbound_receiver)
            }
            None => None,
        };

        logging::log_native_call(&function.name, args.len());
        function
            .entry
            .invoke(self.dispatch(), receiver, &Value::Tuple(args))
            .map_err(|err| {
                logging::log_native_error(&function.name, &err);
                let mut script_err = ScriptError::from(err);
                script_err.message = format!("{}(): {}", function.name, script_err.message);
                script_err
            })
    }

    fn call_script(&mut self, function: &ScriptFunction, args: Args) -> Result<Value, ScriptError> {
        if args.len() != function.params.len() {
            return Err(error(
                ErrorKind::Type,
                format!(
                    "{}() takes {} positional argument(s) but {} were given",
                    function.name,
                    function.params.len(),
                    args.len()
                ),
            ));
        }
        if self.depth >= self.config.max_call_depth {
            return Err(error(
                ErrorKind::Recursion,
                "maximum recursion depth exceeded",
            ));
        }
        let globals = function.globals.upgrade().ok_or_else(|| {
            error(
                ErrorKind::Runtime,
                format!("module of function '{}' no longer exists", function.name),
            )
        })?;

        let locals = function.params.iter().cloned().zip(args).collect();
        let mut frame = Frame {
            globals,
            locals: Some(locals),
            lines: Rc::clone(&function.lines),
        };

        self.depth += 1;
        let outer_nesting = std::mem::replace(&mut self.nesting, 0);
        let flow = self.exec_block(&function.body, &mut frame);
        self.nesting = outer_nesting;
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
            Flow::Break | Flow::Continue => Err(error(
                ErrorKind::Syntax,
                "'break' or 'continue' outside loop",
            )),
        }
    }
}

/// Build a script function from its definition
fn define(def: &ast::StmtFunctionDef, frame: &Frame) -> Result<Value, ScriptError> {
    let params = &def.args;
    if !def.decorator_list.is_empty() {
        return Err(unsupported_syntax("decorator"));
    }
    if !params.posonlyargs.is_empty()
        || !params.kwonlyargs.is_empty()
        || params.vararg.is_some()
        || params.kwarg.is_some()
        || params.args.iter().any(|arg| arg.default.is_some())
    {
        return Err(unsupported_syntax("parameter kind other than positional"));
    }

    let function = ScriptFunction {
        name: def.name.to_string(),
        params: params.args.iter().map(|arg| arg.def.arg.to_string()).collect(),
        body: Rc::from(def.body.clone()),
        lines: Rc::clone(&frame.lines),
        globals: Rc::downgrade(&frame.globals),
    };
    Ok(Value::Function(Rc::new(Callable::Script(function))))
}

fn constant(value: &Constant) -> Result<Value, ScriptError> {
    Ok(match value {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(
            n.to_string()
                .parse::<i128>()
                .map_err(|_| error(ErrorKind::Overflow, "integer literal is too large"))?,
        ),
        Constant::Float(x) => Value::Float(*x),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Bytes(b) => Value::Bytes(b.clone()),
        Constant::Tuple(items) => {
            Value::Tuple(items.iter().map(constant).collect::<Result<_, _>>()?)
        }
        _ => return Err(unsupported_syntax("this literal")),
    })
}

fn load_name(name: &str, frame: &Frame) -> Result<Value, ScriptError> {
    frame
        .lookup(name)
        .or_else(|| Builtin::from_name(name).map(|b| Value::Function(Rc::new(Callable::Builtin(b)))))
        .ok_or_else(|| name_error(name))
}

/// Item assignment rebinds a named container
fn container_name(container: &Expr) -> Result<&str, ScriptError> {
    match container {
        Expr::Name(ast::ExprName { id, .. }) => Ok(id.as_str()),
        _ => Err(error(
            ErrorKind::Syntax,
            "item assignment needs a named container",
        )),
    }
}

fn name_error(name: &str) -> ScriptError {
    error(ErrorKind::Name, format!("name '{}' is not defined", name))
}

fn no_attribute(object: &Value, name: &str) -> ScriptError {
    let owner = match object {
        Value::Module(module) => format!("module '{}'", module.name()),
        Value::Object(instance) => format!("'{}' object", instance.class().qualified_name()),
        Value::Type(ty) => format!("type object '{}'", ty.name()),
        other => format!("'{}' object", other.type_name()),
    };
    error(
        ErrorKind::Attribute,
        format!("{} has no attribute '{}'", owner, name),
    )
}

// ============================================================================
// Attribute access
// ============================================================================

/// Read `object.name`
pub(crate) fn get_attribute(
    dispatch: &DispatchTable,
    object: &Value,
    name: &str,
) -> Result<Value, ScriptError> {
    match object {
        Value::Module(module) => module.get(name).ok_or_else(|| no_attribute(object, name)),
        Value::Object(instance) => {
            let class = instance.class();
            if let Some(member) = class.member(name) {
                return match &member.kind {
                    MemberKind::Capsule => Ok(Value::Capsule(instance.capsule())),
                    MemberKind::Native { getter, .. } => getter
                        .invoke(dispatch, Some(object), &Value::Tuple(Vec::new()))
                        .map_err(|err| {
                            logging::log_native_error(name, &err);
                            ScriptError::from(err)
                        }),
                };
            }
            class
                .method(name)
                .map(|method| {
                    Value::Function(Rc::new(Callable::Bound {
                        receiver: object.clone(),
                        method: Rc::clone(method),
                    }))
                })
                .ok_or_else(|| no_attribute(object, name))
        }
        Value::Type(ty) => match name {
            "__name__" => Ok(Value::str(ty.name())),
            "__module__" => Ok(Value::str(ty.module())),
            _ => ty
                .method(name)
                .map(|method| Value::Function(Rc::new(Callable::Native(Rc::clone(method)))))
                .ok_or_else(|| no_attribute(object, name)),
        },
        Value::Function(callable) if name == "__name__" => Ok(Value::str(callable.name())),
        other => builtins::lookup_method(other, name)
            .map(|method| {
                Value::Function(Rc::new(Callable::BuiltinMethod {
                    receiver: other.clone(),
                    name: method,
                }))
            })
            .ok_or_else(|| no_attribute(object, name)),
    }
}

/// Whether `object.name` exists, without running any getter
pub(crate) fn has_attribute(object: &Value, name: &str) -> bool {
    match object {
        Value::Module(module) => module.contains(name),
        Value::Object(instance) => {
            let class = instance.class();
            class.member(name).is_some() || class.method(name).is_some()
        }
        Value::Type(ty) => matches!(name, "__name__" | "__module__") || ty.method(name).is_some(),
        Value::Function(_) => name == "__name__",
        other => builtins::lookup_method(other, name).is_some(),
    }
}

/// Write `object.name = value`
pub(crate) fn set_attribute(
    dispatch: &DispatchTable,
    object: &Value,
    name: &str,
    value: Value,
) -> Result<(), ScriptError> {
    match object {
        Value::Module(module) => {
            module.set(name, value);
            Ok(())
        }
        Value::Object(instance) => {
            let class = instance.class();
            match class.member(name).map(|m| &m.kind) {
                Some(MemberKind::Native {
                    setter: Some(setter),
                    ..
                }) => setter
                    .invoke(dispatch, Some(object), &Value::Tuple(vec![value]))
                    .map(|_| ())
                    .map_err(|err| {
                        logging::log_native_error(name, &err);
                        ScriptError::from(err)
                    }),
                Some(_) => Err(error(
                    ErrorKind::Attribute,
                    format!(
                        "attribute '{}' of '{}' objects is not writable",
                        name,
                        class.qualified_name()
                    ),
                )),
                None => Err(no_attribute(object, name)),
            }
        }
        other => Err(no_attribute(other, name)),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn unsupported(op: &str, left: &Value, right: &Value) -> ScriptError {
    error(
        ErrorKind::Type,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
}

fn op_symbol(op: &Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

pub(crate) fn overflow(message: &str) -> ScriptError {
    error(ErrorKind::Overflow, message)
}

fn int_overflow() -> ScriptError {
    overflow("integer result is too large")
}

fn repeat_count(count: i128, len: usize) -> Result<usize, ScriptError> {
    let count = usize::try_from(count).unwrap_or(0);
    if count.saturating_mul(len) > MAX_REPEAT {
        return Err(error(ErrorKind::Value, "repeated sequence is too large"));
    }
    Ok(count)
}

fn repeat(items: &[Value], count: usize) -> Vec<Value> {
    (0..count).flat_map(|_| items.iter().cloned()).collect()
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

pub(crate) fn binary(op: &Operator, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let adding = matches!(op, Operator::Add);
    let multiplying = matches!(op, Operator::Mult);
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Bool(_) | Value::Int(_), Value::Bool(_) | Value::Int(_)) => {
            int_op(op, bool_as_int(left), bool_as_int(right))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_op(op, as_float(left), as_float(right))
                .ok_or_else(|| unsupported(op_symbol(op), left, right))?
        }
        (Value::Str(a), Value::Str(b)) if adding => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::Bytes(a), Value::Bytes(b)) if adding => {
            Ok(Value::Bytes([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::List(a), Value::List(b)) if adding => {
            Ok(Value::List([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::Tuple(a), Value::Tuple(b)) if adding => {
            Ok(Value::Tuple([a.as_slice(), b.as_slice()].concat()))
        }
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if multiplying => {
            Ok(Value::Str(s.repeat(repeat_count(*n, s.len())?)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) if multiplying => {
            Ok(Value::List(repeat(items, repeat_count(*n, items.len())?)))
        }
        (Value::Tuple(items), Value::Int(n)) | (Value::Int(n), Value::Tuple(items)) if multiplying => {
            Ok(Value::Tuple(repeat(items, repeat_count(*n, items.len())?)))
        }
        _ => Err(unsupported(op_symbol(op), left, right)),
    }
}

fn bool_as_int(value: &Value) -> i128 {
    match value {
        Value::Bool(b) => i128::from(*b),
        Value::Int(n) => *n,
        _ => 0,
    }
}

fn int_op(op: &Operator, a: i128, b: i128) -> Result<Value, ScriptError> {
    let zero_division = || error(ErrorKind::ZeroDivision, "integer division or modulo by zero");
    let shift = |b: i128| {
        if b < 0 {
            return Err(error(ErrorKind::Value, "negative shift count"));
        }
        u32::try_from(b).map_err(|_| int_overflow())
    };
    match op {
        Operator::Add => a.checked_add(b).map(Value::Int).ok_or_else(int_overflow),
        Operator::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(int_overflow),
        Operator::Mult => a.checked_mul(b).map(Value::Int).ok_or_else(int_overflow),
        Operator::Div => {
            if b == 0 {
                return Err(error(ErrorKind::ZeroDivision, "division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        Operator::FloorDiv => {
            if b == 0 {
                return Err(zero_division());
            }
            let q = a.checked_div(b).ok_or_else(int_overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        Operator::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            let r = a.checked_rem(b).ok_or_else(int_overflow)?;
            let adjust = r != 0 && ((r < 0) != (b < 0));
            Ok(Value::Int(if adjust { r + b } else { r }))
        }
        Operator::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| int_overflow())?;
            a.checked_pow(exp).map(Value::Int).ok_or_else(int_overflow)
        }
        Operator::LShift => {
            let by = shift(b)?;
            // Bits shifted out of the top are an overflow
            a.checked_shl(by)
                .filter(|shifted| (shifted >> by) == a)
                .map(Value::Int)
                .ok_or_else(int_overflow)
        }
        Operator::RShift => Ok(Value::Int(a >> shift(b)?.min(127))),
        Operator::BitAnd => Ok(Value::Int(a & b)),
        Operator::BitOr => Ok(Value::Int(a | b)),
        Operator::BitXor => Ok(Value::Int(a ^ b)),
        Operator::MatMult => Err(unsupported("@", &Value::Int(a), &Value::Int(b))),
    }
}

/// Float arithmetic; `None` for operators floats do not support
fn float_op(op: &Operator, a: f64, b: f64) -> Option<Result<Value, ScriptError>> {
    let zero_division = || Err(error(ErrorKind::ZeroDivision, "float division by zero"));
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => {
            if b == 0.0 {
                return Some(zero_division());
            }
            a / b
        }
        Operator::FloorDiv => {
            if b == 0.0 {
                return Some(zero_division());
            }
            (a / b).floor()
        }
        Operator::Mod => {
            if b == 0.0 {
                return Some(zero_division());
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        Operator::Pow => a.powf(b),
        _ => return None,
    };
    Some(Ok(Value::Float(value)))
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_float(left).partial_cmp(&as_float(right))
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if x != y {
                    return order(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match (container, item) {
        (Value::List(items) | Value::Tuple(items), _) => Ok(items.contains(item)),
        (Value::Set(items), _) => Ok(items.contains(item)),
        (Value::Dict(map), _) => Ok(map.contains_key(item)),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Bytes(b), Value::Bytes(sub)) => {
            Ok(sub.is_empty() || b.windows(sub.len()).any(|w| w == sub.as_slice()))
        }
        (Value::Bytes(b), Value::Int(n)) => Ok(u8::try_from(*n).map_or(false, |n| b.contains(&n))),
        (Value::Str(_), other) => Err(error(
            ErrorKind::Type,
            format!("'in <string>' requires string as left operand, not {}", other.type_name()),
        )),
        (other, _) => Err(error(
            ErrorKind::Type,
            format!("argument of type '{}' is not iterable", other.type_name()),
        )),
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Capsule(_), Value::Capsule(_))
        | (Value::Object(_), Value::Object(_))
        | (Value::Module(_), Value::Module(_))
        | (Value::Type(_), Value::Type(_))
        | (Value::Function(_), Value::Function(_)) => left == right,
        _ => false,
    }
}

pub(crate) fn compare(op: &CmpOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let ordered = |symbol: &str, accept: fn(Ordering) -> bool| {
        order(left, right).map(|o| Value::Bool(accept(o))).ok_or_else(|| {
            error(
                ErrorKind::Type,
                format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    left.type_name(),
                    right.type_name()
                ),
            )
        })
    };
    match op {
        CmpOp::Eq => Ok(Value::Bool(left == right)),
        CmpOp::NotEq => Ok(Value::Bool(left != right)),
        CmpOp::Lt => ordered("<", Ordering::is_lt),
        CmpOp::LtE => ordered("<=", Ordering::is_le),
        CmpOp::Gt => ordered(">", Ordering::is_gt),
        CmpOp::GtE => ordered(">=", Ordering::is_ge),
        CmpOp::In => contains(right, left).map(Value::Bool),
        CmpOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        CmpOp::Is => Ok(Value::Bool(identical(left, right))),
        CmpOp::IsNot => Ok(Value::Bool(!identical(left, right))),
    }
}

fn unary(op: &UnaryOp, operand: &Value) -> Result<Value, ScriptError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy())),
        (UnaryOp::USub, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(int_overflow),
        (UnaryOp::USub, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::UAdd, value @ (Value::Int(_) | Value::Float(_))) => Ok(value.clone()),
        (UnaryOp::Invert, Value::Int(n)) => Ok(Value::Int(!n)),
        (_, other) => Err(error(
            ErrorKind::Type,
            format!("bad operand type for unary operator: '{}'", other.type_name()),
        )),
    }
}

fn normalize_index(index: i128, len: usize, what: &str) -> Result<usize, ScriptError> {
    let len = len as i128;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(error(ErrorKind::Index, format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

pub(crate) fn subscript(object: &Value, index: &Value) -> Result<Value, ScriptError> {
    match (object, index) {
        (Value::List(items), Value::Int(i)) => Ok(items[normalize_index(*i, items.len(), "list")?].clone()),
        (Value::Tuple(items), Value::Int(i)) => {
            Ok(items[normalize_index(*i, items.len(), "tuple")?].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let at = normalize_index(*i, s.chars().count(), "string")?;
            Ok(s.chars().nth(at).map(|c| Value::Str(c.to_string())).unwrap_or_default())
        }
        (Value::Bytes(b), Value::Int(i)) => {
            Ok(Value::Int(i128::from(b[normalize_index(*i, b.len(), "bytes")?])))
        }
        (Value::Dict(map), key) => map
            .get(key)
            .cloned()
            .ok_or_else(|| error(ErrorKind::Key, key.repr())),
        (Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Bytes(_), other) => Err(error(
            ErrorKind::Type,
            format!("indices must be integers, not {}", other.type_name()),
        )),
        (other, _) => Err(error(
            ErrorKind::Type,
            format!("'{}' object is not subscriptable", other.type_name()),
        )),
    }
}

fn set_item(container: Value, index: Value, value: Value) -> Result<Value, ScriptError> {
    match (container, index) {
        (Value::List(mut items), Value::Int(i)) => {
            let at = normalize_index(i, items.len(), "list assignment")?;
            items[at] = value;
            Ok(Value::List(items))
        }
        (Value::Dict(mut map), key) => {
            map.insert(key, value);
            Ok(Value::Dict(map))
        }
        (other, _) => Err(error(
            ErrorKind::Type,
            format!("'{}' object does not support item assignment", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_division_semantics() {
        assert_eq!(binary(&Operator::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(&Operator::Mod, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(binary(&Operator::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(
            binary(&Operator::Div, &Value::Int(1), &Value::Int(0)).unwrap_err().kind,
            ErrorKind::ZeroDivision
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        let err = binary(&Operator::Add, &Value::Int(i128::MAX), &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);

        // Past the 64-bit range is still exact
        let wide = binary(&Operator::Mult, &Value::Int(i64::MAX.into()), &Value::Int(4)).unwrap();
        assert_eq!(wide, Value::Int(i128::from(i64::MAX) * 4));

        let err = binary(&Operator::LShift, &Value::Int(1), &Value::Int(200)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);
        assert_eq!(binary(&Operator::LShift, &Value::Int(3), &Value::Int(2)).unwrap(), Value::Int(12));
    }

    #[test]
    fn test_mixed_operand_types() {
        assert_eq!(binary(&Operator::Add, &Value::Int(1), &Value::Float(0.5)).unwrap(), Value::Float(1.5));
        assert_eq!(
            binary(&Operator::Mult, &Value::str("ab"), &Value::Int(2)).unwrap(),
            Value::str("abab")
        );
        assert_eq!(
            binary(&Operator::Mult, &Value::list([Value::Int(1), Value::str("x")]), &Value::Int(2)).unwrap(),
            Value::list([Value::Int(1), Value::str("x"), Value::Int(1), Value::str("x")])
        );
        let err = binary(&Operator::Add, &Value::str("a"), &Value::Int(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert!(err.message.contains("'str' and 'int'"));
        assert_eq!(
            binary(&Operator::BitAnd, &Value::Float(1.0), &Value::Int(1)).unwrap_err().kind,
            ErrorKind::Type
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(compare(&CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(
            compare(&CmpOp::In, &Value::Int(2), &Value::list([Value::Int(1), Value::Int(2)])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(compare(&CmpOp::Is, &Value::None, &Value::None).unwrap(), Value::Bool(true));
        assert!(compare(&CmpOp::Lt, &Value::Int(1), &Value::str("a")).is_err());
    }

    #[test]
    fn test_subscript_and_item_assignment() {
        let list = Value::list([Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(subscript(&list, &Value::Int(-1)).unwrap(), Value::Int(3));
        assert_eq!(subscript(&list, &Value::Int(3)).unwrap_err().kind, ErrorKind::Index);

        let updated = set_item(list, Value::Int(0), Value::Int(9)).unwrap();
        assert_eq!(subscript(&updated, &Value::Int(0)).unwrap(), Value::Int(9));

        let dict = set_item(Value::dict([]), Value::str("k"), Value::Int(1)).unwrap();
        assert_eq!(subscript(&dict, &Value::str("k")).unwrap(), Value::Int(1));
        assert_eq!(subscript(&dict, &Value::str("z")).unwrap_err().kind, ErrorKind::Key);
    }
}
