//! Tree-walking evaluator for parsed chunks.

use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use tracing::trace;

use super::ast::{DeclKind, Expr, FunctionBody, Pattern, Property, Stmt, TemplatePart};
use super::host::Host;
use super::model::{OperationRecord, WorkbookModel};
use super::value::{Closure, Env, LookupError, Scope, Value};

/// Names that resolve to opaque host globals.
const GLOBALS: [&str; 22] = [
    "console", "Math", "JSON", "Object", "Array", "String", "Number", "Boolean", "Promise",
    "Date", "Error", "TypeError", "RangeError", "parseInt", "parseFloat", "isNaN", "isFinite",
    "Map", "Set", "setTimeout", "Office", "globalThis",
];

/// Non-local exits that unwind through expressions.
pub(crate) enum Interrupt {
    /// A catchable exception.
    Throw(Value),
    /// Execution stopped by the sandbox itself; `catch` does not see it.
    Halt(String),
}

pub(crate) type Exec<T> = Result<T, Interrupt>;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    pub max_steps: u64,
    pub max_depth: usize,
}

pub(crate) struct Interp {
    pub(super) model: WorkbookModel,
    pub(super) operations: Vec<OperationRecord>,
    pub(super) touched: Vec<String>,
    /// Old sheet name to new, so stale sheet handles keep working.
    pub(super) renamed: HashMap<String, String>,
    pub(super) steps: u64,
    budget: Budget,
    depth: usize,
    globals: Env,
    /// Every scope created, so closure cycles can be broken on drop.
    scopes: Vec<Weak<Scope>>,
}

impl Drop for Interp {
    fn drop(&mut self) {
        for scope in self.scopes.drain(..).filter_map(|w| w.upgrade()) {
            scope.clear();
        }
        self.globals.clear();
    }
}

pub(crate) fn error_value(name: &str, message: impl Into<String>) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), Value::str(name));
    fields.insert("message".to_string(), Value::str(message));
    Value::object(fields)
}

pub(crate) fn type_error(message: impl Into<String>) -> Interrupt {
    Interrupt::Throw(error_value("TypeError", message))
}

/// Host errors carry their code as the message prefix, `Code: text`.
pub(crate) fn host_error(message: impl Into<String>) -> Interrupt {
    let message = message.into();
    let name = message
        .split_once(':')
        .map_or("Error", |(code, _)| code)
        .to_string();
    Interrupt::Throw(error_value(&name, message))
}

/// The message reported for an uncaught exception.
pub(crate) fn describe_thrown(value: &Value) -> String {
    let Value::Object(fields) = value else {
        return format!("Uncaught {}", value.display());
    };
    let fields = fields.borrow();
    let message = fields.get("message").map(Value::display).unwrap_or_default();
    match fields.get("name").map(Value::display) {
        Some(name) if !message.starts_with(&name) => format!("{name}: {message}"),
        _ => message,
    }
}

/// Source-like text for a callee, used in `is not a function` messages.
pub(crate) fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident { name, .. } => name.clone(),
        Expr::Member { object, property, .. } => format!("{}.{property}", describe(object)),
        Expr::Index { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

impl Interp {
    pub(crate) fn new(model: WorkbookModel, budget: Budget) -> Self {
        let globals = Scope::root();
        globals.declare("Excel", Value::Host(Host::Excel), true);
        for name in GLOBALS {
            globals.declare(name, Value::Host(Host::Global(name)), true);
        }
        globals.declare("NaN", Value::Num(f64::NAN), true);
        globals.declare("Infinity", Value::Num(f64::INFINITY), true);
        Self {
            model,
            operations: Vec::new(),
            touched: Vec::new(),
            renamed: HashMap::new(),
            steps: 0,
            budget,
            depth: 0,
            globals,
            scopes: Vec::new(),
        }
    }

    /// Runs a whole program; `Err` carries the first uncaught error message.
    pub(crate) fn run(&mut self, program: &[Stmt]) -> Result<(), String> {
        let globals = Rc::clone(&self.globals);
        let env = self.child(&globals);
        match self.exec_block(program, &env) {
            Ok(_) => Ok(()),
            Err(Interrupt::Throw(v)) => Err(describe_thrown(&v)),
            Err(Interrupt::Halt(message)) => Err(message),
        }
    }

    pub(super) fn record(&mut self, op: OperationRecord) -> Exec<()> {
        let unresolved = op.kind.is_range_op() && op.address.is_none();
        if !unresolved {
            self.model.apply(&op).map_err(host_error)?;
        }
        if op.kind.is_range_op() && !unresolved {
            let qualified = op.qualified_address();
            if !self.touched.contains(&qualified) {
                self.touched.push(qualified);
            }
        }
        trace!(kind = op.kind.as_str(), sheet = %op.sheet, address = ?op.address, "operation recorded");
        self.operations.push(op);
        Ok(())
    }

    fn child(&mut self, parent: &Env) -> Env {
        let scope = Scope::child(parent);
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    pub(super) fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.budget.max_steps {
            return Err(Interrupt::Halt(format!(
                "Timeout: sandbox step budget of {} exhausted",
                self.budget.max_steps
            )));
        }
        Ok(())
    }

    // statements

    fn hoist(&mut self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Closure {
                        def: Rc::clone(def),
                        env: Rc::clone(env),
                    };
                    env.declare(name, Value::Function(Rc::new(closure)), false);
                }
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Exec<Flow> {
        self.hoist(stmts, env);
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Exec<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Decl { kind, decls } => {
                for (pattern, init) in decls {
                    let value = match init {
                        Some(e) => self.eval(e, env)?,
                        None => Value::Undefined,
                    };
                    self.bind(pattern, value, env, *kind == DeclKind::Const)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(e) => {
                self.eval(e, env)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                // an undecidable condition takes the `then` branch
                let taken = self.eval(test, env)?.truthy().unwrap_or(true);
                match (taken, otherwise) {
                    (true, _) => self.exec(then, env),
                    (false, Some(other)) => self.exec(other, env),
                    (false, None) => Ok(Flow::Normal),
                }
            }
            Stmt::Block(stmts) => {
                let scope = self.child(env);
                self.exec_block(stmts, &scope)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_env = self.child(env);
                if let Some(init) = init {
                    self.exec(init, &loop_env)?;
                }
                let mut first = true;
                loop {
                    let go = match test {
                        Some(t) => self.eval(t, &loop_env)?.truthy().unwrap_or(first),
                        None => true,
                    };
                    if !go {
                        break;
                    }
                    first = false;
                    let body_env = self.child(&loop_env);
                    match self.exec(body, &body_env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(u) = update {
                        self.eval(u, &loop_env)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                keys,
                body,
            } => {
                let source = self.eval(iterable, env)?;
                let items = self.iteration_items(&source, *keys)?;
                for item in items {
                    let iter_env = self.child(env);
                    self.bind(pattern, item, &iter_env, *kind == DeclKind::Const)?;
                    match self.exec(body, &iter_env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While {
                test,
                body,
                at_least_once,
            } => {
                let mut first = true;
                loop {
                    if !(first && *at_least_once) {
                        let go = self.eval(test, env)?.truthy().unwrap_or(first);
                        if !go {
                            break;
                        }
                    }
                    first = false;
                    let body_env = self.child(env);
                    match self.exec(body, &body_env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                let d = self.eval(discriminant, env)?;
                let mut start = None;
                for (i, (test, _)) in cases.iter().enumerate() {
                    if let Some(t) = test {
                        if self.eval(t, env)?.strict_equals(&d) {
                            start = Some(i);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|(t, _)| t.is_none()));
                let Some(start) = start else {
                    return Ok(Flow::Normal);
                };
                let case_env = self.child(env);
                for (_, body) in &cases[start..] {
                    match self.exec_block(body, &case_env)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let try_env = self.child(env);
                let mut outcome = self.exec_block(block, &try_env);
                if let Some(handler) = handler {
                    if let Err(Interrupt::Throw(thrown)) = outcome {
                        let catch_env = self.child(env);
                        if let Some(p) = param {
                            self.bind(p, thrown, &catch_env, false)?;
                        }
                        outcome = self.exec_block(handler, &catch_env);
                    }
                }
                if matches!(outcome, Err(Interrupt::Halt(_))) {
                    return outcome;
                }
                if let Some(finalizer) = finalizer {
                    let finally_env = self.child(env);
                    match self.exec_block(finalizer, &finally_env)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                outcome
            }
            Stmt::Throw(e) => Err(Interrupt::Throw(self.eval(e, env)?)),
            Stmt::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(v))
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn iteration_items(&mut self, source: &Value, keys: bool) -> Exec<Vec<Value>> {
        Ok(match (source, keys) {
            (Value::Array(items), false) => items.borrow().clone(),
            (Value::Array(items), true) => (0..items.borrow().len())
                .map(|i| Value::str(i.to_string()))
                .collect(),
            (Value::Str(s), false) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            (Value::Object(fields), true) => fields.borrow().keys().map(Value::str).collect(),
            (Value::Unknown | Value::Host(_), _) => vec![Value::Unknown],
            (v, false) => return Err(type_error(format!("{} is not iterable", v.display()))),
            (_, true) => Vec::new(),
        })
    }

    fn bind(&mut self, pattern: &Pattern, value: Value, env: &Env, constant: bool) -> Exec<()> {
        match pattern {
            Pattern::Ident(name) => {
                env.declare(name, value, constant);
                Ok(())
            }
            Pattern::Default(inner, default) => {
                let value = match value {
                    Value::Undefined => self.eval(default, env)?,
                    v => v,
                };
                self.bind(inner, value, env, constant)
            }
            Pattern::Rest(inner) => self.bind(inner, value, env, constant),
            Pattern::Array(items) => {
                let source = match &value {
                    Value::Array(a) => a.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    Value::Unknown => vec![Value::Unknown; items.len()],
                    other => {
                        return Err(type_error(format!("{} is not iterable", other.display())))
                    }
                };
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Some(Pattern::Rest(inner)) => {
                            let rest = source.get(i..).map(<[Value]>::to_vec).unwrap_or_default();
                            self.bind(inner, Value::array(rest), env, constant)?;
                        }
                        Some(p) => {
                            let v = source.get(i).cloned().unwrap_or(Value::Undefined);
                            self.bind(p, v, env, constant)?;
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            Pattern::Object(props) => {
                if value.is_nullish() {
                    return Err(type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.display(),
                        value.display()
                    )));
                }
                let mut used = Vec::new();
                for (key, p) in props {
                    if let Pattern::Rest(inner) = p {
                        let rest = match &value {
                            Value::Object(fields) => fields
                                .borrow()
                                .iter()
                                .filter(|(k, _)| !used.contains(*k))
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect(),
                            _ => BTreeMap::new(),
                        };
                        self.bind(inner, Value::object(rest), env, constant)?;
                        continue;
                    }
                    used.push(key.clone());
                    let v = self.get_property(&value, key)?;
                    self.bind(p, v, env, constant)?;
                }
                Ok(())
            }
        }
    }

    // expressions

    pub(super) fn eval(&mut self, expr: &Expr, env: &Env) -> Exec<Value> {
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(t) => out.push_str(t),
                        TemplatePart::Expr(e) => {
                            let v = self.eval(e, env)?;
                            if matches!(v, Value::Unknown) {
                                return Ok(Value::Unknown);
                            }
                            out.push_str(&v.display());
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Ident { name, .. } => {
                if name == "this" {
                    return Ok(Value::Undefined);
                }
                env.get(name)
                    .ok_or_else(|| reference_error(name))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Expr::Spread(inner) = item {
                        let v = self.eval(inner, env)?;
                        out.extend(self.iteration_items(&v, false)?);
                    } else {
                        out.push(self.eval(item, env)?);
                    }
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut fields = BTreeMap::new();
                for prop in props {
                    match prop {
                        Property::KeyValue(k, v) => {
                            let v = self.eval(v, env)?;
                            fields.insert(k.clone(), v);
                        }
                        Property::Computed(k, v) => {
                            let k = self.eval(k, env)?.display();
                            let v = self.eval(v, env)?;
                            fields.insert(k, v);
                        }
                        Property::Spread(e) => {
                            if let Value::Object(src) = self.eval(e, env)? {
                                let src = src.borrow();
                                fields.extend(src.iter().map(|(k, v)| (k.clone(), v.clone())));
                            }
                        }
                    }
                }
                Ok(Value::object(fields))
            }
            Expr::Spread(inner) => self.eval(inner, env),
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                let obj = self.eval(object, env)?;
                if *optional && obj.is_nullish() {
                    return Ok(Value::Undefined);
                }
                self.get_property(&obj, property)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                if matches!(key, Value::Unknown) {
                    return Ok(Value::Unknown);
                }
                self.get_property(&obj, &key.display())
            }
            Expr::Call { callee, args, .. } => self.eval_call(callee, args, env),
            Expr::New { callee, args, .. } => {
                let target = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.construct(&target, args, &describe(callee))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: Rc::clone(def),
                env: Rc::clone(env),
            }))),
            Expr::Unary { op, expr } => {
                if op == "typeof" {
                    if let Expr::Ident { name, .. } = expr.as_ref() {
                        if env.get(name).is_none() {
                            return Ok(Value::str("undefined"));
                        }
                    }
                }
                if op == "delete" {
                    return self.delete(expr, env);
                }
                let v = self.eval(expr, env)?;
                Ok(unary_op(op, &v))
            }
            Expr::Update {
                op,
                prefix,
                target,
                ..
            } => {
                let old = self.eval(target, env)?;
                if matches!(old, Value::Unknown) {
                    return Ok(Value::Unknown);
                }
                let n = old.to_number();
                let new = if op == "++" { n + 1.0 } else { n - 1.0 };
                self.assign_to(target, Value::Num(new), env)?;
                Ok(Value::Num(if *prefix { new } else { n }))
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                match op.as_str() {
                    "&&" => match l.truthy() {
                        Some(false) => Ok(l),
                        Some(true) => self.eval(right, env),
                        None => {
                            self.eval(right, env)?;
                            Ok(Value::Unknown)
                        }
                    },
                    "||" => match l.truthy() {
                        Some(true) => Ok(l),
                        Some(false) => self.eval(right, env),
                        None => {
                            self.eval(right, env)?;
                            Ok(Value::Unknown)
                        }
                    },
                    "??" => {
                        if l.is_nullish() {
                            self.eval(right, env)
                        } else {
                            Ok(l)
                        }
                    }
                    _ => {
                        let r = self.eval(right, env)?;
                        Ok(binary_op(op, &l, &r))
                    }
                }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => match self.eval(test, env)?.truthy() {
                Some(false) => self.eval(otherwise, env),
                Some(true) => self.eval(then, env),
                None => {
                    self.eval(then, env)?;
                    self.eval(otherwise, env)?;
                    Ok(Value::Unknown)
                }
            },
            Expr::Assign {
                op, target, value, ..
            } => {
                let v = match op.as_str() {
                    "=" => self.eval(value, env)?,
                    "??=" => {
                        let current = self.eval(target, env)?;
                        if !current.is_nullish() {
                            return Ok(current);
                        }
                        self.eval(value, env)?
                    }
                    compound => {
                        let current = self.eval(target, env)?;
                        let rhs = self.eval(value, env)?;
                        binary_op(&compound[..compound.len() - 1], &current, &rhs)
                    }
                };
                self.assign_to(target, v.clone(), env)?;
                Ok(v)
            }
            Expr::Await(inner) => self.eval(inner, env),
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, env)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Exec<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if let Expr::Spread(inner) = arg {
                let v = self.eval(inner, env)?;
                out.extend(self.iteration_items(&v, false)?);
            } else {
                out.push(self.eval(arg, env)?);
            }
        }
        Ok(out)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> Exec<Value> {
        self.tick()?;
        let desc = describe(callee);
        match callee {
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                let obj = self.eval(object, env)?;
                if *optional && obj.is_nullish() {
                    return Ok(Value::Undefined);
                }
                let args = self.eval_args(args, env)?;
                self.call_method(&obj, property, args, &desc)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                let args = self.eval_args(args, env)?;
                if matches!(key, Value::Unknown) {
                    return Ok(Value::Unknown);
                }
                self.call_method(&obj, &key.display(), args, &desc)
            }
            _ => {
                let f = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.call_value(&f, args, &desc)
            }
        }
    }

    pub(super) fn call_value(&mut self, f: &Value, args: Vec<Value>, desc: &str) -> Exec<Value> {
        match f {
            Value::Function(closure) => self.invoke(closure, args),
            Value::Host(Host::Global(name)) => self.call_global(name, None, args, desc),
            Value::Unknown => Ok(Value::Unknown),
            _ => Err(type_error(format!("{desc} is not a function"))),
        }
    }

    pub(super) fn call_method(
        &mut self,
        obj: &Value,
        name: &str,
        args: Vec<Value>,
        desc: &str,
    ) -> Exec<Value> {
        match obj {
            Value::Host(host) => self.host_call(host, name, args, desc),
            Value::Array(items) => self.array_method(items, name, args, desc),
            Value::Str(s) => Ok(string_method(s, name, &args)),
            Value::Num(n) => Ok(number_method(*n, name, &args)),
            Value::Undefined | Value::Null => Err(type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                obj.display()
            ))),
            Value::Object(_) => {
                if name == "hasOwnProperty" {
                    let key = args.first().map(Value::display).unwrap_or_default();
                    let Value::Object(fields) = obj else {
                        return Ok(Value::Bool(false));
                    };
                    return Ok(Value::Bool(fields.borrow().contains_key(&key)));
                }
                let f = self.get_property(obj, name)?;
                self.call_value(&f, args, desc)
            }
            Value::Function(_) | Value::Bool(_) | Value::Unknown => Ok(Value::Unknown),
        }
    }

    pub(super) fn invoke(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Exec<Value> {
        if self.depth >= self.budget.max_depth {
            return Err(Interrupt::Throw(error_value(
                "RangeError",
                "Maximum call stack size exceeded",
            )));
        }
        self.depth += 1;
        let result = self.invoke_inner(closure, args);
        self.depth -= 1;
        result
    }

    fn invoke_inner(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Exec<Value> {
        let env = self.child(&closure.env);
        for (i, param) in closure.def.params.iter().enumerate() {
            match param {
                Pattern::Rest(inner) => {
                    let rest = args.get(i..).map(<[Value]>::to_vec).unwrap_or_default();
                    self.bind(inner, Value::array(rest), &env, false)?;
                }
                p => {
                    let v = args.get(i).cloned().unwrap_or(Value::Undefined);
                    self.bind(p, v, &env, false)?;
                }
            }
        }
        match &closure.def.body {
            FunctionBody::Block(stmts) => match self.exec_block(stmts, &env)? {
                Flow::Return(v) => Ok(v),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(e) => self.eval(e, &env),
        }
    }

    pub(super) fn get_property(&mut self, obj: &Value, key: &str) -> Exec<Value> {
        Ok(match obj {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    obj.display()
                )))
            }
            Value::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    Value::Num(items.len() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(Value::Undefined)
                }
            }
            Value::Str(s) => {
                if key == "length" {
                    Value::Num(s.chars().count() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|i| s.chars().nth(i))
                        .map_or(Value::Undefined, |c| Value::str(c.to_string()))
                }
            }
            Value::Object(fields) => fields.borrow().get(key).cloned().unwrap_or(Value::Undefined),
            Value::Host(host) => return self.host_get(host, key),
            Value::Function(c) if key == "name" => {
                Value::str(c.def.name.clone().unwrap_or_default())
            }
            Value::Unknown => Value::Unknown,
            Value::Function(_) | Value::Bool(_) | Value::Num(_) => Value::Undefined,
        })
    }

    fn set_property(&mut self, obj: &Value, key: &str, value: Value) -> Exec<()> {
        match obj {
            Value::Object(fields) => {
                fields.borrow_mut().insert(key.to_string(), value);
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let n = value.to_number();
                    if n >= 0.0 && n.fract() == 0.0 {
                        items.resize(n as usize, Value::Undefined);
                    }
                } else if let Ok(i) = key.parse::<usize>() {
                    if i >= items.len() {
                        if i > items.len() + 100_000 {
                            return Err(type_error("array index out of sandbox bounds"));
                        }
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
            }
            Value::Host(host) => self.host_set(host, key, value)?,
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot set properties of {} (setting '{key}')",
                    obj.display()
                )))
            }
            _ => {}
        }
        Ok(())
    }

    fn assign_to(&mut self, target: &Expr, value: Value, env: &Env) -> Exec<()> {
        match target {
            Expr::Ident { name, .. } => env.set(name, value).map_err(|e| match e {
                LookupError::Undeclared => reference_error(name),
                LookupError::Constant => type_error("Assignment to constant variable."),
            }),
            Expr::Member { object, property, .. } => {
                let obj = self.eval(object, env)?;
                self.set_property(&obj, property, value)
            }
            Expr::Index { object, index, .. } => {
                let obj = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                if matches!(key, Value::Unknown) {
                    return Ok(());
                }
                self.set_property(&obj, &key.display(), value)
            }
            Expr::Array(items) => {
                let source = self.iteration_items(&value, false)?;
                for (i, item) in items.iter().enumerate() {
                    let v = source.get(i).cloned().unwrap_or(Value::Undefined);
                    self.assign_to(item, v, env)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn delete(&mut self, target: &Expr, env: &Env) -> Exec<Value> {
        let (object, key) = match target {
            Expr::Member { object, property, .. } => (object, property.clone()),
            Expr::Index { object, index, .. } => {
                let key = self.eval(index, env)?.display();
                (object, key)
            }
            _ => return Ok(Value::Bool(true)),
        };
        if let Value::Object(fields) = self.eval(object, env)? {
            fields.borrow_mut().remove(&key);
        }
        Ok(Value::Bool(true))
    }
}

fn reference_error(name: &str) -> Interrupt {
    Interrupt::Throw(error_value("ReferenceError", format!("{name} is not defined")))
}

fn unary_op(op: &str, v: &Value) -> Value {
    if matches!(v, Value::Unknown) && op != "typeof" && op != "void" {
        return Value::Unknown;
    }
    match op {
        "!" => Value::Bool(!v.truthy().unwrap_or(true)),
        "-" => Value::Num(-v.to_number()),
        "+" => Value::Num(v.to_number()),
        "~" => Value::Num(f64::from(!(v.to_number() as i64 as i32))),
        "typeof" => Value::str(v.type_of()),
        _ => Value::Undefined,
    }
}

pub(super) fn binary_op(op: &str, l: &Value, r: &Value) -> Value {
    if matches!(l, Value::Unknown) || matches!(r, Value::Unknown) {
        return Value::Unknown;
    }
    let int = |v: &Value| v.to_number() as i64 as i32;
    match op {
        "+" => match (l, r) {
            (Value::Num(_) | Value::Bool(_) | Value::Null | Value::Undefined, Value::Num(_) | Value::Bool(_) | Value::Null | Value::Undefined) => {
                Value::Num(l.to_number() + r.to_number())
            }
            _ => Value::Str(format!("{}{}", l.display(), r.display())),
        },
        "-" => Value::Num(l.to_number() - r.to_number()),
        "*" => Value::Num(l.to_number() * r.to_number()),
        "/" => Value::Num(l.to_number() / r.to_number()),
        "%" => Value::Num(l.to_number() % r.to_number()),
        "**" => Value::Num(l.to_number().powf(r.to_number())),
        "===" => Value::Bool(l.strict_equals(r)),
        "!==" => Value::Bool(!l.strict_equals(r)),
        "==" => Value::Bool(l.loose_equals(r)),
        "!=" => Value::Bool(!l.loose_equals(r)),
        "<" | ">" | "<=" | ">=" => {
            let ord = match (l, r) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            Value::Bool(ord.is_some_and(|o| match op {
                "<" => o.is_lt(),
                ">" => o.is_gt(),
                "<=" => o.is_le(),
                _ => o.is_ge(),
            }))
        }
        "&" => Value::Num(f64::from(int(l) & int(r))),
        "|" => Value::Num(f64::from(int(l) | int(r))),
        "^" => Value::Num(f64::from(int(l) ^ int(r))),
        "<<" => Value::Num(f64::from(int(l).wrapping_shl(int(r) as u32 & 31))),
        ">>" => Value::Num(f64::from(int(l).wrapping_shr(int(r) as u32 & 31))),
        "in" => match r {
            Value::Object(fields) => Value::Bool(fields.borrow().contains_key(&l.display())),
            _ => Value::Bool(false),
        },
        _ => Value::Bool(false),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Value {
    let arg_str = |i: usize| args.get(i).map(Value::display).unwrap_or_default();
    let arg_num = |i: usize, default: f64| args.get(i).map_or(default, Value::to_number);
    let chars: Vec<char> = s.chars().collect();
    let clamp = |n: f64| -> usize {
        if n < 0.0 {
            (chars.len() as f64 + n).max(0.0) as usize
        } else {
            (n as usize).min(chars.len())
        }
    };
    match name {
        "toUpperCase" => Value::str(s.to_uppercase()),
        "toLowerCase" => Value::str(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "toString" | "valueOf" => Value::str(s),
        "includes" => Value::Bool(s.contains(&arg_str(0))),
        "startsWith" => Value::Bool(s.starts_with(&arg_str(0))),
        "endsWith" => Value::Bool(s.ends_with(&arg_str(0))),
        "indexOf" => Value::Num(s.find(&arg_str(0)).map_or(-1.0, |i| s[..i].chars().count() as f64)),
        "charAt" => Value::str(chars.get(arg_num(0, 0.0) as usize).map(char::to_string).unwrap_or_default()),
        "repeat" => Value::str(s.repeat(arg_num(0, 0.0).clamp(0.0, 10_000.0) as usize)),
        "concat" => Value::str(format!("{s}{}", args.iter().map(Value::display).collect::<String>())),
        "split" => match args.first() {
            None | Some(Value::Undefined) => Value::array(vec![Value::str(s)]),
            Some(sep) => {
                let sep = sep.display();
                let parts: Vec<Value> = if sep.is_empty() {
                    chars.iter().map(|c| Value::str(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(Value::str).collect()
                };
                Value::array(parts)
            }
        },
        "replace" => Value::str(s.replacen(&arg_str(0), &arg_str(1), 1)),
        "replaceAll" => Value::str(s.replace(&arg_str(0), &arg_str(1))),
        "slice" | "substring" => {
            let start = clamp(arg_num(0, 0.0));
            let end = clamp(arg_num(1, chars.len() as f64));
            let (a, b) = if name == "substring" && start > end { (end, start) } else { (start, end) };
            Value::str(chars.get(a..b.max(a)).map(|c| c.iter().collect::<String>()).unwrap_or_default())
        }
        "padStart" | "padEnd" => {
            let width = arg_num(0, 0.0).clamp(0.0, 10_000.0) as usize;
            let fill = args.get(1).map_or_else(|| " ".to_string(), Value::display);
            if chars.len() >= width || fill.is_empty() {
                return Value::str(s);
            }
            let pad: String = fill.chars().cycle().take(width - chars.len()).collect();
            Value::str(if name == "padStart" { format!("{pad}{s}") } else { format!("{s}{pad}") })
        }
        "localeCompare" => Value::Num(match s.cmp(arg_str(0).as_str()) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        }),
        _ => Value::Unknown,
    }
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Value {
    match name {
        "toFixed" => {
            let digits = args.first().map_or(0.0, Value::to_number).clamp(0.0, 20.0) as usize;
            Value::str(format!("{n:.digits$}"))
        }
        "toString" | "toLocaleString" | "valueOf" => Value::str(Value::Num(n).display()),
        _ => Value::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_coerces_like_the_host() {
        assert_eq!(binary_op("+", &Value::Num(1.0), &Value::Num(2.0)).display(), "3");
        assert_eq!(binary_op("+", &Value::str("A"), &Value::Num(2.0)).display(), "A2");
        assert!(matches!(binary_op("*", &Value::Unknown, &Value::Num(2.0)), Value::Unknown));
    }

    #[test]
    fn string_helpers() {
        assert_eq!(string_method("abc", "toUpperCase", &[]).display(), "ABC");
        assert_eq!(string_method("7", "padStart", &[Value::Num(3.0), Value::str("0")]).display(), "007");
        assert_eq!(string_method("a,b", "split", &[Value::str(",")]).display(), "a,b");
        assert_eq!(number_method(2.5, "toFixed", &[Value::Num(2.0)]).display(), "2.50");
    }

    #[test]
    fn uncaught_messages() {
        assert_eq!(describe_thrown(&error_value("TypeError", "x is not a function")), "TypeError: x is not a function");
        assert_eq!(
            describe_thrown(&error_value("ItemNotFound", "ItemNotFound: gone")),
            "ItemNotFound: gone"
        );
    }
}
