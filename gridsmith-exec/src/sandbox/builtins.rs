//! Array methods and the handful of global functions generated chunks use.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::host::Host;
use super::interp::{error_value, type_error, Exec, Interp, Interrupt};
use super::value::Value;

const MAX_ARRAY_LEN: usize = 100_000;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Resolves a possibly negative `slice` index against `len`.
fn relative_index(v: &Value, len: usize, default: usize) -> usize {
    match v {
        Value::Undefined => default,
        v => {
            let n = v.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn math(method: &str, args: &[Value]) -> Value {
    if args.iter().any(|a| matches!(a, Value::Unknown)) {
        return Value::Unknown;
    }
    let n = |i: usize| args.get(i).map_or(f64::NAN, Value::to_number);
    Value::Num(match method {
        "max" => args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, f64::max),
        "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min),
        "abs" => n(0).abs(),
        "round" => (n(0) + 0.5).floor(),
        "floor" => n(0).floor(),
        "ceil" => n(0).ceil(),
        "trunc" => n(0).trunc(),
        "sign" => n(0).signum(),
        "sqrt" => n(0).sqrt(),
        "pow" => n(0).powf(n(1)),
        "log" => n(0).ln(),
        "exp" => n(0).exp(),
        _ => return Value::Unknown,
    })
}

fn parse_number_prefix(text: &str, integer: bool) -> f64 {
    let t = text.trim_start();
    let mut end = 0;
    for (i, c) in t.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (!integer && (c == '.' || c == 'e' || c == 'E'));
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    let mut candidate = &t[..end];
    // back off until the prefix parses, e.g. "1e" -> "1"
    while !candidate.is_empty() {
        if let Ok(v) = candidate.parse::<f64>() {
            return if integer { v.trunc() } else { v };
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

impl Interp {
    pub(super) fn array_method(
        &mut self,
        items: &Rc<RefCell<Vec<Value>>>,
        name: &str,
        args: Vec<Value>,
        desc: &str,
    ) -> Exec<Value> {
        let this = Value::Array(Rc::clone(items));
        let snapshot = items.borrow().clone();
        let callback = arg(&args, 0);
        let each = |interp: &mut Interp, i: usize, v: &Value| {
            interp.call_value(&callback, vec![v.clone(), Value::Num(i as f64), this.clone()], desc)
        };
        Ok(match name {
            "push" => {
                let mut items = items.borrow_mut();
                if items.len() + args.len() > MAX_ARRAY_LEN {
                    return Err(error_range("Invalid array length"));
                }
                items.extend(args);
                Value::Num(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            }
            "unshift" => {
                let mut items = items.borrow_mut();
                for (i, v) in args.into_iter().enumerate() {
                    items.insert(i, v);
                }
                Value::Num(items.len() as f64)
            }
            "forEach" => {
                for (i, v) in snapshot.iter().enumerate() {
                    each(self, i, v)?;
                }
                Value::Undefined
            }
            "map" => {
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, v) in snapshot.iter().enumerate() {
                    out.push(each(self, i, v)?);
                }
                Value::array(out)
            }
            "filter" => {
                let mut out = Vec::new();
                for (i, v) in snapshot.iter().enumerate() {
                    if each(self, i, v)?.truthy().unwrap_or(true) {
                        out.push(v.clone());
                    }
                }
                Value::array(out)
            }
            "find" | "findIndex" => {
                let mut found = None;
                for (i, v) in snapshot.iter().enumerate() {
                    match each(self, i, v)?.truthy() {
                        Some(true) => {
                            found = Some((i, v.clone()));
                            break;
                        }
                        Some(false) => {}
                        None => return Ok(Value::Unknown),
                    }
                }
                match (name, found) {
                    ("find", Some((_, v))) => v,
                    ("find", None) => Value::Undefined,
                    (_, Some((i, _))) => Value::Num(i as f64),
                    (_, None) => Value::Num(-1.0),
                }
            }
            "some" | "every" => {
                let want = name == "some";
                let mut unknown = false;
                for (i, v) in snapshot.iter().enumerate() {
                    match each(self, i, v)?.truthy() {
                        Some(b) if b == want => return Ok(Value::Bool(want)),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    Value::Unknown
                } else {
                    Value::Bool(!want)
                }
            }
            "reduce" => {
                let mut iter = snapshot.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(type_error("Reduce of empty array with no initial value"))
                        }
                    },
                };
                for (i, v) in iter {
                    acc = self.call_value(
                        &callback,
                        vec![acc, v.clone(), Value::Num(i as f64), this.clone()],
                        desc,
                    )?;
                }
                acc
            }
            "join" => {
                let sep = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(s) => s.display(),
                };
                Value::str(
                    snapshot
                        .iter()
                        .map(|v| if v.is_nullish() { String::new() } else { v.display() })
                        .collect::<Vec<_>>()
                        .join(&sep),
                )
            }
            "toString" => Value::str(this.display()),
            "slice" => {
                let start = relative_index(&arg(&args, 0), snapshot.len(), 0);
                let end = relative_index(&arg(&args, 1), snapshot.len(), snapshot.len());
                Value::array(snapshot.get(start..end.max(start)).map(<[Value]>::to_vec).unwrap_or_default())
            }
            "concat" => {
                let mut out = snapshot;
                for a in args {
                    match a {
                        Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                Value::array(out)
            }
            "includes" => Value::Bool(snapshot.iter().any(|v| v.strict_equals(&callback))),
            "indexOf" => Value::Num(
                snapshot
                    .iter()
                    .position(|v| v.strict_equals(&callback))
                    .map_or(-1.0, |i| i as f64),
            ),
            "entries" => Value::array(
                snapshot
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::array(vec![Value::Num(i as f64), v]))
                    .collect(),
            ),
            "keys" => Value::array((0..snapshot.len()).map(|i| Value::Num(i as f64)).collect()),
            "values" => Value::array(snapshot),
            "fill" => {
                for slot in items.borrow_mut().iter_mut() {
                    *slot = callback.clone();
                }
                this
            }
            "reverse" => {
                items.borrow_mut().reverse();
                this
            }
            "flat" => {
                let mut out = Vec::new();
                for v in snapshot {
                    match v {
                        Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                Value::array(out)
            }
            "sort" => {
                let mut sorted = snapshot;
                if matches!(callback, Value::Undefined) {
                    sorted.sort_by_key(Value::display);
                } else {
                    // insertion sort so the comparator can raise
                    for i in 1..sorted.len() {
                        let mut j = i;
                        while j > 0 {
                            let order = self
                                .call_value(&callback, vec![sorted[j - 1].clone(), sorted[j].clone()], desc)?
                                .to_number();
                            if order > 0.0 {
                                sorted.swap(j - 1, j);
                                j -= 1;
                            } else {
                                break;
                            }
                        }
                    }
                }
                *items.borrow_mut() = sorted;
                this
            }
            _ => return Err(type_error(format!("{desc} is not a function"))),
        })
    }

    /// Calls a global, either directly (`parseInt(x)`) or as a namespace
    /// method (`Math.max(...)`).
    pub(super) fn call_global(
        &mut self,
        name: &str,
        method: Option<&str>,
        args: Vec<Value>,
        desc: &str,
    ) -> Exec<Value> {
        let first = arg(&args, 0);
        Ok(match (name, method) {
            ("console", _) => Value::Undefined,
            ("Math", Some(m)) => math(m, &args),
            ("JSON", Some("stringify")) => match first {
                Value::Unknown => Value::Unknown,
                v => serde_json::to_string(&v.to_json()).map_or(Value::Unknown, Value::Str),
            },
            ("JSON", Some("parse")) => match first {
                Value::Str(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Value::from_json(&json),
                    Err(e) => {
                        return Err(Interrupt::Throw(error_value(
                            "SyntaxError",
                            e.to_string(),
                        )))
                    }
                },
                _ => Value::Unknown,
            },
            ("Object", Some(m @ ("keys" | "values" | "entries"))) => match first {
                Value::Object(fields) => {
                    let fields = fields.borrow();
                    Value::array(
                        fields
                            .iter()
                            .map(|(k, v)| match m {
                                "keys" => Value::str(k.clone()),
                                "values" => v.clone(),
                                _ => Value::array(vec![Value::str(k.clone()), v.clone()]),
                            })
                            .collect(),
                    )
                }
                Value::Array(items) => {
                    let items = items.borrow();
                    Value::array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, v)| match m {
                                "keys" => Value::str(i.to_string()),
                                "values" => v.clone(),
                                _ => Value::array(vec![Value::str(i.to_string()), v.clone()]),
                            })
                            .collect(),
                    )
                }
                Value::Undefined | Value::Null => {
                    return Err(type_error("Cannot convert undefined or null to object"))
                }
                _ => Value::Unknown,
            },
            ("Object", Some("assign")) => {
                if let Value::Object(target) = &first {
                    for source in args.iter().skip(1) {
                        if let Value::Object(src) = source {
                            let src = src.borrow().clone();
                            target.borrow_mut().extend(src);
                        }
                    }
                }
                first
            }
            ("Object", Some("freeze")) | ("Promise", Some("resolve" | "all" | "allSettled")) => first,
            ("Array", Some("isArray")) => Value::Bool(matches!(first, Value::Array(_))),
            ("Array", Some("of")) => Value::array(args),
            ("Array", Some("from")) => {
                let source = match &first {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    Value::Object(fields) => {
                        let len = fields.borrow().get("length").map_or(0.0, Value::to_number);
                        if !(0.0..=MAX_ARRAY_LEN as f64).contains(&len) {
                            return Err(error_range("Invalid array length"));
                        }
                        vec![Value::Undefined; len as usize]
                    }
                    _ => return Ok(Value::Unknown),
                };
                match args.get(1) {
                    Some(f @ Value::Function(_)) => {
                        let mut out = Vec::with_capacity(source.len());
                        for (i, v) in source.into_iter().enumerate() {
                            out.push(self.call_value(f, vec![v, Value::Num(i as f64)], desc)?);
                        }
                        Value::array(out)
                    }
                    _ => Value::array(source),
                }
            }
            ("Number", Some("isInteger")) => Value::Bool(matches!(first, Value::Num(n) if n.fract() == 0.0)),
            ("Number", Some("isFinite")) => Value::Bool(matches!(first, Value::Num(n) if n.is_finite())),
            ("Number", Some("isNaN")) => Value::Bool(matches!(first, Value::Num(n) if n.is_nan())),
            ("Number", Some("parseFloat")) | ("parseFloat", None) => {
                Value::Num(parse_number_prefix(&first.display(), false))
            }
            ("Number", Some("parseInt")) | ("parseInt", None) => {
                Value::Num(parse_number_prefix(&first.display(), true))
            }
            (_, None) if matches!(first, Value::Unknown) => Value::Unknown,
            ("String", None) => Value::str(match first {
                Value::Undefined if args.is_empty() => String::new(),
                v => v.display(),
            }),
            ("Number", None) => Value::Num(first.to_number()),
            ("Boolean", None) => Value::Bool(first.truthy().unwrap_or(true)),
            ("isNaN", None) => Value::Bool(first.to_number().is_nan()),
            ("isFinite", None) => Value::Bool(first.to_number().is_finite()),
            ("Error" | "TypeError" | "RangeError", None) => error_value(name, first.display()),
            ("setTimeout", None) => Value::Num(0.0),
            _ => Value::Unknown,
        })
    }

    pub(super) fn construct(&mut self, target: &Value, args: Vec<Value>, desc: &str) -> Exec<Value> {
        self.tick()?;
        Ok(match target {
            Value::Host(Host::Global(name @ ("Error" | "TypeError" | "RangeError"))) => {
                let message = args.first().map(Value::display).unwrap_or_default();
                error_value(name, message)
            }
            Value::Host(Host::Global("Array")) => match args.as_slice() {
                [Value::Num(n)] => {
                    if n.fract() != 0.0 || *n < 0.0 || *n > MAX_ARRAY_LEN as f64 {
                        return Err(error_range("Invalid array length"));
                    }
                    Value::array(vec![Value::Undefined; *n as usize])
                }
                _ => Value::array(args),
            },
            Value::Host(Host::Global("Object")) => Value::object(BTreeMap::new()),
            Value::Host(Host::Global(_)) | Value::Unknown => Value::Unknown,
            Value::Function(closure) => match self.invoke(closure, args)? {
                v @ (Value::Object(_) | Value::Array(_)) => v,
                _ => Value::object(BTreeMap::new()),
            },
            _ => return Err(type_error(format!("{desc} is not a constructor"))),
        })
    }
}

fn error_range(message: &str) -> Interrupt {
    Interrupt::Throw(error_value("RangeError", message))
}
