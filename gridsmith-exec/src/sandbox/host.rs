//! The spreadsheet object model as seen from inside the sandbox.

use gridsmith_core::{CellRef, RangeAddress};
use serde_json::json;

use super::interp::{host_error, type_error, Exec, Interp};
use super::model::{not_found, OperationKind, OperationRecord};
use super::shape::check_bulk_shape;
use super::value::Value;

/// Host handles. Sheets are held by name and looked up on every use so a
/// deleted sheet fails the same way it would on the real target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Host {
    Excel,
    Context,
    Workbook,
    Worksheets,
    Sheet(String),
    /// Result of an `...OrNullObject` lookup that found nothing.
    NullObject(String),
    Range {
        sheet: String,
        /// Local address; `None` when it cannot be computed statically.
        address: Option<String>,
    },
    Format {
        sheet: String,
        address: Option<String>,
        /// `""`, `fill`, `font`, `borders`, `borders.EdgeTop`, ...
        path: String,
    },
    Tables(String),
    Table,
    FreezePanes(String),
    Global(&'static str),
}

const BULK_PROPERTIES: [&str; 3] = ["values", "formulas", "numberFormat"];

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn index_arg(args: &[Value], i: usize) -> Option<i64> {
    match args.get(i)? {
        Value::Num(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

fn invalid_argument(detail: &str) -> String {
    format!("InvalidArgument: The argument is invalid or missing or has an incorrect format. {detail}")
}

fn range(sheet: &str, address: Option<RangeAddress>) -> Value {
    Value::Host(Host::Range {
        sheet: sheet.to_string(),
        address: address.map(|a| a.local()),
    })
}

impl Interp {
    /// Current name of a sheet handle, following renames.
    fn resolve_sheet(&self, name: &str) -> String {
        let mut current = name.to_string();
        for _ in 0..16 {
            if self.model.has_sheet(&current) {
                break;
            }
            match self.renamed.get(&current.to_lowercase()) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    fn live_sheet(&self, name: &str) -> Exec<String> {
        let name = self.resolve_sheet(name);
        match self.model.sheet(&name) {
            Some(sheet) => Ok(sheet.name().to_string()),
            None => Err(host_error(not_found(&name))),
        }
    }

    pub(super) fn host_get(&mut self, host: &Host, key: &str) -> Exec<Value> {
        Ok(match host {
            Host::Context => match key {
                "workbook" => Value::Host(Host::Workbook),
                _ => Value::Unknown,
            },
            Host::Workbook => match key {
                "worksheets" => Value::Host(Host::Worksheets),
                _ => Value::Unknown,
            },
            Host::Worksheets => match key {
                "items" => Value::array(
                    self.model
                        .sheet_names()
                        .into_iter()
                        .map(|n| Value::Host(Host::Sheet(n)))
                        .collect(),
                ),
                "count" => Value::Num(self.model.sheet_names().len() as f64),
                _ => Value::Unknown,
            },
            Host::Sheet(name) => {
                let name = self.live_sheet(name)?;
                match key {
                    "name" => Value::Str(name),
                    "tables" => Value::Host(Host::Tables(name)),
                    "freezePanes" => Value::Host(Host::FreezePanes(name)),
                    "isNullObject" => Value::Bool(false),
                    "position" => Value::Num(
                        self.model
                            .sheet_names()
                            .iter()
                            .position(|n| *n == name)
                            .unwrap_or(0) as f64,
                    ),
                    _ => Value::Unknown,
                }
            }
            Host::NullObject(_) => match key {
                "isNullObject" => Value::Bool(true),
                _ => Value::Unknown,
            },
            Host::Range { sheet, address } => self.range_get(sheet, address.as_deref(), key)?,
            Host::Format {
                sheet,
                address,
                path,
            } => match (path.as_str(), key) {
                ("", "fill" | "font" | "borders" | "protection") => Value::Host(Host::Format {
                    sheet: sheet.clone(),
                    address: address.clone(),
                    path: key.to_string(),
                }),
                _ => Value::Unknown,
            },
            Host::Global("Math") => match key {
                "PI" => Value::Num(std::f64::consts::PI),
                "E" => Value::Num(std::f64::consts::E),
                _ => Value::Unknown,
            },
            Host::Excel
            | Host::Tables(_)
            | Host::Table
            | Host::FreezePanes(_)
            | Host::Global(_) => Value::Unknown,
        })
    }

    fn range_get(&mut self, sheet: &str, address: Option<&str>, key: &str) -> Exec<Value> {
        let sheet = self.live_sheet(sheet)?;
        let parsed = address.and_then(|a| RangeAddress::parse(a).ok());
        Ok(match (key, &parsed) {
            ("format", _) => Value::Host(Host::Format {
                sheet,
                address: address.map(str::to_string),
                path: String::new(),
            }),
            ("worksheet", _) => Value::Host(Host::Sheet(sheet)),
            ("isNullObject", _) => Value::Bool(false),
            ("address", Some(a)) => {
                let mut a = a.clone();
                a.sheet = Some(sheet);
                Value::str(a.to_string())
            }
            ("rowCount", Some(a)) => Value::Num(f64::from(a.rows())),
            ("columnCount", Some(a)) => Value::Num(f64::from(a.cols())),
            ("cellCount", Some(a)) => Value::Num(a.cell_count() as f64),
            ("rowIndex", Some(a)) => Value::Num(f64::from(a.start.row - 1)),
            ("columnIndex", Some(a)) => Value::Num(f64::from(a.start.col - 1)),
            ("values" | "text" | "formulas", Some(a)) if a.cell_count() <= 10_000 => {
                let model = self.model.sheet(&sheet);
                let mut rows = Vec::with_capacity(a.rows() as usize);
                for r in 0..a.rows() {
                    let mut row = Vec::with_capacity(a.cols() as usize);
                    for c in 0..a.cols() {
                        let at = CellRef::new(a.start.row + r, a.start.col + c).to_string();
                        let formula = (key == "formulas")
                            .then(|| model.and_then(|s| s.formula(&at)))
                            .flatten();
                        let v = match formula {
                            Some(f) => Value::str(f),
                            None => model
                                .and_then(|s| s.value(&at))
                                .map_or(Value::str(""), Value::from_json),
                        };
                        row.push(match (key, v) {
                            (_, Value::Null) => Value::str(""),
                            ("text", v) => Value::Str(v.display()),
                            (_, v) => v,
                        });
                    }
                    rows.push(Value::array(row));
                }
                Value::array(rows)
            }
            _ => Value::Unknown,
        })
    }

    pub(super) fn host_set(&mut self, host: &Host, key: &str, value: Value) -> Exec<()> {
        match host {
            Host::Range { sheet, address } if BULK_PROPERTIES.contains(&key) => {
                let sheet = self.live_sheet(sheet)?;
                self.bulk_write(&sheet, address.as_deref(), key, &value)
            }
            Host::Range { .. } => Ok(()),
            Host::Format {
                sheet,
                address,
                path,
            } => {
                let sheet = self.live_sheet(sheet)?;
                let property = if path.is_empty() {
                    key.to_string()
                } else {
                    format!("{path}.{key}")
                };
                self.record(OperationRecord::new(
                    OperationKind::SetFormat,
                    sheet,
                    address.clone(),
                    json!({ "property": property, "value": value.to_json() }),
                ))
            }
            Host::Sheet(name) => {
                let name = self.live_sheet(name)?;
                match key {
                    "name" => {
                        let new_name = value.display();
                        self.record(OperationRecord::new(
                            OperationKind::RenameSheet,
                            name.clone(),
                            None,
                            json!({ "value": new_name }),
                        ))?;
                        self.renamed.insert(name.to_lowercase(), new_name);
                        Ok(())
                    }
                    "tabColor" | "visibility" | "position" | "showGridlines" => {
                        self.record(OperationRecord::new(
                            OperationKind::SetFormat,
                            name,
                            None,
                            json!({ "property": key, "value": value.to_json() }),
                        ))
                    }
                    _ => Ok(()),
                }
            }
            Host::NullObject(name) => Err(host_error(not_found(name))),
            _ => Ok(()),
        }
    }

    fn bulk_write(&mut self, sheet: &str, address: Option<&str>, property: &str, value: &Value) -> Exec<()> {
        let json = value.to_json();
        let target = address.and_then(|a| RangeAddress::parse(a).ok());
        // rows computed by opaque calls cannot be shape-checked
        let decidable = match value {
            Value::Array(rows) => !rows.borrow().iter().any(|r| matches!(r, Value::Unknown)),
            other => !matches!(other, Value::Unknown),
        };
        if decidable {
            check_bulk_shape(property, &json, target.as_ref())
                .map_err(|e| host_error(e.to_string()))?;
        }
        let kind = match property {
            "formulas" => OperationKind::SetFormulas,
            "numberFormat" => OperationKind::SetNumberFormat,
            _ => OperationKind::SetValues,
        };
        self.record(OperationRecord::new(
            kind,
            sheet,
            target.map(|t| t.local()),
            json!({ "property": property, "value": json }),
        ))
    }

    pub(super) fn host_call(&mut self, host: &Host, method: &str, args: Vec<Value>, desc: &str) -> Exec<Value> {
        if method == "load" || method == "track" || method == "untrack" {
            return Ok(Value::Undefined);
        }
        match host {
            Host::Excel => match method {
                "run" => {
                    let Some(callback) = args.iter().rev().find(|a| matches!(a, Value::Function(_))) else {
                        return Err(type_error("Excel.run expects a batch function"));
                    };
                    let callback = callback.clone();
                    self.call_value(&callback, vec![Value::Host(Host::Context)], desc)
                }
                _ => Err(type_error(format!("{desc} is not a function"))),
            },
            Host::Context => match method {
                "sync" => Ok(Value::Undefined),
                _ => Err(type_error(format!("{desc} is not a function"))),
            },
            Host::Workbook => match method {
                "getActiveCell" | "getSelectedRange" => {
                    Ok(range(self.model.active_sheet(), None))
                }
                _ => Err(type_error(format!("{desc} is not a function"))),
            },
            Host::Worksheets => self.worksheets_call(method, &args, desc),
            Host::Sheet(name) => {
                let name = self.live_sheet(name)?;
                self.sheet_call(&name, method, &args, desc)
            }
            Host::NullObject(name) => Err(host_error(not_found(name))),
            Host::Range { sheet, address } => {
                let sheet = self.live_sheet(sheet)?;
                let parsed = address.as_deref().and_then(|a| RangeAddress::parse(a).ok());
                self.range_call(&sheet, parsed, method, &args, desc)
            }
            Host::Format {
                sheet,
                address,
                path,
            } => match (path.as_str(), method) {
                ("", "autofitColumns" | "autofitRows") => {
                    let sheet = self.live_sheet(sheet)?;
                    self.record(OperationRecord::new(
                        OperationKind::Autofit,
                        sheet,
                        address.clone(),
                        json!({ "property": method }),
                    ))?;
                    Ok(Value::Undefined)
                }
                ("borders", "getItem") => Ok(Value::Host(Host::Format {
                    sheet: sheet.clone(),
                    address: address.clone(),
                    path: format!("borders.{}", arg(&args, 0).display()),
                })),
                _ => Err(type_error(format!("{desc} is not a function"))),
            },
            Host::Tables(sheet) => match method {
                "add" => {
                    let sheet = self.live_sheet(sheet)?;
                    let target = match arg(&args, 0) {
                        Value::Str(a) => {
                            let parsed = RangeAddress::parse(&a).map_err(|e| host_error(invalid_argument(&e.to_string())))?;
                            Some(parsed.local())
                        }
                        _ => None,
                    };
                    self.record(OperationRecord::new(
                        OperationKind::AddTable,
                        sheet,
                        target,
                        json!({ "hasHeaders": arg(&args, 1).to_json() }),
                    ))?;
                    Ok(Value::Host(Host::Table))
                }
                "getItem" | "getItemOrNullObject" => Ok(Value::Host(Host::Table)),
                _ => Ok(Value::Unknown),
            },
            Host::Table => Ok(Value::Unknown),
            Host::FreezePanes(sheet) => {
                let sheet = self.live_sheet(sheet)?;
                let (kind, count) = match method {
                    "freezeRows" => (OperationKind::FreezeRows, arg(&args, 0)),
                    "freezeColumns" => (OperationKind::FreezeColumns, arg(&args, 0)),
                    "unfreeze" => (OperationKind::FreezeRows, Value::Num(0.0)),
                    "freezeAt" => return Ok(Value::Undefined),
                    _ => return Err(type_error(format!("{desc} is not a function"))),
                };
                self.record(OperationRecord::new(kind, sheet.clone(), None, json!({ "value": count.to_json() })))?;
                if method == "unfreeze" {
                    self.record(OperationRecord::new(OperationKind::FreezeColumns, sheet, None, json!({ "value": 0 })))?;
                }
                Ok(Value::Undefined)
            }
            Host::Global(name) => self.call_global(name, Some(method), args, desc),
        }
    }

    fn worksheets_call(&mut self, method: &str, args: &[Value], desc: &str) -> Exec<Value> {
        match method {
            "getActiveWorksheet" => Ok(Value::Host(Host::Sheet(self.model.active_sheet().to_string()))),
            "getFirst" | "getLast" => {
                let names = self.model.sheet_names();
                let pick = if method == "getFirst" { names.first() } else { names.last() };
                Ok(pick.map_or(Value::Undefined, |n| Value::Host(Host::Sheet(n.clone()))))
            }
            "getItem" | "getItemOrNullObject" => {
                let Value::Str(name) = arg(args, 0) else {
                    return Ok(Value::Unknown);
                };
                match self.model.sheet(&name) {
                    Some(sheet) => Ok(Value::Host(Host::Sheet(sheet.name().to_string()))),
                    None if method == "getItemOrNullObject" => Ok(Value::Host(Host::NullObject(name))),
                    None => Err(host_error(not_found(&name))),
                }
            }
            "add" => {
                let name = match arg(args, 0) {
                    Value::Undefined => {
                        let existing = self.model.sheet_names();
                        (existing.len() + 1..)
                            .map(|n| format!("Sheet{n}"))
                            .find(|n| !self.model.has_sheet(n))
                            .unwrap_or_else(|| "Sheet".to_string())
                    }
                    Value::Unknown => return Ok(Value::Unknown),
                    v => v.display(),
                };
                self.record(OperationRecord::new(OperationKind::AddSheet, name.clone(), None, json!({})))?;
                Ok(Value::Host(Host::Sheet(name)))
            }
            "getCount" => Ok(Value::Num(self.model.sheet_names().len() as f64)),
            _ => Err(type_error(format!("{desc} is not a function"))),
        }
    }

    fn sheet_call(&mut self, sheet: &str, method: &str, args: &[Value], desc: &str) -> Exec<Value> {
        match method {
            "getRange" => match arg(args, 0) {
                Value::Undefined | Value::Unknown => Ok(range(sheet, None)),
                v => {
                    let text = v.display();
                    let parsed = RangeAddress::parse(&text)
                        .map_err(|e| host_error(invalid_argument(&e.to_string())))?;
                    let on = match &parsed.sheet {
                        Some(other) => self.live_sheet(other)?,
                        None => sheet.to_string(),
                    };
                    Ok(range(&on, Some(parsed)))
                }
            },
            "getRangeByIndexes" => {
                let idx: Option<Vec<i64>> = (0..4).map(|i| index_arg(args, i)).collect();
                let Some(idx) = idx else {
                    return Ok(range(sheet, None));
                };
                if idx[0] < 0 || idx[1] < 0 || idx[2] < 1 || idx[3] < 1 {
                    return Err(host_error(invalid_argument("getRangeByIndexes needs non-negative indexes and positive counts")));
                }
                let start = RangeAddress::cell(CellRef::new(idx[0] as u32 + 1, idx[1] as u32 + 1));
                let target = start
                    .resize(idx[2] - 1, idx[3] - 1)
                    .ok_or_else(|| host_error(invalid_argument("the range is outside the worksheet")))?;
                Ok(range(sheet, Some(target)))
            }
            "getCell" => match (index_arg(args, 0), index_arg(args, 1)) {
                (Some(r), Some(c)) if r >= 0 && c >= 0 => {
                    Ok(range(sheet, Some(RangeAddress::cell(CellRef::new(r as u32 + 1, c as u32 + 1)))))
                }
                (Some(_), Some(_)) => Err(host_error(invalid_argument("getCell needs non-negative indexes"))),
                _ => Ok(range(sheet, None)),
            },
            "getUsedRange" | "getUsedRangeOrNullObject" => {
                let used = self.model.sheet(sheet).and_then(|s| s.used_range());
                match used {
                    Some(u) => Ok(range(sheet, Some(u))),
                    None if method == "getUsedRangeOrNullObject" => {
                        Ok(Value::Host(Host::NullObject(sheet.to_string())))
                    }
                    None => Ok(range(sheet, Some(RangeAddress::cell(CellRef::new(1, 1))))),
                }
            }
            "activate" => {
                self.record(OperationRecord::new(OperationKind::ActivateSheet, sheet, None, json!({})))?;
                Ok(Value::Undefined)
            }
            "delete" => {
                self.record(OperationRecord::new(OperationKind::DeleteSheet, sheet, None, json!({})))?;
                Ok(Value::Undefined)
            }
            "calculate" => Ok(Value::Undefined),
            _ => Err(type_error(format!("{desc} is not a function"))),
        }
    }

    fn range_call(
        &mut self,
        sheet: &str,
        target: Option<RangeAddress>,
        method: &str,
        args: &[Value],
        desc: &str,
    ) -> Exec<Value> {
        let outside = || host_error(invalid_argument("the resulting range is outside the worksheet"));
        match method {
            "getCell" | "getOffsetRange" | "getResizedRange" | "getRow" | "getColumn"
            | "getLastRow" | "getLastColumn" | "getLastCell" => {
                let Some(t) = target else {
                    return Ok(range(sheet, None));
                };
                let a = index_arg(args, 0);
                let b = index_arg(args, 1);
                let next = match method {
                    "getCell" => match (a, b) {
                        (Some(r), Some(c)) => RangeAddress::cell(t.start).offset(r, c),
                        _ => return Ok(range(sheet, None)),
                    },
                    "getOffsetRange" => match (a, b) {
                        (Some(r), Some(c)) => t.offset(r, c),
                        _ => return Ok(range(sheet, None)),
                    },
                    "getResizedRange" => match (a, b) {
                        (Some(r), Some(c)) => t.resize(r, c),
                        _ => return Ok(range(sheet, None)),
                    },
                    "getRow" => match a {
                        Some(r) if (0..i64::from(t.rows())).contains(&r) => {
                            let row = t.start.row + r as u32;
                            Some(RangeAddress::new(CellRef::new(row, t.start.col), CellRef::new(row, t.end.col)))
                        }
                        Some(_) => None,
                        None => return Ok(range(sheet, None)),
                    },
                    "getColumn" => match a {
                        Some(c) if (0..i64::from(t.cols())).contains(&c) => {
                            let col = t.start.col + c as u32;
                            Some(RangeAddress::new(CellRef::new(t.start.row, col), CellRef::new(t.end.row, col)))
                        }
                        Some(_) => None,
                        None => return Ok(range(sheet, None)),
                    },
                    "getLastRow" => Some(RangeAddress::new(CellRef::new(t.end.row, t.start.col), t.end)),
                    "getLastColumn" => Some(RangeAddress::new(CellRef::new(t.start.row, t.end.col), t.end)),
                    _ => Some(RangeAddress::cell(t.end)),
                };
                next.map(|n| range(sheet, Some(n))).ok_or_else(outside)
            }
            "getEntireRow" | "getEntireColumn" | "getIntersection" | "getBoundingRect"
            | "getUsedRange" | "getUsedRangeOrNullObject" => Ok(range(sheet, None)),
            "merge" | "unmerge" | "clear" => {
                let kind = match method {
                    "merge" => OperationKind::Merge,
                    "unmerge" => OperationKind::Unmerge,
                    _ => OperationKind::Clear,
                };
                self.record(OperationRecord::new(
                    kind,
                    sheet,
                    target.map(|t| t.local()),
                    json!({ "value": arg(args, 0).to_json() }),
                ))?;
                Ok(Value::Undefined)
            }
            "set" => {
                let Value::Object(fields) = arg(args, 0) else {
                    return Ok(Value::Undefined);
                };
                let host = Host::Range {
                    sheet: sheet.to_string(),
                    address: target.map(|t| t.local()),
                };
                let fields: Vec<(String, Value)> =
                    fields.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                for (k, v) in fields {
                    self.host_set(&host, &k, v)?;
                }
                Ok(Value::Undefined)
            }
            "select" | "calculate" | "showCard" => Ok(Value::Undefined),
            _ => Err(type_error(format!("{desc} is not a function"))),
        }
    }
}
