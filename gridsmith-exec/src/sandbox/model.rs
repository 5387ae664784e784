//! In-memory workbook shared by the sandbox and the bundled real target.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gridsmith_core::{CellRef, RangeAddress, ScriptLimits};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::shape::check_bulk_shape;

/// Broadcast writes larger than this are recorded but not expanded per cell.
const MAX_EXPANDED_CELLS: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SetValues,
    SetFormulas,
    SetNumberFormat,
    SetFormat,
    AddSheet,
    DeleteSheet,
    RenameSheet,
    ActivateSheet,
    Merge,
    Unmerge,
    Clear,
    AddTable,
    FreezeRows,
    FreezeColumns,
    Autofit,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SetValues => "set_values",
            OperationKind::SetFormulas => "set_formulas",
            OperationKind::SetNumberFormat => "set_number_format",
            OperationKind::SetFormat => "set_format",
            OperationKind::AddSheet => "add_sheet",
            OperationKind::DeleteSheet => "delete_sheet",
            OperationKind::RenameSheet => "rename_sheet",
            OperationKind::ActivateSheet => "activate_sheet",
            OperationKind::Merge => "merge",
            OperationKind::Unmerge => "unmerge",
            OperationKind::Clear => "clear",
            OperationKind::AddTable => "add_table",
            OperationKind::FreezeRows => "freeze_rows",
            OperationKind::FreezeColumns => "freeze_columns",
            OperationKind::Autofit => "autofit",
        }
    }

    /// Operations that target a range rather than a whole sheet.
    pub fn is_range_op(&self) -> bool {
        !matches!(
            self,
            OperationKind::AddSheet
                | OperationKind::DeleteSheet
                | OperationKind::RenameSheet
                | OperationKind::ActivateSheet
                | OperationKind::FreezeRows
                | OperationKind::FreezeColumns
        )
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub sheet: String,
    /// Local A1 address; `None` for sheet-level operations or addresses that
    /// could not be resolved statically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl OperationRecord {
    pub fn new(kind: OperationKind, sheet: impl Into<String>, address: Option<String>, payload: Value) -> Self {
        Self {
            kind,
            sheet: sheet.into(),
            address,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// `Sheet1!A1:B2`, `'My Sheet'!A1`, or just the sheet name.
    pub fn qualified_address(&self) -> String {
        match self.address.as_deref().map(RangeAddress::parse) {
            Some(Ok(mut addr)) => {
                addr.sheet = Some(self.sheet.clone());
                addr.to_string()
            }
            Some(Err(_)) | None => self.sheet.clone(),
        }
    }
}

/// Read-only view of the document handed to the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub sheets: Vec<SheetSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sheet: Option<String>,
}

impl DocumentSnapshot {
    pub fn sheet(&self, name: &str) -> Option<&SheetSnapshot> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_range: Option<String>,
    /// Constant cell values keyed by local A1 address.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub formulas: BTreeMap<String, String>,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub frozen_rows: u32,
    #[serde(default)]
    pub frozen_columns: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Cell {
    value: Value,
    formula: Option<String>,
    number_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetModel {
    name: String,
    cells: BTreeMap<CellRef, Cell>,
    formats: BTreeMap<String, BTreeMap<String, Value>>,
    merged: Vec<String>,
    tables: Vec<String>,
    frozen_rows: u32,
    frozen_columns: u32,
}

impl SheetModel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bounding box of every populated cell.
    pub fn used_range(&self) -> Option<RangeAddress> {
        let mut cells = self.cells.keys();
        let first = *cells.next()?;
        let (mut top, mut left, mut bottom, mut right) = (first.row, first.col, first.row, first.col);
        for c in cells {
            top = top.min(c.row);
            left = left.min(c.col);
            bottom = bottom.max(c.row);
            right = right.max(c.col);
        }
        Some(RangeAddress::new(CellRef::new(top, left), CellRef::new(bottom, right)))
    }

    pub fn value(&self, cell: &str) -> Option<&Value> {
        let cell = CellRef::parse(cell).ok()?;
        self.cells.get(&cell).map(|c| &c.value)
    }

    pub fn formula(&self, cell: &str) -> Option<&str> {
        let cell = CellRef::parse(cell).ok()?;
        self.cells.get(&cell)?.formula.as_deref()
    }

    pub fn format(&self, address: &str, property: &str) -> Option<&Value> {
        self.formats.get(address)?.get(property)
    }

    fn snapshot(&self) -> SheetSnapshot {
        let mut values = BTreeMap::new();
        let mut formulas = BTreeMap::new();
        for (at, cell) in &self.cells {
            if let Some(f) = &cell.formula {
                formulas.insert(at.to_string(), f.clone());
            } else if !cell.value.is_null() {
                values.insert(at.to_string(), cell.value.clone());
            }
        }
        SheetSnapshot {
            name: self.name.clone(),
            used_range: self.used_range().map(|r| r.local()),
            values,
            formulas,
            tables: self.tables.clone(),
            frozen_rows: self.frozen_rows,
            frozen_columns: self.frozen_columns,
        }
    }

    fn from_snapshot(s: &SheetSnapshot) -> Self {
        let mut sheet = Self::new(&s.name);
        for (at, v) in &s.values {
            if let Ok(cell) = CellRef::parse(at) {
                sheet.cells.entry(cell).or_default().value = v.clone();
            }
        }
        for (at, f) in &s.formulas {
            if let Ok(cell) = CellRef::parse(at) {
                sheet.cells.entry(cell).or_default().formula = Some(f.clone());
            }
        }
        sheet.tables = s.tables.clone();
        sheet.frozen_rows = s.frozen_rows;
        sheet.frozen_columns = s.frozen_columns;
        sheet
    }

    fn write(&mut self, kind: OperationKind, target: &RangeAddress, value: &Value) {
        if target.cell_count() > MAX_EXPANDED_CELLS {
            return;
        }
        for (i, cell) in target.cells().enumerate() {
            let r = i / target.cols() as usize;
            let c = i % target.cols() as usize;
            let v = match value {
                Value::Array(rows) => rows
                    .get(r)
                    .and_then(|row| row.as_array())
                    .and_then(|row| row.get(c))
                    .cloned()
                    .unwrap_or(Value::Null),
                scalar => scalar.clone(),
            };
            let entry = self.cells.entry(cell).or_default();
            match kind {
                OperationKind::SetNumberFormat => entry.number_format = v.as_str().map(str::to_string),
                _ => match v.as_str() {
                    Some(s) if s.starts_with('=') => {
                        entry.formula = Some(s.to_string());
                        entry.value = Value::Null;
                    }
                    _ => {
                        entry.formula = None;
                        entry.value = v;
                    }
                },
            }
        }
    }

    fn clear(&mut self, target: &RangeAddress) {
        self.cells.retain(|at, _| !target.contains(*at));
        let local = target.local();
        self.formats.remove(&local);
    }
}

/// Workbook state: an ordered list of sheets and the active one.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookModel {
    sheets: Vec<SheetModel>,
    active: usize,
    limits: ScriptLimits,
}

impl Default for WorkbookModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookModel {
    /// A fresh workbook with a single empty `Sheet1`.
    pub fn new() -> Self {
        Self {
            sheets: vec![SheetModel::new("Sheet1")],
            active: 0,
            limits: ScriptLimits::default(),
        }
    }

    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Self {
        if snapshot.sheets.is_empty() {
            return Self::new();
        }
        let sheets: Vec<SheetModel> = snapshot.sheets.iter().map(SheetModel::from_snapshot).collect();
        let active = snapshot
            .active_sheet
            .as_deref()
            .and_then(|name| sheets.iter().position(|s| s.name.eq_ignore_ascii_case(name)))
            .unwrap_or(0);
        Self {
            sheets,
            active,
            limits: ScriptLimits::default(),
        }
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            sheets: self.sheets.iter().map(SheetModel::snapshot).collect(),
            active_sheet: self.sheets.get(self.active).map(|s| s.name.clone()),
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetModel> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn active_sheet(&self) -> &str {
        self.sheets.get(self.active).map_or("Sheet1", |s| s.name.as_str())
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut SheetModel, String> {
        self.sheets
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| not_found(name))
    }

    /// Applies one recorded operation. Errors carry host-style messages.
    pub fn apply(&mut self, op: &OperationRecord) -> Result<(), String> {
        let target = op
            .address
            .as_deref()
            .map(RangeAddress::parse)
            .transpose()
            .map_err(|e| format!("InvalidArgument: {e}"))?;
        let value = op.payload.get("value").cloned().unwrap_or(Value::Null);
        match op.kind {
            OperationKind::AddSheet => {
                if let Some(problem) = self.limits.sheet_name_problem(&op.sheet) {
                    return Err(format!(
                        "InvalidArgument: The sheet name '{}' is invalid: it {problem}.",
                        op.sheet
                    ));
                }
                if self.has_sheet(&op.sheet) {
                    return Err(format!(
                        "ItemAlreadyExists: A worksheet named '{}' already exists.",
                        op.sheet
                    ));
                }
                self.sheets.push(SheetModel::new(&op.sheet));
            }
            OperationKind::DeleteSheet => {
                let idx = self.index_of(&op.sheet)?;
                if self.sheets.len() == 1 {
                    return Err("InvalidOperation: A workbook must contain at least one visible worksheet.".to_string());
                }
                self.sheets.remove(idx);
                if self.active >= self.sheets.len() || self.active == idx {
                    self.active = 0;
                }
            }
            OperationKind::RenameSheet => {
                let new_name = value.as_str().unwrap_or_default().to_string();
                if let Some(problem) = self.limits.sheet_name_problem(&new_name) {
                    return Err(format!(
                        "InvalidArgument: The sheet name '{new_name}' is invalid: it {problem}."
                    ));
                }
                let idx = self.index_of(&op.sheet)?;
                let clash = self
                    .sheets
                    .iter()
                    .enumerate()
                    .any(|(i, s)| i != idx && s.name.eq_ignore_ascii_case(&new_name));
                if clash {
                    return Err(format!(
                        "ItemAlreadyExists: A worksheet named '{new_name}' already exists."
                    ));
                }
                self.sheets[idx].name = new_name;
            }
            OperationKind::ActivateSheet => {
                self.active = self.index_of(&op.sheet)?;
            }
            OperationKind::SetValues | OperationKind::SetFormulas | OperationKind::SetNumberFormat => {
                let target = target.ok_or_else(|| unresolved(op))?;
                let property = op.payload.get("property").and_then(Value::as_str).unwrap_or("values");
                check_bulk_shape(property, &value, Some(&target)).map_err(|e| e.to_string())?;
                self.sheet_mut(&op.sheet)?.write(op.kind, &target, &value);
            }
            OperationKind::SetFormat | OperationKind::Autofit | OperationKind::Merge | OperationKind::Unmerge => {
                let local = target.map_or_else(|| "*".to_string(), |t| t.local());
                let property = op
                    .payload
                    .get("property")
                    .and_then(Value::as_str)
                    .unwrap_or(op.kind.as_str())
                    .to_string();
                let sheet = self.sheet_mut(&op.sheet)?;
                match op.kind {
                    OperationKind::Merge => sheet.merged.push(local),
                    OperationKind::Unmerge => sheet.merged.retain(|m| *m != local),
                    _ => {
                        sheet.formats.entry(local).or_default().insert(property, value);
                    }
                }
            }
            OperationKind::Clear => {
                let target = target.ok_or_else(|| unresolved(op))?;
                self.sheet_mut(&op.sheet)?.clear(&target);
            }
            OperationKind::AddTable => {
                let local = target.map_or_else(String::new, |t| t.local());
                self.sheet_mut(&op.sheet)?.tables.push(local);
            }
            OperationKind::FreezeRows => {
                self.sheet_mut(&op.sheet)?.frozen_rows = value.as_u64().unwrap_or(0) as u32;
            }
            OperationKind::FreezeColumns => {
                self.sheet_mut(&op.sheet)?.frozen_columns = value.as_u64().unwrap_or(0) as u32;
            }
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize, String> {
        self.sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| not_found(name))
    }
}

pub(crate) fn not_found(sheet: &str) -> String {
    format!("ItemNotFound: The requested resource doesn't exist. Worksheet '{sheet}' was not found.")
}

fn unresolved(op: &OperationRecord) -> String {
    format!("InvalidArgument: {} needs a range address", op.kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: OperationKind, sheet: &str, address: Option<&str>, payload: Value) -> OperationRecord {
        OperationRecord::new(kind, sheet, address.map(str::to_string), payload)
    }

    #[test]
    fn writes_grid_and_snapshots() {
        let mut wb = WorkbookModel::new();
        wb.apply(&op(
            OperationKind::SetValues,
            "Sheet1",
            Some("B2:C3"),
            json!({ "property": "values", "value": [["Year", "Revenue"], [2024, "=B3*2"]] }),
        ))
        .unwrap();
        let sheet = wb.sheet("sheet1").unwrap();
        assert_eq!(sheet.value("B2"), Some(&json!("Year")));
        assert_eq!(sheet.formula("C3"), Some("=B3*2"));
        assert_eq!(sheet.used_range().unwrap().local(), "B2:C3");

        let snap = wb.snapshot();
        assert_eq!(snap.sheets[0].used_range.as_deref(), Some("B2:C3"));
        assert_eq!(WorkbookModel::from_snapshot(&snap).snapshot(), snap);
    }

    #[test]
    fn duplicate_and_missing_sheets_fail() {
        let mut wb = WorkbookModel::new();
        wb.apply(&op(OperationKind::AddSheet, "Model", None, json!({}))).unwrap();
        let dup = wb.apply(&op(OperationKind::AddSheet, "model", None, json!({}))).unwrap_err();
        assert!(dup.starts_with("ItemAlreadyExists"));
        let missing = wb
            .apply(&op(OperationKind::ActivateSheet, "Nope", None, json!({})))
            .unwrap_err();
        assert!(missing.starts_with("ItemNotFound"));
    }

    #[test]
    fn shape_rule_applies_on_replay() {
        let mut wb = WorkbookModel::new();
        let err = wb
            .apply(&op(
                OperationKind::SetValues,
                "Sheet1",
                Some("A1:B1"),
                json!({ "property": "values", "value": ["a", "b"] }),
            ))
            .unwrap_err();
        assert!(err.contains("2D array"));
    }

    #[test]
    fn qualified_addresses() {
        let r = op(OperationKind::SetFormat, "My Sheet", Some("A1:B2"), json!({}));
        assert_eq!(r.qualified_address(), "'My Sheet'!A1:B2");
        let s = op(OperationKind::AddSheet, "Data", None, json!({}));
        assert_eq!(s.qualified_address(), "Data");
    }
}
