use serde::Serialize;

use crate::script::Script;
use crate::validate::validator::Findings;

/// Sibling scripting surfaces that generated code sometimes drifts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `function main(workbook: ExcelScript.Workbook)`.
    OfficeScripts,
    /// `SpreadsheetApp.getActiveSpreadsheet()`.
    AppsScript,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::OfficeScripts => "Office Scripts",
            Dialect::AppsScript => "Google Apps Script",
        }
    }
}

pub fn detect_dialect(script: &Script) -> Option<Dialect> {
    let tokens = &script.tokens;
    if tokens.iter().any(|t| t.is_ident("ExcelScript")) {
        Some(Dialect::OfficeScripts)
    } else if tokens.iter().any(|t| t.is_ident("SpreadsheetApp")) {
        Some(Dialect::AppsScript)
    } else {
        None
    }
}

pub(crate) fn check(f: &mut Findings) {
    if let Some(dialect) = detect_dialect(&f.script) {
        f.push_error(format!(
            "{} API detected; chunks must use the Office.js Excel.run(async (context) => {{ ... }}) API",
            dialect.as_str()
        ));
    }
}
