use gridsmith_core::validate::{detect_dialect, Dialect};
use gridsmith_core::{validate, ValidationPolicy, Validator, ScriptLimits};

fn wrapped(body: &str) -> String {
    format!("await Excel.run(async (context) => {{\n{body}\n    await context.sync();\n}});")
}

#[test]
fn clean_chunk_is_valid() {
    let src = wrapped(
        "    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1:B2\").values = [[\"Year\", \"Revenue\"], [2024, 1200]];",
    );
    let report = validate(&src);
    assert!(report.is_valid(), "{report:?}");
    assert!(report.fixable_issues.is_empty());
    assert!(report.warnings.is_empty());
}

#[test]
fn missing_wrapper_is_an_error() {
    let report = validate("const sheet = context.workbook.worksheets.getActiveWorksheet();");
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|e| e.contains("wrapper")));
}

#[test]
fn forbidden_api_carries_line_and_hint() {
    let src = wrapped("    const r = await fetch(\"https://example.com\");");
    let report = validate(&src);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Line 2:"));
    assert!(report.errors[0].contains("network access is blocked"));
}

#[test]
fn scalar_assignment_is_one_fixable_issue() {
    let src = wrapped("    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1\").values = \"x\";");
    let report = validate(&src);
    assert!(report.is_valid());
    assert_eq!(report.fixable_issues.len(), 1);
    assert!(report.fixable_issues[0].starts_with("Line 3:"));
}

#[test]
fn one_fixable_issue_per_one_level_assignment() {
    let src = wrapped(
        "    const s = context.workbook.worksheets.getActiveWorksheet();\n    s.getRange(\"A1:C1\").values = [\"a\", \"b\", \"c\"];\n    s.getRange(\"A2:B2\").formulas = [\"=1\", \"=2\"];\n    s.getRange(\"A3:B3\").values = [[1, 2]];",
    );
    let report = validate(&src);
    assert_eq!(report.fixable_issues.len(), 2, "{report:?}");
}

#[test]
fn uncalled_routine_is_fixable_not_an_error() {
    let src = wrapped("    async function buildModel() {\n        context.workbook.worksheets.add(\"Model\");\n    }");
    let report = validate(&src);
    assert!(report.is_valid());
    assert_eq!(report.fixable_issues.len(), 1);
    assert!(report.fixable_issues[0].contains("`buildModel`"));
}

#[test]
fn routine_called_or_passed_is_not_flagged() {
    let called = wrapped("    const paint = (r) => { r.format.fill.color = \"#fff\"; };\n    paint(context.workbook.getSelectedRange());");
    assert!(validate(&called).fixable_issues.is_empty());
    let passed = wrapped("    function style(r) { }\n    [].forEach(style);");
    assert!(validate(&passed).fixable_issues.is_empty());
}

#[test]
fn dimension_mismatch_is_a_warning() {
    let src = wrapped("    context.workbook.worksheets.getActiveWorksheet().getRange(\"A1:C2\").values = [[1, 2]];");
    let report = validate(&src);
    assert!(report.is_valid());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("A1:C2 is 2x3"));

    let policy = ValidationPolicy {
        cross_check_dimensions: false,
        ..ValidationPolicy::default()
    };
    let quiet = Validator::new(policy, ScriptLimits::default()).validate(&src);
    assert!(quiet.warnings.is_empty());
}

#[test]
fn whole_column_targets_are_not_cross_checked() {
    let src = wrapped("    context.workbook.worksheets.getActiveWorksheet().getRange(\"A:A\").numberFormat = [[\"0.00\"]];");
    assert!(validate(&src).warnings.is_empty());
}

#[test]
fn bad_sheet_names_and_huge_ranges_are_fixable() {
    let src = wrapped(
        "    const s = context.workbook.worksheets.add(\"Q1/Q2 [draft]\");\n    s.getRange(\"A1:A50000\").format.fill.color = \"#eee\";",
    );
    let report = validate(&src);
    assert!(report.is_valid());
    assert_eq!(report.fixable_issues.len(), 2, "{report:?}");
}

#[test]
fn unbalanced_source_is_a_syntax_error() {
    let report = validate("await Excel.run(async (context) => {\n    await context.sync();\n");
    assert!(report.errors.iter().any(|e| e.contains("Unbalanced")));
}

#[test]
fn absurdly_nested_literal_is_reported_not_overflowed() {
    let src = wrapped(&format!(
        "    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1\").values = {}1{};",
        "[".repeat(50_000),
        "]".repeat(50_000)
    ));
    let report = validate(&src);
    assert!(report.is_valid(), "{report:?}");
    assert!(report.fixable_issues.is_empty());
}

#[test]
fn foreign_dialects_are_detected() {
    let office = gridsmith_core::script::Script::new("function main(workbook: ExcelScript.Workbook) {}");
    assert_eq!(detect_dialect(&office), Some(Dialect::OfficeScripts));
    let apps = gridsmith_core::script::Script::new("SpreadsheetApp.getActiveSheet();");
    assert_eq!(detect_dialect(&apps), Some(Dialect::AppsScript));
    assert!(!validate("SpreadsheetApp.getActiveSheet();").is_valid());
}

#[test]
fn sync_in_loop_is_a_performance_warning() {
    let src = wrapped("    for (const n of [1, 2]) {\n        await context.sync();\n    }");
    let report = validate(&src);
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|w| w.starts_with("Line 3:") && w.contains("loop")));
}

#[test]
fn suggestions_never_affect_validity() {
    let report = validate(&wrapped("    context.workbook.worksheets.getActiveWorksheet();"));
    assert!(report.is_valid());
    assert!(!report.suggestions.is_empty());
}

#[test]
fn report_serializes_camel_case() {
    let json = serde_json::to_value(validate("x = 1;")).unwrap();
    assert!(json.get("fixableIssues").is_some());
}
