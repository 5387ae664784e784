use assert_cmd::Command;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    std::io::Write::write_all(&mut f, contents.as_bytes()).expect("write");
    f
}

fn wrapped(body: &str) -> String {
    format!(
        "await Excel.run(async (context) => {{\n    const sheet = context.workbook.worksheets.getActiveWorksheet();\n{body}\n    await context.sync();\n}});\n"
    )
}

fn gridsmith() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("gridsmith"))
}

#[test]
fn validate_returns_0_for_clean_chunk() {
    let f = write_temp(&wrapped(r#"    sheet.getRange("A1:B1").values = [["Year", "Revenue"]];"#));
    gridsmith()
        .args(["validate", f.path().to_string_lossy().as_ref()])
        .assert()
        .success();
}

#[test]
fn validate_returns_2_without_wrapper() {
    let f = write_temp("const sheet = context.workbook.worksheets.getActiveWorksheet();\n");
    gridsmith()
        .args(["validate", f.path().to_string_lossy().as_ref()])
        .assert()
        .code(2);
}

#[test]
fn validate_json_lists_fixable_issues() {
    let f = write_temp(&wrapped(r#"    sheet.getRange("A1:C1").values = ["a", "b", "c"];"#));
    let out = gridsmith()
        .args(["validate", f.path().to_string_lossy().as_ref(), "--format", "json"])
        .output()
        .expect("run");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["valid"], true);
    assert_eq!(v["fixableIssues"].as_array().map(Vec::len), Some(1));
}

#[test]
fn missing_file_is_a_runtime_error() {
    gridsmith()
        .args(["validate", "/definitely/not/here.js"])
        .assert()
        .code(4);
}

#[test]
fn correct_write_rewrites_the_file() {
    let f = write_temp(&wrapped(r#"    sheet.getRange("A1:C1").values = ["a", "b", "c"];"#));
    gridsmith()
        .args(["correct", f.path().to_string_lossy().as_ref(), "--write", "--quiet"])
        .assert()
        .success();
    let rewritten = std::fs::read_to_string(f.path()).expect("read");
    assert!(rewritten.contains(r#"[["a", "b", "c"]]"#), "{rewritten}");
}

#[test]
fn simulate_reports_dimension_failure() {
    let f = write_temp(&wrapped(r#"    sheet.getRange("A1:C1").values = ["a", "b", "c"];"#));
    let out = gridsmith()
        .args(["simulate", f.path().to_string_lossy().as_ref(), "--format", "json"])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(3));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["success"], false);
}

#[test]
fn simulate_seeds_named_sheets() {
    let src = "await Excel.run(async (context) => {\n    const s = context.workbook.worksheets.getItem(\"Data\");\n    s.getRange(\"A1\").values = [[1]];\n    await context.sync();\n});\n";
    let f = write_temp(src);
    gridsmith()
        .args(["simulate", f.path().to_string_lossy().as_ref(), "--sheet", "Data"])
        .assert()
        .success();
}
