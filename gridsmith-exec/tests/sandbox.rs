use gridsmith_core::{classify_error, ErrorFamily};
use gridsmith_exec::sandbox::{
    DocumentSnapshot, OperationKind, Sandbox, SandboxConfig, SheetSnapshot,
};
use gridsmith_exec::{MemoryTarget, SnapshotProvider, TargetError, TargetRuntime};
use serde_json::json;

fn wrapped(body: &str) -> String {
    format!(
        "await Excel.run(async (context) => {{\n  const sheet = context.workbook.worksheets.getActiveWorksheet();\n{body}\n  await context.sync();\n}});\n"
    )
}

#[test]
fn records_writes_in_order() {
    let source = r#"
await Excel.run(async (context) => {
  const sheet = context.workbook.worksheets.add("Model");
  sheet.getRange("A1:B2").values = [[1, 2], [3, 4]];
  sheet.getRange("C1").formulas = [["=SUM(A1:B2)"]];
  sheet.getRange("A1:B1").format.font.bold = true;
  await context.sync();
});
"#;
    let report = Sandbox::new().simulate(source);
    assert!(report.success, "{:?}", report.errors);
    let kinds: Vec<OperationKind> = report.operations.iter().map(|o| o.kind).collect();
    assert_eq!(
        kinds,
        [
            OperationKind::AddSheet,
            OperationKind::SetValues,
            OperationKind::SetFormulas,
            OperationKind::SetFormat,
        ]
    );
    assert_eq!(report.operations[1].payload["value"], json!([[1, 2], [3, 4]]));
    assert_eq!(report.ranges_touched[0], "Model!A1:B2");
    assert!(report.ranges_touched.contains(&"Model!C1".to_string()));
}

#[test]
fn one_level_array_raises_dimension_error() {
    let report = Sandbox::new().simulate(&wrapped(r#"  sheet.getRange("A1:C1").values = ["a", "b", "c"];"#));
    assert!(!report.success);
    let message = report.first_error().unwrap();
    assert_eq!(classify_error(message), ErrorFamily::Dimension, "{message}");
}

#[test]
fn mismatched_rectangle_raises_dimension_error() {
    let report = Sandbox::new().simulate(&wrapped(r#"  sheet.getRange("A1:B2").values = [[1, 2, 3]];"#));
    assert!(!report.success);
    assert!(report.first_error().unwrap().contains("doesn't match"));
}

#[test]
fn scalar_write_is_broadcast() {
    let report = Sandbox::new().simulate(&wrapped(r#"  sheet.getRange("A1").values = "x";"#));
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.operations.len(), 1);
}

#[test]
fn missing_sheet_fails_like_the_host() {
    let report = Sandbox::new().simulate(&wrapped(
        r#"  const data = context.workbook.worksheets.getItem("Data");
  data.getRange("A1").values = [[1]];"#,
    ));
    assert!(!report.success);
    assert_eq!(classify_error(report.first_error().unwrap()), ErrorFamily::SheetName);
}

#[test]
fn null_object_lookup_is_safe_until_used() {
    let report = Sandbox::new().simulate(&wrapped(
        r#"  let data = context.workbook.worksheets.getItemOrNullObject("Data");
  await context.sync();
  if (data.isNullObject) {
    data = context.workbook.worksheets.add("Data");
  }
  data.getRange("A1").values = [["ok"]];"#,
    ));
    assert!(report.success, "{:?}", report.errors);
    assert!(report.ranges_touched.contains(&"Data!A1".to_string()));
}

#[test]
fn undeclared_identifier_is_reference_error() {
    let report = Sandbox::new().simulate(&wrapped("  missingHelper(sheet);"));
    assert!(!report.success);
    assert!(report.first_error().unwrap().starts_with("ReferenceError"));
}

#[test]
fn syntax_error_reports_line() {
    let report = Sandbox::new().simulate("await Excel.run(async (context) => {\n  const x = ;\n});");
    assert!(!report.success);
    let message = report.first_error().unwrap();
    assert!(message.starts_with("SyntaxError"), "{message}");
    assert!(message.contains("line 2"), "{message}");
    assert!(report.operations.is_empty());
}

#[test]
fn loops_and_helpers_drive_writes() {
    let source = wrapped(
        r#"  const labels = ["Revenue", "Costs", "Profit"];
  function headerRow(items) {
    return [items.map((l) => l.toUpperCase())];
  }
  sheet.getRange("A1:C1").values = headerRow(labels);
  for (let i = 0; i < labels.length; i++) {
    sheet.getRange("A" + (i + 2)).values = [[labels[i]]];
  }"#,
    );
    let report = Sandbox::new().simulate(&source);
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.operations.len(), 4);
    assert_eq!(report.operations[0].payload["value"], json!([["REVENUE", "COSTS", "PROFIT"]]));
    assert_eq!(report.ranges_touched.last().unwrap(), "Sheet1!A4");
}

#[test]
fn caught_errors_do_not_fail_the_run() {
    let report = Sandbox::new().simulate(&wrapped(
        r#"  try {
    context.workbook.worksheets.getItem("Nope").getRange("A1").values = [[1]];
  } catch (e) {
    console.log(e.message);
  }"#,
    ));
    assert!(report.success, "{:?}", report.errors);
}

#[test]
fn runaway_loop_hits_the_step_budget() {
    let sandbox = Sandbox::new().with_config(SandboxConfig {
        max_steps: 1_000,
        ..SandboxConfig::default()
    });
    let report = sandbox.simulate(&wrapped("  while (true) { sheet.getRange(\"A1\"); }"));
    assert!(!report.success);
    assert_eq!(classify_error(report.first_error().unwrap()), ErrorFamily::Timeout);
}

#[test]
fn deeply_nested_chunk_is_rejected_not_overflowed() {
    let body = format!("  const x = {}1{};", "(".repeat(20_000), ")".repeat(20_000));
    let report = Sandbox::new().simulate(&wrapped(&body));
    assert!(!report.success);
    let error = report.first_error().unwrap();
    assert!(error.starts_with("SyntaxError"), "{error}");
    assert!(error.contains("nesting too deep"), "{error}");

    let body = format!(
        "  sheet.getRange(\"A1\").values = {}1{};",
        "[".repeat(20_000),
        "]".repeat(20_000)
    );
    let report = Sandbox::new().simulate(&wrapped(&body));
    assert!(report.first_error().unwrap().contains("nesting too deep"));
}

#[test]
fn seeded_sheets_are_visible_and_untouched() {
    let snapshot = DocumentSnapshot {
        sheets: vec![SheetSnapshot {
            name: "Inputs".into(),
            values: [("A1".to_string(), json!(42))].into_iter().collect(),
            ..SheetSnapshot::default()
        }],
        active_sheet: Some("Inputs".into()),
    };
    let sandbox = Sandbox::seeded(&snapshot);
    let source = r#"
await Excel.run(async (context) => {
  const inputs = context.workbook.worksheets.getItem("Inputs");
  const range = inputs.getRange("A1");
  range.load("values");
  await context.sync();
  inputs.getRange("B1").values = [[range.values[0][0] * 2]];
});
"#;
    let report = sandbox.simulate(source);
    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.operations[0].payload["value"], json!([[84]]));
    assert_eq!(sandbox.sheet_names(), ["Inputs"]);
    // the seed never changes
    assert!(sandbox.simulate(source).success);
}

#[tokio::test]
async fn sandbox_and_memory_target_reject_the_same_shapes() {
    let source = wrapped(r#"  sheet.getRange("A1:B1").values = ["x", "y"];"#);
    let simulated = Sandbox::new().simulate(&source);
    assert!(!simulated.success);

    let target = MemoryTarget::new();
    let err = target.execute(&source).await.unwrap_err();
    let TargetError::Execution(message) = err else {
        panic!("expected an execution error");
    };
    assert_eq!(classify_error(&message), ErrorFamily::Dimension);
    assert_eq!(Some(message.as_str()), simulated.first_error());
    assert!(target.snapshot().await.sheets[0].values.is_empty());
}

#[tokio::test]
async fn memory_target_commits_successful_chunks() {
    let target = MemoryTarget::new();
    target
        .execute(&wrapped(r#"  sheet.getRange("A1:B1").values = [["x", 2]];"#))
        .await
        .unwrap();
    let snapshot = target.snapshot().await;
    let sheet = snapshot.sheet("Sheet1").unwrap();
    assert_eq!(sheet.values["A1"], json!("x"));
    assert_eq!(sheet.values["B1"], json!(2));
    assert_eq!(sheet.used_range.as_deref(), Some("A1:B1"));
}
