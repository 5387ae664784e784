use assert_cmd::Command;
use tempfile::TempDir;

fn wrapped(body: &str) -> String {
    format!(
        "await Excel.run(async (context) => {{\n    const sheet = context.workbook.worksheets.getActiveWorksheet();\n{body}\n    await context.sync();\n}});\n"
    )
}

fn chunk_dir(chunks: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (name, body) in chunks {
        std::fs::write(dir.path().join(name), wrapped(body)).expect("write");
    }
    std::fs::write(dir.path().join("README.md"), "not a chunk").expect("write");
    dir
}

fn gridsmith() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("gridsmith"))
}

#[test]
fn build_runs_chunks_in_name_order() {
    let dir = chunk_dir(&[
        ("02-second.js", r#"    sheet.getRange("A1").values = [["second"]];"#),
        ("01-first.js", r#"    sheet.getRange("A1:B1").values = [["first", 1]];"#),
    ]);
    let out = gridsmith()
        .args(["build", dir.path().to_string_lossy().as_ref(), "--format", "json", "--events", "none"])
        .output()
        .expect("run");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["finalState"], "completed");
    assert_eq!(v["progress"]["completedCount"], 2);
    assert_eq!(v["snapshot"]["sheets"][0]["values"]["A1"], "second");
    assert_eq!(v["snapshot"]["sheets"][0]["values"]["B1"], 1);
    assert_eq!(v["metrics"]["chunks"]["succeeded"], 2);
}

#[test]
fn build_aborts_when_breaker_trips() {
    let dir = chunk_dir(&[("01-broken.js", r#"    throw new Error("GeneralException: boom");"#)]);
    let out = gridsmith()
        .args([
            "build",
            dir.path().to_string_lossy().as_ref(),
            "--format",
            "json",
            "--events",
            "none",
            "--max-consecutive-failures",
            "2",
            "--backoff-ms",
            "1",
        ])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(3));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["finalState"], "aborted");
    assert_eq!(v["progress"]["failedCount"], 2);
    assert!(v["abortReason"]
        .as_str()
        .is_some_and(|r| r.contains("2 consecutive failures")));
}

#[test]
fn build_rejects_invalid_config() {
    let dir = chunk_dir(&[("01.js", r#"    sheet.getRange("A1").values = [[1]];"#)]);
    let config = dir.path().join("orchestrator.yaml");
    std::fs::write(&config, "retry:\n  maxConsecutiveFailures: 0\n").expect("write");
    gridsmith()
        .args([
            "build",
            dir.path().join("01.js").to_string_lossy().as_ref(),
            "--config",
            config.to_string_lossy().as_ref(),
        ])
        .assert()
        .code(4);
}

#[test]
fn build_without_chunks_is_a_runtime_error() {
    let dir = TempDir::new().expect("tempdir");
    gridsmith()
        .args(["build", dir.path().to_string_lossy().as_ref()])
        .assert()
        .code(4);
}
