use gridsmith_core::script::Script;
use gridsmith_core::{
    correct_and_revalidate, validate, Corrector, ErrorFamily, RewriteRule, ScriptLimits,
    Validator,
};

fn wrapped(body: &str) -> String {
    format!("await Excel.run(async (context) => {{\n{body}\n    await context.sync();\n}});")
}

fn corpus() -> Vec<String> {
    vec![
        wrapped("    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1\").values = \"x\";"),
        wrapped("    const s = context.workbook.worksheets.getActiveWorksheet();\n    s.getRange(\"A1:A3\").values = [1, 2, 3];\n    s.getRange(\"B1:C1\").formulas = [\"=A1\", \"=C1+1\"];"),
        wrapped("    async function buildModel() {\n        context.workbook.worksheets.add(\"Model\");\n    }"),
        wrapped("    const s = context.workbook.worksheets.getItem(\"Sales: 2024?\");\n    s.getRange(\"A1:Z90000\").format.fill.color = \"#eee\";\n    s.getRange(\"A1:B1\").values = [[true, null]];"),
        "function main(workbook: ExcelScript.Workbook) {\n    let sheet = workbook.getActiveWorksheet();\n    sheet.getRange(\"A1\").setValue(\"Revenue\");\n}\n".to_string(),
        "var sheet = SpreadsheetApp.getActiveSheet();\nsheet.getRange(\"A1\").setBackground(\"#ddd\");\n".to_string(),
        "const s = context.workbook.worksheets.getActiveWorksheet();\nfunction paint() {}\n".to_string(),
        format!("{}\nasync function buildModel() {{}}\n/* trailing note", wrapped("")),
        wrapped(&format!(
            "    const s = context.workbook.worksheets.getActiveWorksheet();\n    s.getRange(\"A1\").values = {}1{};",
            "[".repeat(50_000),
            "]".repeat(50_000)
        )),
    ]
}

#[test]
fn correction_is_idempotent() {
    let corrector = Corrector::default();
    for src in corpus() {
        let once = corrector.correct(&src);
        let twice = corrector.correct(&once.source);
        assert_eq!(twice.source, once.source, "input:\n{src}");
        assert!(!twice.changed(), "rules fired again: {:?}", twice.applied);
    }
}

#[test]
fn every_rule_is_idempotent_on_its_own_output() {
    let corrector = Corrector::default();
    let limits = ScriptLimits::default();
    for src in corpus() {
        let out = corrector.correct(&src).source;
        let script = Script::new(&out);
        for rule in gridsmith_rules() {
            assert!(rule.apply(&script, &limits).is_none(), "{} fired on:\n{out}", rule.name());
        }
    }
}

fn gridsmith_rules() -> Vec<Box<dyn RewriteRule>> {
    use gridsmith_core::correct::rules::*;
    vec![
        Box::new(DimensionWrap),
        Box::new(SheetNames),
        Box::new(RangeClamp),
        Box::new(CircularReference),
        Box::new(LiteralCoercion),
        Box::new(OrphanCalls),
        Box::new(DialectTranslation),
        Box::new(DefensiveWrap),
    ]
}

#[test]
fn scalar_value_becomes_single_cell_grid() {
    let src = wrapped("    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1\").values = \"x\";");
    assert_eq!(validate(&src).fixable_issues.len(), 1);

    let rev = correct_and_revalidate(&Corrector::default(), &Validator::default(), &src);
    assert!(rev.source.contains("sheet.getRange(\"A1\").values = [[\"x\"]];"));
    assert!(rev.report.errors.is_empty());
    assert!(rev.report.fixable_issues.is_empty());
    assert!(rev.improved);
    assert_eq!(rev.applied.first(), Some(&"dimension_wrap"));
}

#[test]
fn one_level_assignments_clear_after_correction() {
    let src = wrapped("    const s = context.workbook.worksheets.getActiveWorksheet();\n    s.getRange(\"A1:C1\").values = [\"a\", \"b\", \"c\"];\n    s.getRange(\"D1:D2\").values = [1, 2];");
    assert_eq!(validate(&src).fixable_issues.len(), 2);
    let out = Corrector::default().correct(&src).source;
    assert!(out.contains("s.getRange(\"A1:C1\").values = [[\"a\", \"b\", \"c\"]];"));
    assert!(out.contains("s.getRange(\"D1:D2\").values = [[1], [2]];"));
    let report = validate(&out);
    assert!(report.fixable_issues.is_empty());
    assert!(report.warnings.is_empty(), "{report:?}");
}

#[test]
fn orphaned_async_routine_gets_awaited_call() {
    let src = wrapped("    async function buildModel() {\n        context.workbook.worksheets.add(\"Model\");\n    }");
    assert!(validate(&src).fixable_issues[0].contains("buildModel"));

    let out = Corrector::default().correct(&src).source;
    assert!(out.contains("await buildModel();"));
    assert!(validate(&out).fixable_issues.is_empty());
}

#[test]
fn office_scripts_chunk_translates_to_valid_office_js() {
    let src = "function main(workbook: ExcelScript.Workbook) {\n    let sheet = workbook.getActiveWorksheet();\n    sheet.getRange(\"A1\").setValue(\"Revenue\");\n}\n";
    assert!(!validate(src).is_valid());
    let rev = correct_and_revalidate(&Corrector::default(), &Validator::default(), src);
    assert!(rev.report.is_valid(), "{:?}\n{}", rev.report, rev.source);
    assert!(rev.applied.contains(&"dialect_translation"));
    assert!(rev.source.contains("Excel.run"));
}

#[test]
fn sheet_names_ranges_and_literals_are_repaired() {
    let src = &corpus()[3];
    assert_eq!(validate(src).fixable_issues.len(), 3);
    let out = Corrector::default().correct(src).source;
    assert!(out.contains("worksheets.getActiveWorksheet()"));
    assert!(out.contains("\"A1:Z1000\""));
    assert!(out.contains("[[\"true\", \"\"]]"));
    assert!(validate(&out).fixable_issues.is_empty());
}

#[test]
fn circular_formula_is_broken() {
    let src = wrapped("    context.workbook.worksheets.getActiveWorksheet().getRange(\"C3:D3\").formulas = [[\"=C3+1\", \"=C3*2\"]];");
    let out = Corrector::default().correct(&src).source;
    assert!(out.contains("[[\"=0+1\", \"=C3*2\"]]"));
    assert!(validate(&out).fixable_issues.is_empty());
}

struct Vandal;

impl RewriteRule for Vandal {
    fn name(&self) -> &'static str {
        "vandal"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        (!script.source.contains("eval(")).then(|| format!("{}\neval(\"1\");", script.source))
    }
}

#[test]
fn revalidation_never_keeps_a_worse_result() {
    let src = wrapped("    context.workbook.worksheets.getActiveWorksheet();");
    let corrector = Corrector::with_rules(vec![Box::new(Vandal)], ScriptLimits::default());
    let rev = correct_and_revalidate(&corrector, &Validator::default(), &src);
    assert_eq!(rev.source, src);
    assert!(rev.applied.is_empty());
    assert!(!rev.improved);
}

#[test]
fn equal_scores_keep_the_later_revision() {
    let src = wrapped("    context.workbook.worksheets.getActiveWorksheet();");
    let rev = correct_and_revalidate(&Corrector::default(), &Validator::default(), &src);
    assert_eq!(rev.applied, ["defensive_wrap"]);
    assert!(rev.source.contains("try {"));
    assert!(!rev.improved);
}

#[test]
fn syntax_family_completes_truncated_chunk() {
    let src = "await Excel.run(async (context) => {\n    const s = context.workbook.worksheets.getActiveWorksheet();\n    s.getRange(\"A1:B1\").values = [[\"a\", \"b\"]];\n    s.getRange(";
    assert!(!validate(src).is_valid());
    let out = Corrector::targeted(ErrorFamily::Syntax, ScriptLimits::default()).correct(src);
    assert_eq!(out.applied, ["completion"]);
    assert!(validate(&out.source).is_valid(), "{}", out.source);
}

#[test]
fn nothing_to_do_returns_input() {
    let src = "await Excel.run(async (context) => {\n    try {\n        await context.sync();\n    } catch (error) {\n        throw error;\n    }\n});";
    let out = Corrector::default().correct(src);
    assert_eq!(out.source, src);
    assert!(out.applied.is_empty());
}
