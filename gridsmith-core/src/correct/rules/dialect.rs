use std::collections::BTreeSet;

use crate::correct::rule::{changed, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{
    apply_edits, indent_at, matching_close, DeclStyle, Script, TextEdit, Token, TokenKind,
};
use crate::validate::{detect_dialect, Dialect};

/// Translates Office Scripts and Apps Script chunks into Office.js, then makes
/// sure the chunk runs inside `Excel.run` and flushes with `context.sync()`.
pub struct DialectTranslation;

impl RewriteRule for DialectTranslation {
    fn name(&self) -> &'static str {
        "dialect_translation"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let translated = match detect_dialect(script) {
            Some(Dialect::OfficeScripts) => {
                let text = apply_edits(script.source, office_scripts_edits(script));
                replace_entry_point(&text)
            }
            Some(Dialect::AppsScript) => apply_edits(script.source, apps_script_edits(script)),
            None => script.source.to_string(),
        };
        changed(script, ensure_wrapper(&translated))
    }
}

#[derive(Clone, Copy)]
enum Rewrite {
    /// `.setX(a)` -> `.prop = a`
    Property(&'static str),
    /// `.setX(a)` -> `.prop = [[a]]`
    Cell(&'static str),
    /// `.getX()` -> `.prop`
    Getter(&'static str),
    /// `.x(a)` -> `.path(a)`
    Call(&'static str),
    /// `.setFontWeight("bold")` -> `.format.font.bold = true`
    FontWeight,
}

const SHARED: &[(&str, Rewrite)] = &[
    ("setValue", Rewrite::Cell("values")),
    ("setValues", Rewrite::Property("values")),
    ("setFormula", Rewrite::Cell("formulas")),
    ("setFormulas", Rewrite::Property("formulas")),
    ("setNumberFormat", Rewrite::Cell("numberFormat")),
    ("setNumberFormats", Rewrite::Property("numberFormat")),
];

const OFFICE_SCRIPTS: &[(&str, Rewrite)] = &[
    ("getFormat", Rewrite::Getter("format")),
    ("getFill", Rewrite::Getter("fill")),
    ("getFont", Rewrite::Getter("font")),
    ("getBorders", Rewrite::Getter("borders")),
    ("setColor", Rewrite::Property("color")),
    ("setBold", Rewrite::Property("bold")),
    ("setItalic", Rewrite::Property("italic")),
    ("setSize", Rewrite::Property("size")),
    ("setName", Rewrite::Property("name")),
    ("setColumnWidth", Rewrite::Property("columnWidth")),
    ("setRowHeight", Rewrite::Property("rowHeight")),
    ("setHorizontalAlignment", Rewrite::Property("horizontalAlignment")),
    ("setVerticalAlignment", Rewrite::Property("verticalAlignment")),
    ("setWrapText", Rewrite::Property("wrapText")),
];

// Only applied when the receiver is the entry point's workbook parameter.
const OFFICE_SCRIPTS_WORKBOOK: &[(&str, Rewrite)] = &[
    ("getWorksheet", Rewrite::Call("worksheets.getItem")),
    ("addWorksheet", Rewrite::Call("worksheets.add")),
    ("getWorksheets", Rewrite::Getter("worksheets")),
    ("getActiveWorksheet", Rewrite::Call("worksheets.getActiveWorksheet")),
];

const APPS_SCRIPT: &[(&str, Rewrite)] = &[
    ("getActiveSheet", Rewrite::Call("worksheets.getActiveWorksheet")),
    ("getSheetByName", Rewrite::Call("worksheets.getItem")),
    ("insertSheet", Rewrite::Call("worksheets.add")),
    ("setBackground", Rewrite::Property("format.fill.color")),
    ("setFontColor", Rewrite::Property("format.font.color")),
    ("setFontSize", Rewrite::Property("format.font.size")),
    ("setFontWeight", Rewrite::FontWeight),
    ("setFrozenRows", Rewrite::Call("freezePanes.freezeRows")),
    ("setFrozenColumns", Rewrite::Call("freezePanes.freezeColumns")),
];

const APPS_SCRIPT_STATIC: &[(&str, &str)] = &[
    ("getActiveSpreadsheet", "context.workbook"),
    ("getActive", "context.workbook"),
    ("getActiveSheet", "context.workbook.worksheets.getActiveWorksheet()"),
    ("flush", "context.sync()"),
];

fn office_scripts_edits(script: &Script) -> Vec<TextEdit> {
    let tokens = &script.tokens;
    let workbook = entry_param(script).unwrap_or_else(|| "workbook".to_string());
    let mut edits = type_annotation_edits(script);
    edits.extend(enum_edits(script));
    for i in 1..tokens.len() {
        let on_workbook = i >= 2
            && tokens[i - 2].is_ident(&workbook)
            && !(i >= 3 && tokens[i - 3].is_punct("."));
        let table: &[(&str, Rewrite)] = if on_workbook {
            OFFICE_SCRIPTS_WORKBOOK
        } else {
            OFFICE_SCRIPTS
        };
        if let Some(edit) =
            member_rewrite(script, i, SHARED).or_else(|| member_rewrite(script, i, table))
        {
            edits.push(edit);
        }
    }
    edits
}

fn apps_script_edits(script: &Script) -> Vec<TextEdit> {
    let tokens = &script.tokens;
    let mut edits = Vec::new();
    for i in 0..tokens.len() {
        if tokens[i].is_ident("SpreadsheetApp")
            && tokens.get(i + 1).is_some_and(|t| t.is_punct("."))
            && tokens.get(i + 3).is_some_and(|t| t.is_punct("("))
        {
            let method = &tokens[i + 2].text;
            let Some((_, replacement)) = APPS_SCRIPT_STATIC.iter().find(|(m, _)| *m == method.as_str())
            else {
                continue;
            };
            let Some(close) = matching_close(tokens, i + 3) else {
                continue;
            };
            let awaited = i > 0 && tokens[i - 1].is_ident("await");
            let text = if *method == "flush" && !awaited {
                format!("await {replacement}")
            } else {
                replacement.to_string()
            };
            edits.push(TextEdit::replace(tokens[i].start, tokens[close].end, text));
            continue;
        }
        if let Some(edit) =
            member_rewrite(script, i, SHARED).or_else(|| member_rewrite(script, i, APPS_SCRIPT))
        {
            edits.push(edit);
        }
    }
    edits
}

/// Rewrites `.name(args)` at token `i` according to `table`.
fn member_rewrite(script: &Script, i: usize, table: &[(&str, Rewrite)]) -> Option<TextEdit> {
    let tokens = &script.tokens;
    if i == 0 || !tokens[i - 1].is_punct(".") || !tokens.get(i + 1)?.is_punct("(") {
        return None;
    }
    let (_, rewrite) = table.iter().find(|(name, _)| tokens[i].is_ident(name))?;
    let close = matching_close(tokens, i + 1)?;
    let arg = script.source[tokens[i + 1].end..tokens[close].start].trim();
    let text = match *rewrite {
        Rewrite::Property(p) => format!(".{p} = {arg}"),
        Rewrite::Cell(p) => format!(".{p} = [[{arg}]]"),
        Rewrite::Getter(p) if arg.is_empty() => format!(".{p}"),
        Rewrite::Getter(_) => return None,
        Rewrite::Call(path) => format!(".{path}({arg})"),
        Rewrite::FontWeight => {
            let literal = (close == i + 3 && tokens[i + 2].kind == TokenKind::Str)
                .then(|| tokens[i + 2].text.as_str());
            match literal {
                Some("bold") => ".format.font.bold = true".to_string(),
                Some("normal") => ".format.font.bold = false".to_string(),
                _ => format!(".format.font.bold = ({arg}) === \"bold\""),
            }
        }
    };
    Some(TextEdit::replace(tokens[i - 1].start, tokens[close].end, text))
}

fn entry_param(script: &Script) -> Option<String> {
    let main = script
        .functions()
        .into_iter()
        .find(|f| f.name == "main" && f.style == DeclStyle::Function)?;
    let first = script.tokens.get(main.params_open + 1)?;
    first.is_word().then(|| first.text.clone())
}

/// Strips `: Type` from declarations, parameters and return positions, and
/// `as Type` casts.
fn type_annotation_edits(script: &Script) -> Vec<TextEdit> {
    let tokens = &script.tokens;
    let mut colons = BTreeSet::new();

    for k in 0..tokens.len().saturating_sub(2) {
        if matches!(tokens[k].text.as_str(), "const" | "let" | "var")
            && tokens[k].is_word()
            && tokens[k + 1].is_word()
            && tokens[k + 2].is_punct(":")
        {
            colons.insert(k + 2);
        }
    }

    let mut param_lists: Vec<(usize, usize)> = script
        .functions()
        .iter()
        .filter(|f| f.params_open != f.params_close)
        .map(|f| (f.params_open, f.params_close))
        .collect();
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct("(") {
            let Some(close) = matching_close(tokens, i) else {
                continue;
            };
            let arrow_head = match tokens.get(close + 1) {
                Some(n) if n.is_punct("=>") => true,
                // `(r: Range): void =>`, but not the `(a) : b` of a ternary
                Some(n) if n.is_punct(":") => type_end(tokens, close + 2)
                    .and_then(|e| tokens.get(e))
                    .is_some_and(|t| t.is_punct("=>")),
                _ => false,
            };
            if arrow_head {
                param_lists.push((i, close));
            }
        }
    }
    for (open, close) in param_lists {
        let mut depth = 0i32;
        for j in open + 1..close {
            let t = &tokens[j];
            match t.text.as_str() {
                "(" | "[" | "{" if t.kind == TokenKind::Punct => depth += 1,
                ")" | "]" | "}" if t.kind == TokenKind::Punct => depth -= 1,
                ":" if t.kind == TokenKind::Punct && depth == 0 && tokens[j - 1].is_word() => {
                    colons.insert(j);
                }
                _ => {}
            }
        }
        // return type
        if tokens.get(close + 1).is_some_and(|t| t.is_punct(":")) {
            colons.insert(close + 1);
        }
    }

    let mut edits: Vec<TextEdit> = colons
        .into_iter()
        .filter_map(|colon| {
            let end = type_end(tokens, colon + 1)?;
            let follows = tokens.get(end).map_or(true, |t| {
                ["=", ",", ")", ";", "{", "=>"].iter().any(|p| t.is_punct(p))
            });
            follows.then(|| TextEdit::replace(tokens[colon].start, tokens[end - 1].end, ""))
        })
        .collect();

    for i in 1..tokens.len() {
        let prev = &tokens[i - 1];
        if tokens[i].is_ident("as") && (prev.is_word() || prev.is_punct(")") || prev.is_punct("]")) {
            if let Some(end) = type_end(tokens, i + 1) {
                edits.push(TextEdit::replace(prev.end, tokens[end - 1].end, ""));
            }
        }
    }
    edits
}

/// Index just past a simple type expression starting at `k`:
/// `A.B<C>[] | "lit"`.
fn type_end(tokens: &[Token], mut k: usize) -> Option<usize> {
    loop {
        let t = tokens.get(k)?;
        if t.is_word() {
            k += 1;
            while tokens.get(k).is_some_and(|t| t.is_punct("."))
                && tokens.get(k + 1).is_some_and(|t| t.is_word())
            {
                k += 2;
            }
            if tokens.get(k).is_some_and(|t| t.is_punct("<")) {
                let mut depth = 0i32;
                while let Some(t) = tokens.get(k) {
                    match t.text.as_str() {
                        "<" => depth += 1,
                        ">" => depth -= 1,
                        ">>" => depth -= 2,
                        _ => {}
                    }
                    k += 1;
                    if depth <= 0 {
                        break;
                    }
                }
            }
        } else if matches!(t.kind, TokenKind::Str | TokenKind::Number) {
            k += 1;
        } else {
            return None;
        }
        while tokens.get(k).is_some_and(|t| t.is_punct("["))
            && tokens.get(k + 1).is_some_and(|t| t.is_punct("]"))
        {
            k += 2;
        }
        if tokens.get(k).is_some_and(|t| t.is_punct("|")) {
            k += 1;
            continue;
        }
        return Some(k);
    }
}

/// `ExcelScript.HorizontalAlignment.center` -> `"Center"`.
fn enum_edits(script: &Script) -> Vec<TextEdit> {
    let tokens = &script.tokens;
    (0..tokens.len().saturating_sub(4))
        .filter(|&i| {
            tokens[i].is_ident("ExcelScript")
                && tokens[i + 1].is_punct(".")
                && tokens[i + 2].is_word()
                && tokens[i + 3].is_punct(".")
                && tokens[i + 4].is_word()
        })
        .map(|i| {
            let member = &tokens[i + 4].text;
            let mut chars = member.chars();
            let value: String = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            TextEdit::replace(tokens[i].start, tokens[i + 4].end, format!("\"{value}\""))
        })
        .collect()
}

/// Replaces `function main(workbook) { ... }` with an `Excel.run` block.
fn replace_entry_point(text: &str) -> String {
    let script = Script::new(text);
    let tokens = &script.tokens;
    let Some(main) = script
        .functions()
        .into_iter()
        .find(|f| f.name == "main" && f.style == DeclStyle::Function)
    else {
        return text.to_string();
    };
    let (Some(body_open), Some(body_close)) = (main.body_open, main.body_close) else {
        return text.to_string();
    };
    let mut start = main.name_idx - 1;
    while start > 0 && (tokens[start - 1].is_ident("async") || tokens[start - 1].is_ident("export")) {
        start -= 1;
    }
    let body = text[tokens[body_open].end..tokens[body_close].start]
        .trim_start_matches(['\r', '\n'])
        .trim_end();

    let mut block = String::from("await Excel.run(async (context) => {\n");
    let param = tokens
        .get(main.params_open + 1)
        .filter(|t| t.is_word() && main.params_close > main.params_open + 1);
    if let Some(p) = param {
        let used = tokens[body_open..body_close]
            .iter()
            .enumerate()
            .any(|(k, t)| t.is_ident(&p.text) && !tokens[body_open + k - 1].is_punct("."));
        if used {
            block.push_str(&format!("    const {} = context.workbook;\n", p.text));
        }
    }
    if !body.is_empty() {
        block.push_str(body);
        block.push('\n');
    }
    let has_sync = script
        .sync_calls()
        .iter()
        .any(|&i| body_open < i && i < body_close);
    if !has_sync {
        block.push_str("    await context.sync();\n");
    }
    block.push_str("});");

    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(&text[..tokens[start].start]);
    out.push_str(&block);
    out.push_str(&text[tokens[body_close].end..]);
    out
}

/// Wraps a bare chunk in `Excel.run`, or adds the closing `context.sync()` to
/// an existing wrapper that never syncs.
fn ensure_wrapper(text: &str) -> String {
    let script = Script::new(text);
    if script.tokens.is_empty() {
        return text.to_string();
    }
    if let Some(w) = script.wrapper() {
        let (Some(close), Some(ctx)) = (w.body_close, w.context_param.as_deref()) else {
            return text.to_string();
        };
        if !script.sync_calls().is_empty() {
            return text.to_string();
        }
        let at = script.tokens[close].start;
        let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
        let call = format!("await {ctx}.sync();");
        let edit = if text[line_start..at].trim().is_empty() {
            let indent = indent_at(text, at);
            TextEdit::insert(line_start, format!("{indent}    {call}\n"))
        } else {
            TextEdit::insert(at, format!("{call} "))
        };
        return apply_edits(text, vec![edit]);
    }

    let multiline_template = script
        .tokens
        .iter()
        .any(|t| t.kind == TokenKind::Template && t.text.contains('\n'));
    let body = text.trim_matches(['\r', '\n']).trim_end();
    let mut out = String::from("await Excel.run(async (context) => {\n");
    for line in body.lines() {
        if !multiline_template && !line.trim().is_empty() {
            out.push_str("    ");
        }
        out.push_str(line);
        out.push('\n');
    }
    if script.sync_calls().is_empty() {
        out.push_str("    await context.sync();\n");
    }
    out.push_str("});\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Option<String> {
        DialectTranslation.apply(&Script::new(src), &ScriptLimits::default())
    }

    #[test]
    fn translates_office_scripts_entry_point() {
        let src = "function main(workbook: ExcelScript.Workbook) {\n    let sheet: ExcelScript.Worksheet = workbook.getActiveWorksheet();\n    sheet.getRange(\"A1\").setValue(\"Revenue\");\n    sheet.getRange(\"A1\").getFormat().getFont().setBold(true);\n}\n";
        let out = run(src).unwrap();
        assert!(out.starts_with("await Excel.run(async (context) => {\n"));
        assert!(out.contains("const workbook = context.workbook;"));
        assert!(out.contains("let sheet = workbook.worksheets.getActiveWorksheet();"));
        assert!(out.contains("sheet.getRange(\"A1\").values = [[\"Revenue\"]];"));
        assert!(out.contains("sheet.getRange(\"A1\").format.font.bold = true;"));
        assert!(out.contains("await context.sync();\n});"));
        assert!(!out.contains("ExcelScript"));
        assert!(run(&out).is_none());
    }

    #[test]
    fn translates_apps_script_calls() {
        let src = "var sheet = SpreadsheetApp.getActiveSpreadsheet().getSheetByName(\"Data\");\nsheet.getRange(\"A1\").setBackground(\"#eeeeee\");\nsheet.getRange(\"A1\").setFontWeight(\"bold\");\nSpreadsheetApp.flush();\n";
        let out = run(src).unwrap();
        assert!(out.contains("var sheet = context.workbook.worksheets.getItem(\"Data\");"));
        assert!(out.contains(".format.fill.color = \"#eeeeee\";"));
        assert!(out.contains(".format.font.bold = true;"));
        assert!(out.contains("    await context.sync();\n});"));
        assert!(!out.contains("SpreadsheetApp"));
        assert!(run(&out).is_none());
    }

    #[test]
    fn wraps_bare_office_js() {
        let out = run("const s = context.workbook.worksheets.getActiveWorksheet();\n").unwrap();
        assert_eq!(
            out,
            "await Excel.run(async (context) => {\n    const s = context.workbook.worksheets.getActiveWorksheet();\n    await context.sync();\n});\n"
        );
    }

    #[test]
    fn adds_missing_sync_to_existing_wrapper() {
        let out = run("Excel.run(async (ctx) => {\n    ctx.workbook.load(\"name\");\n});").unwrap();
        assert!(out.contains("    await ctx.sync();\n});"));
    }
}
