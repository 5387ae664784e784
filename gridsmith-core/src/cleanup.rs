//! Intake cleanup for raw model output: fences, surrounding prose and
//! truncated tails.

use std::sync::LazyLock;

use regex::Regex;

use crate::script::{code_tokens, find_wrapper, tokenize, TokenKind};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid"));
static CODE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(await\s+Excel\.run|Excel\.run|(async\s+)?function\b|const\s|let\s|var\s|//|/\*|context\.|sheet\.)",
    )
    .expect("valid")
});

/// Turns raw generator output into a chunk that at least tokenizes and
/// balances. Running it on its own output changes nothing.
pub fn clean_generated_source(raw: &str) -> String {
    let unfenced = FENCE_RE.replace_all(raw, "");
    let trimmed = trim_prose(&unfenced);
    let cut = cut_after_wrapper(&trimmed);
    complete_tail(&cut)
}

/// Drops explanatory lines before the first line that looks like code.
fn trim_prose(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.contains("Excel.run"))
        .map(|i| {
            // keep comments directly above the wrapper
            let mut s = i;
            while s > 0 && lines[s - 1].trim_start().starts_with("//") {
                s -= 1;
            }
            s
        })
        .or_else(|| lines.iter().position(|l| CODE_START_RE.is_match(l)))
        .unwrap_or(0);
    lines[start..].join("\n").trim().to_string()
}

/// Cuts everything after the statement that closes `Excel.run(...)`.
fn cut_after_wrapper(text: &str) -> String {
    let tokens = code_tokens(text);
    let Some(close) = find_wrapper(&tokens).and_then(|w| w.call_close) else {
        return text.to_string();
    };
    let mut end = tokens[close].end;
    if tokens.get(close + 1).is_some_and(|t| t.is_punct(";")) {
        end = tokens[close + 1].end;
    }
    text[..end].to_string()
}

fn complete_tail(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    // a truncated chunk usually ends in a half-written statement
    for _ in 0..3 {
        let unclosed = !open_stack(&lines.join("\n")).is_empty();
        match lines.last() {
            Some(last) if unclosed && is_dangling(last) => {
                lines.pop();
            }
            _ => break,
        }
    }
    let mut out = lines.join("\n");
    let stack = open_stack(&out);
    if stack.is_empty() {
        return out;
    }

    let tokens = code_tokens(&out);
    let body = find_wrapper(&tokens).map(|w| w.body_open);
    let split = body
        .and_then(|b| stack.iter().position(|(idx, _)| *idx == b))
        .map_or(0, |p| p + 1);
    let (outer, inner) = stack.split_at(split);
    if !inner.is_empty() {
        out.extend(inner.iter().rev().map(|(_, c)| *c));
        out.push(';');
    }
    if body.is_some() && !outer.is_empty() {
        let has_sync = tokens
            .windows(2)
            .any(|w| w[0].is_punct(".") && w[1].is_ident("sync"));
        if !has_sync {
            out.push_str("\n    await context.sync();");
        }
        out.push('\n');
    }
    if !outer.is_empty() {
        out.extend(outer.iter().rev().map(|(_, c)| *c));
        out.push(';');
    }
    out
}

/// Unclosed openers as (token index, matching closer).
fn open_stack(text: &str) -> Vec<(usize, char)> {
    let mut stack = Vec::new();
    for (i, t) in code_tokens(text).iter().enumerate() {
        if t.kind != TokenKind::Punct {
            continue;
        }
        match t.text.as_str() {
            "(" => stack.push((i, ')')),
            "[" => stack.push((i, ']')),
            "{" => stack.push((i, '}')),
            ")" | "]" | "}" => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
}

fn is_dangling(line: &str) -> bool {
    if line.trim().is_empty() || tokenize(line).is_err() {
        return true;
    }
    let Some(last) = code_tokens(line).pop() else {
        return true;
    };
    match last.kind {
        TokenKind::Punct => matches!(
            last.text.as_str(),
            "=" | "." | "," | "(" | "+" | "-" | "*" | "/" | "&&" | "||" | "?" | ":" | "=>"
        ),
        TokenKind::Ident => matches!(
            last.text.as_str(),
            "const" | "let" | "var" | "await" | "return" | "new"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_prose() {
        let raw = "Here is the code:\n```javascript\nawait Excel.run(async (context) => {\n    await context.sync();\n});\n```\nThis creates the sheet.";
        assert_eq!(
            clean_generated_source(raw),
            "await Excel.run(async (context) => {\n    await context.sync();\n});"
        );
    }

    #[test]
    fn completes_truncated_tail() {
        let raw = "await Excel.run(async (context) => {\n    const sheet = context.workbook.worksheets.getActiveWorksheet();\n    sheet.getRange(\"A1:B1\").values = [[\"Year\", \"Revenue\"\n    sheet.getRange(\"A2\").formulas =";
        let out = clean_generated_source(raw);
        assert!(out.ends_with("[[\"Year\", \"Revenue\"]];\n    await context.sync();\n});"));
        assert_eq!(clean_generated_source(&out), out);
    }

    #[test]
    fn leaves_complete_code_alone() {
        let src = "await Excel.run(async (context) => {\n    await context.sync();\n});";
        assert_eq!(clean_generated_source(src), src);
    }
}
