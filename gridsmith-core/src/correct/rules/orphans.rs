use crate::correct::rule::{changed, RewriteRule};
use crate::error::ScriptError;
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, indent_at, tokenize, FunctionDecl, Script, TextEdit, Wrapper};
use crate::validate::uncalled_routines;

/// Adds a call for every declared-but-uncalled routine.
///
/// Routines declared inside the `Excel.run` body are called just before the
/// body's last `context.sync()` (or its closing brace); anything else is
/// called at the end of the chunk. Async routines get `await`.
pub struct OrphanCalls;

impl RewriteRule for OrphanCalls {
    fn name(&self) -> &'static str {
        "orphan_calls"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let orphans = uncalled_routines(script);
        if orphans.is_empty() {
            return None;
        }
        let wrapper = script.wrapper();
        let mut inner = Vec::new();
        let mut outer = Vec::new();
        for f in &orphans {
            match &wrapper {
                Some(w) if inside_body(w, f) => {
                    inner.push(call_text(script, f, w.context_param.as_deref()))
                }
                _ => outer.push(call_text(script, f, None)),
            }
        }

        let mut edits = Vec::new();
        if let (Some(w), false) = (&wrapper, inner.is_empty()) {
            if let Some(edit) = insert_in_body(script, w, &orphans, &inner) {
                edits.push(edit);
            }
        }
        let mut out = apply_edits(script.source, edits);
        if !outer.is_empty() && !swallows_tail(&out) {
            let trimmed = out.trim_end().len();
            out.truncate(trimmed);
            out.push('\n');
            out.push_str(&outer.join("\n"));
            out.push('\n');
        }
        changed(script, out)
    }
}

/// True when the source ends inside a block comment or template, where an
/// appended call would become part of the unterminated literal.
fn swallows_tail(source: &str) -> bool {
    matches!(
        tokenize(source),
        Err(ScriptError::UnterminatedComment { .. } | ScriptError::UnterminatedTemplate { .. })
    )
}

fn inside_body(w: &Wrapper, f: &FunctionDecl) -> bool {
    w.body_open < f.name_idx && w.body_close.is_some_and(|c| f.name_idx < c)
}

/// `await name(context);` when the routine's only parameter shares the
/// wrapper's context name, `await name();` otherwise.
fn call_text(script: &Script, f: &FunctionDecl, context: Option<&str>) -> String {
    let params = if f.params_open == f.params_close {
        // single-parameter arrow without parentheses
        &script.tokens[f.params_open..=f.params_close]
    } else {
        &script.tokens[f.params_open + 1..f.params_close]
    };
    let args = match (params, context) {
        ([p], Some(ctx)) if p.is_ident(ctx) => ctx,
        _ => "",
    };
    let prefix = if f.is_async { "await " } else { "" };
    format!("{prefix}{}({args});", f.name)
}

fn insert_in_body(
    script: &Script,
    w: &Wrapper,
    orphans: &[FunctionDecl],
    calls: &[String],
) -> Option<TextEdit> {
    let close = w.body_close?;
    let last_decl = orphans
        .iter()
        .map(|f| f.body_close.unwrap_or(f.name_idx))
        .max()
        .unwrap_or(w.body_open);
    // statement start of the final `context.sync()` after every orphan
    let anchor = script
        .sync_calls()
        .into_iter()
        .filter(|&i| i > last_decl && i < close && i >= 2)
        .max()
        .map(|i| {
            let recv = i - 2;
            if recv > 0 && script.tokens[recv - 1].is_ident("await") {
                recv - 1
            } else {
                recv
            }
        })
        .unwrap_or(close);

    let at = script.tokens[anchor].start;
    let line_start = script.source[..at].rfind('\n').map_or(0, |i| i + 1);
    let own_line = script.source[line_start..at].trim().is_empty();
    let indent = if anchor == close {
        format!("{}    ", indent_at(script.source, at))
    } else {
        indent_at(script.source, at).to_string()
    };
    if own_line {
        let block: String = calls.iter().map(|c| format!("{indent}{c}\n")).collect();
        Some(TextEdit::insert(line_start, block))
    } else {
        Some(TextEdit::insert(at, format!("{} ", calls.join(" "))))
    }
}
