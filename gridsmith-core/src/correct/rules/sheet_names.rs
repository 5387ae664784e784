use crate::correct::rule::{changed, requote, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, Script, SheetMethod, TextEdit};
use crate::validate::rules::sheets::invalid_sheet_names;

/// Sanitises names passed to `worksheets.add(...)` and points lookups of
/// unusable names at the active worksheet.
pub struct SheetNames;

impl RewriteRule for SheetNames {
    fn name(&self) -> &'static str {
        "sheet_names"
    }

    fn apply(&self, script: &Script, limits: &ScriptLimits) -> Option<String> {
        let edits: Vec<TextEdit> = invalid_sheet_names(script, limits)
            .into_iter()
            .map(|(r, _)| match r.method {
                SheetMethod::Add => {
                    let tok = &script.tokens[r.str_idx];
                    let safe = limits.sanitize_sheet_name(&r.name);
                    TextEdit::replace(tok.start, tok.end, requote(tok, script.source, &safe))
                }
                SheetMethod::GetItem | SheetMethod::GetItemOrNullObject => TextEdit::replace(
                    script.tokens[r.method_idx].start,
                    script.tokens[r.close_idx].end,
                    "getActiveWorksheet()",
                ),
            })
            .collect();
        if edits.is_empty() {
            return None;
        }
        changed(script, apply_edits(script.source, edits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitises_add_and_redirects_lookup() {
        let src = "const a = context.workbook.worksheets.add(\"Q1/Q2 [draft]\");\n\
                   const b = context.workbook.worksheets.getItem(\"Q1/Q2 [draft]\");";
        let out = SheetNames
            .apply(&Script::new(src), &ScriptLimits::default())
            .unwrap();
        assert!(out.contains("worksheets.add(\"Q1Q2 draft\")"));
        assert!(out.contains("worksheets.getActiveWorksheet();"));
        assert!(SheetNames
            .apply(&Script::new(&out), &ScriptLimits::default())
            .is_none());
    }
}
