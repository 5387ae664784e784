use crate::address::CellRef;
use crate::correct::rule::{changed, requote, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, self_references, Script, TextEdit};
use crate::validate::rules::arrays::self_referencing_cells;

/// Breaks `=B5+1` written into B5 by replacing the self-reference with `0`.
pub struct CircularReference;

impl RewriteRule for CircularReference {
    fn name(&self) -> &'static str {
        "circular_reference"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let mut edits = Vec::new();
        for a in script.bulk_assignments() {
            for hit in self_referencing_cells(script, &a) {
                let Ok(cell) = CellRef::parse(&hit.cell) else { continue };
                let tok = &script.tokens[hit.str_idx];
                let formula = break_cycle(&tok.text, cell);
                edits.push(TextEdit::replace(
                    tok.start,
                    tok.end,
                    requote(tok, script.source, &formula),
                ));
            }
        }
        if edits.is_empty() {
            return None;
        }
        changed(script, apply_edits(script.source, edits))
    }
}

fn break_cycle(formula: &str, cell: CellRef) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut cursor = 0;
    for r in self_references(formula, cell) {
        out.push_str(&formula[cursor..r.start]);
        out.push('0');
        cursor = r.end;
    }
    out.push_str(&formula[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_self_reference() {
        let src = r#"s.getRange("B5:C5").formulas = [["=B5*1.1", "=B5+C4"]];"#;
        let out = CircularReference
            .apply(&Script::new(src), &ScriptLimits::default())
            .unwrap();
        assert_eq!(out, r#"s.getRange("B5:C5").formulas = [["=0*1.1", "=B5+C4"]];"#);
    }
}
