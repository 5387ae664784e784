use crate::correct::rule::{changed, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, LiteralNode, ScalarKind, Script, TextEdit};
use crate::validate::rules::arrays::has_uncoerced_entries;

/// Writes `true`/`false` as `"true"`/`"false"` and `null`/`undefined` as `""`
/// inside two-level `values` literals.
pub struct LiteralCoercion;

impl RewriteRule for LiteralCoercion {
    fn name(&self) -> &'static str {
        "literal_coercion"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let mut edits = Vec::new();
        for a in script.bulk_assignments() {
            if !has_uncoerced_entries(&a) {
                continue;
            }
            let Some(rhs) = &a.rhs else { continue };
            for node in rhs.scalars() {
                let LiteralNode::Scalar { kind, first, .. } = node else {
                    continue;
                };
                let tok = &script.tokens[*first];
                let replacement = match kind {
                    ScalarKind::Bool => format!("\"{}\"", tok.text),
                    ScalarKind::Null | ScalarKind::Undefined => "\"\"".to_string(),
                    _ => continue,
                };
                edits.push(TextEdit::replace(tok.start, tok.end, replacement));
            }
        }
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
    fn stringifies_mixed_entries() {
        let src = "r.values = [[\"Active\", true], [null, 3]];";
        let out = LiteralCoercion
            .apply(&Script::new(src), &ScriptLimits::default())
            .unwrap();
        assert_eq!(out, "r.values = [[\"Active\", \"true\"], [\"\", 3]];");
    }

    #[test]
    fn formulas_are_untouched() {
        let src = "r.formulas = [[true]];";
        assert!(LiteralCoercion
            .apply(&Script::new(src), &ScriptLimits::default())
            .is_none());
    }
}
