use crate::correct::rule::{changed, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, LiteralNode, Script, Shape, TextEdit};

/// Rewrites scalar and one-level bulk assignments into two-level literals.
///
/// A one-level list written to a single-column range of the same height
/// becomes a column (`[[a], [b]]`); anything else becomes a single row.
pub struct DimensionWrap;

impl RewriteRule for DimensionWrap {
    fn name(&self) -> &'static str {
        "dimension_wrap"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let mut edits = Vec::new();
        for a in script.bulk_assignments() {
            let Some(rhs) = &a.rhs else { continue };
            let start = script.tokens[rhs.first()].start;
            let end = script.tokens[rhs.last()].end;
            match a.shape() {
                Shape::Scalar => {
                    let text = script.text(rhs.first(), rhs.last());
                    edits.push(TextEdit::replace(start, end, format!("[[{text}]]")));
                }
                Shape::OneLevel { len } => {
                    let column = a
                        .target
                        .as_ref()
                        .is_some_and(|t| len > 1 && t.cols() == 1 && t.rows() as usize == len);
                    let replacement = if column {
                        column_literal(script, rhs)
                    } else {
                        format!("[{}]", script.text(rhs.first(), rhs.last()))
                    };
                    edits.push(TextEdit::replace(start, end, replacement));
                }
                Shape::TwoLevel { .. } | Shape::Unknown => {}
            }
        }
        if edits.is_empty() {
            return None;
        }
        changed(script, apply_edits(script.source, edits))
    }
}

fn column_literal(script: &Script, rhs: &LiteralNode) -> String {
    let LiteralNode::Array { items, .. } = rhs else {
        return format!("[{}]", script.text(rhs.first(), rhs.last()));
    };
    let rows: Vec<String> = items
        .iter()
        .map(|item| format!("[{}]", script.text(item.first(), item.last())))
        .collect();
    format!("[{}]", rows.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Option<String> {
        DimensionWrap.apply(&Script::new(src), &ScriptLimits::default())
    }

    #[test]
    fn wraps_scalar() {
        assert_eq!(
            run(r#"sheet.getRange("A1").values = "x";"#).as_deref(),
            Some(r#"sheet.getRange("A1").values = [["x"]];"#)
        );
    }

    #[test]
    fn wraps_row_and_column() {
        assert_eq!(
            run(r#"s.getRange("A1:C1").values = ["a", "b", "c"];"#).as_deref(),
            Some(r#"s.getRange("A1:C1").values = [["a", "b", "c"]];"#)
        );
        assert_eq!(
            run(r#"s.getRange("A1:A3").formulas = ["=1", "=2", "=3"];"#).as_deref(),
            Some(r#"s.getRange("A1:A3").formulas = [["=1"], ["=2"], ["=3"]];"#)
        );
    }

    #[test]
    fn leaves_two_level_and_unknown_alone() {
        assert!(run(r#"r.values = [["a"]];"#).is_none());
        assert!(run("r.values = rows;").is_none());
    }
}
