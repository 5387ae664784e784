use crate::address::{CellRef, RangeAddress};
use crate::correct::rule::{changed, requote, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{apply_edits, Script, TextEdit};
use crate::validate::rules::ranges::oversized_ranges;

/// Cuts runaway rectangular addresses down to `max_range_rows` rows, keeping
/// the top-left corner, the column span and any sheet prefix.
pub struct RangeClamp;

impl RewriteRule for RangeClamp {
    fn name(&self) -> &'static str {
        "range_clamp"
    }

    fn apply(&self, script: &Script, limits: &ScriptLimits) -> Option<String> {
        let edits: Vec<TextEdit> = oversized_ranges(script, limits)
            .into_iter()
            .filter_map(|r| {
                let addr = r.address?;
                let clamped = RangeAddress {
                    sheet: addr.sheet.clone(),
                    start: addr.start,
                    end: CellRef::new(addr.start.row + limits.max_range_rows - 1, addr.end.col),
                };
                let tok = &script.tokens[r.str_idx];
                Some(TextEdit::replace(
                    tok.start,
                    tok.end,
                    requote(tok, script.source, &clamped.to_string()),
                ))
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
    fn clamps_tall_ranges() {
        let src = "sheet.getRange('B2:D50000').format.fill.color = '#fff';";
        let out = RangeClamp
            .apply(&Script::new(src), &ScriptLimits::default())
            .unwrap();
        assert_eq!(out, "sheet.getRange('B2:D1001').format.fill.color = '#fff';");
    }

    #[test]
    fn keeps_whole_columns_and_small_ranges() {
        let limits = ScriptLimits::default();
        assert!(RangeClamp
            .apply(&Script::new("s.getRange(\"A:C\").clear();"), &limits)
            .is_none());
        assert!(RangeClamp
            .apply(&Script::new("s.getRange(\"A1:A1000\").clear();"), &limits)
            .is_none());
    }
}
