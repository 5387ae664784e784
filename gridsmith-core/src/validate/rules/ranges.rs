use crate::address::{MAX_COLS, MAX_ROWS};
use crate::limits::ScriptLimits;
use crate::script::{RangeLiteral, Script};
use crate::validate::validator::Findings;

/// Explicit `getRange("A1:B50000")` addresses taller than the row limit.
/// Whole-row and whole-column references are left alone.
pub fn oversized_ranges(script: &Script, limits: &ScriptLimits) -> Vec<RangeLiteral> {
    script
        .range_literals()
        .into_iter()
        .filter(|r| {
            r.address.as_ref().is_some_and(|a| {
                a.rows() > limits.max_range_rows && a.rows() != MAX_ROWS && a.cols() != MAX_COLS
            })
        })
        .collect()
}

pub(crate) fn check(f: &mut Findings) {
    let max = f.limits.max_range_rows;
    for r in oversized_ranges(&f.script, f.limits) {
        let rows = r.address.as_ref().map_or(0, |a| a.rows());
        f.push_fixable(format!(
            "Line {}: range {:?} spans {rows} rows (limit {max})",
            r.line, r.text
        ));
    }
}
