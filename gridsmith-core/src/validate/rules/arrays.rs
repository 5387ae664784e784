use crate::address::{MAX_COLS, MAX_ROWS};
use crate::script::{
    is_formula, self_references, BulkAssignment, BulkProperty, LiteralNode, ScalarKind, Script,
    Shape,
};
use crate::validate::validator::Findings;

/// A cell inside a two-level literal whose formula points back at itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReference {
    pub line: usize,
    /// Token index of the offending string literal.
    pub str_idx: usize,
    pub cell: String,
}

pub fn self_referencing_cells(script: &Script, a: &BulkAssignment) -> Vec<SelfReference> {
    let (Some(target), Some(rhs)) = (&a.target, &a.rhs) else {
        return Vec::new();
    };
    if a.property == BulkProperty::NumberFormat || !matches!(a.shape(), Shape::TwoLevel { .. }) {
        return Vec::new();
    }
    rhs.grid_cells()
        .into_iter()
        .filter_map(|(r, c, node)| {
            let LiteralNode::Scalar {
                kind: ScalarKind::Str,
                first,
                ..
            } = node
            else {
                return None;
            };
            let text = &script.tokens[*first].text;
            let cell = target.cell_at(r as u32, c as u32)?;
            (is_formula(text) && !self_references(text, cell).is_empty()).then(|| SelfReference {
                line: script.tokens[*first].line,
                str_idx: *first,
                cell: cell.to_string(),
            })
        })
        .collect()
}

/// `values` literals carrying booleans, null or undefined.
pub fn has_uncoerced_entries(a: &BulkAssignment) -> bool {
    a.property == BulkProperty::Values
        && matches!(a.shape(), Shape::TwoLevel { .. })
        && a.rhs.as_ref().is_some_and(|rhs| {
            rhs.scalars().iter().any(|s| {
                matches!(
                    s,
                    LiteralNode::Scalar {
                        kind: ScalarKind::Bool | ScalarKind::Null | ScalarKind::Undefined,
                        ..
                    }
                )
            })
        })
}

pub(crate) fn check(f: &mut Findings) {
    for a in f.script.bulk_assignments() {
        let prop = a.property.as_str();
        match a.shape() {
            Shape::Scalar => f.push_fixable(format!(
                "Line {}: `.{prop}` is assigned a scalar; bulk properties take a 2D array like [[value]]",
                a.line
            )),
            Shape::OneLevel { len } => f.push_fixable(format!(
                "Line {}: `.{prop}` is assigned a 1D array of {len} item(s); bulk properties take a 2D array",
                a.line
            )),
            Shape::TwoLevel { rows, cols } => {
                if ragged(&a) {
                    f.push_warning(format!(
                        "Line {}: `.{prop}` rows have different lengths",
                        a.line
                    ));
                }
                if f.policy.cross_check_dimensions {
                    cross_check(f, &a, rows, cols);
                }
            }
            Shape::Unknown => {}
        }
        if has_uncoerced_entries(&a) {
            f.push_fixable(format!(
                "Line {}: `.values` contains true/false/null/undefined entries; write them as strings",
                a.line
            ));
        }
        for hit in self_referencing_cells(&f.script, &a) {
            f.push_fixable(format!(
                "Line {}: formula for {} refers to its own cell (circular reference)",
                hit.line, hit.cell
            ));
        }
    }
}

fn ragged(a: &BulkAssignment) -> bool {
    let Some(LiteralNode::Array { items, .. }) = &a.rhs else {
        return false;
    };
    let widths: Vec<usize> = items
        .iter()
        .filter_map(|row| match row {
            LiteralNode::Array { items, .. } => Some(items.len()),
            _ => None,
        })
        .collect();
    widths.windows(2).any(|w| w[0] != w[1])
}

fn cross_check(f: &mut Findings, a: &BulkAssignment, rows: usize, cols: Option<usize>) {
    let Some(target) = &a.target else {
        return;
    };
    // whole-row and whole-column addresses cannot be sized from the literal
    if target.rows() == MAX_ROWS || target.cols() == MAX_COLS {
        return;
    }
    let expected = (target.rows() as usize, target.cols() as usize);
    let rows_off = rows != expected.0;
    let cols_off = cols.is_some_and(|c| c != expected.1);
    if rows_off || cols_off {
        let actual_cols = cols.map_or_else(|| "?".to_string(), |c| c.to_string());
        f.push_warning(format!(
            "Line {}: range {} is {}x{} but `.{}` literal is {}x{}",
            a.line,
            target.local(),
            expected.0,
            expected.1,
            a.property.as_str(),
            rows,
            actual_cols
        ));
    }
}
