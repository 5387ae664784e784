use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::address::CellRef;

static CELL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$?[A-Z]{1,3}\$?[0-9]+").expect("valid"));

pub fn is_formula(text: &str) -> bool {
    text.trim_start().starts_with('=')
}

/// Byte ranges of unqualified, stand-alone references to `cell` inside
/// `formula`. References inside quoted text, sheet-qualified references,
/// range endpoints and function names (`LOG10(`) are ignored.
pub fn self_references(formula: &str, cell: CellRef) -> Vec<Range<usize>> {
    let masked = mask_quoted(formula);
    let bytes = masked.as_bytes();
    CELL_REF_RE
        .find_iter(&masked)
        .filter(|m| {
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(m.end()).copied();
            let bounded_before = !before.is_some_and(|b| b.is_ascii_alphanumeric() || b"_!:$.'".contains(&b));
            let bounded_after = !after.is_some_and(|b| b.is_ascii_alphanumeric() || b"_(:!".contains(&b));
            bounded_before && bounded_after
        })
        .filter(|m| CellRef::parse(m.as_str()).is_ok_and(|c| c == cell))
        .map(|m| m.range())
        .collect()
}

/// Same byte length as the input, with the contents of `"..."` runs blanked.
fn mask_quoted(formula: &str) -> String {
    let mut inside = false;
    let mut out = String::with_capacity(formula.len());
    for c in formula.chars() {
        if c == '"' {
            inside = !inside;
            out.push(c);
        } else if inside {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> CellRef {
        CellRef::parse(s).unwrap()
    }

    #[test]
    fn finds_direct_self_reference() {
        assert_eq!(self_references("=B5+1", cell("B5")), vec![1..3]);
        assert_eq!(self_references("=SUM(B4,$B$5)", cell("B5")).len(), 1);
    }

    #[test]
    fn ignores_look_alikes() {
        assert!(self_references("=B50+AB5", cell("B5")).is_empty());
        assert!(self_references("=Data!B5", cell("B5")).is_empty());
        assert!(self_references("=SUM(B1:B5)", cell("B5")).is_empty());
        assert!(self_references("=\"B5\"&C1", cell("B5")).is_empty());
        assert!(self_references("=LOG10(2)", cell("LOG10")).is_empty());
    }
}
