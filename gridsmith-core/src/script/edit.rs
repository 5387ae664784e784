/// A byte-span replacement against a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn replace(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }
}

/// Applies non-overlapping edits. Overlapping edits after the first are dropped.
pub fn apply_edits(source: &str, mut edits: Vec<TextEdit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for e in edits {
        if e.start < cursor || e.end > source.len() {
            continue;
        }
        out.push_str(&source[cursor..e.start]);
        out.push_str(&e.replacement);
        cursor = e.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Leading whitespace of the line containing byte offset `at`.
pub fn indent_at(source: &str, at: usize) -> &str {
    let line_start = source[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let rest = &source[line_start..];
    let len = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    &rest[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_edits_in_order() {
        let out = apply_edits(
            "abc def",
            vec![TextEdit::replace(4, 7, "xyz"), TextEdit::insert(0, ">")],
        );
        assert_eq!(out, ">abc xyz");
    }

    #[test]
    fn drops_overlapping_edit() {
        let out = apply_edits(
            "abcdef",
            vec![TextEdit::replace(0, 3, "X"), TextEdit::replace(2, 4, "Y")],
        );
        assert_eq!(out, "Xdef");
    }

    #[test]
    fn indent_of_line() {
        let src = "a\n    b = 1;";
        assert_eq!(indent_at(src, src.find('b').unwrap()), "    ");
    }
}
