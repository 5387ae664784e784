use serde::Serialize;

use crate::script::lexer::{matching_close, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Str,
    Number,
    Bool,
    Null,
    Undefined,
    Template,
}

/// A literal parsed out of token stream positions `first..=last`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralNode {
    Scalar {
        kind: ScalarKind,
        first: usize,
        last: usize,
    },
    Array {
        open: usize,
        close: usize,
        items: Vec<LiteralNode>,
    },
    /// Anything we cannot size statically: identifiers, calls, spreads.
    Opaque { first: usize, last: usize },
}

/// Static shape of an assigned value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum Shape {
    Scalar,
    OneLevel { len: usize },
    TwoLevel { rows: usize, cols: Option<usize> },
    Unknown,
}

impl LiteralNode {
    pub fn first(&self) -> usize {
        match self {
            LiteralNode::Scalar { first, .. } | LiteralNode::Opaque { first, .. } => *first,
            LiteralNode::Array { open, .. } => *open,
        }
    }

    pub fn last(&self) -> usize {
        match self {
            LiteralNode::Scalar { last, .. } | LiteralNode::Opaque { last, .. } => *last,
            LiteralNode::Array { close, .. } => *close,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, LiteralNode::Scalar { .. })
    }

    pub fn shape(&self) -> Shape {
        match self {
            LiteralNode::Scalar { .. } => Shape::Scalar,
            LiteralNode::Opaque { .. } => Shape::Unknown,
            LiteralNode::Array { items, .. } => {
                if items.is_empty() {
                    return Shape::Unknown;
                }
                if items.iter().all(LiteralNode::is_scalar) {
                    return Shape::OneLevel { len: items.len() };
                }
                if items.iter().all(|i| matches!(i, LiteralNode::Array { .. })) {
                    let widths: Vec<Option<usize>> = items
                        .iter()
                        .map(|row| match row {
                            LiteralNode::Array { items, .. }
                                if items.iter().all(|c| !matches!(c, LiteralNode::Opaque { .. })) =>
                            {
                                Some(items.len())
                            }
                            _ => None,
                        })
                        .collect();
                    let cols = match widths.first().copied().flatten() {
                        Some(w) if widths.iter().all(|x| *x == Some(w)) => Some(w),
                        _ => None,
                    };
                    return Shape::TwoLevel {
                        rows: items.len(),
                        cols,
                    };
                }
                Shape::Unknown
            }
        }
    }

    /// Scalars nested inside this literal with their (row, col) position when
    /// the literal is two-level.
    pub fn grid_cells(&self) -> Vec<(usize, usize, &LiteralNode)> {
        let mut out = Vec::new();
        if let LiteralNode::Array { items, .. } = self {
            for (r, row) in items.iter().enumerate() {
                if let LiteralNode::Array { items, .. } = row {
                    for (c, cell) in items.iter().enumerate() {
                        out.push((r, c, cell));
                    }
                }
            }
        }
        out
    }

    pub fn scalars(&self) -> Vec<&LiteralNode> {
        let mut out = Vec::new();
        self.collect_scalars(&mut out);
        out
    }

    fn collect_scalars<'a>(&'a self, out: &mut Vec<&'a LiteralNode>) {
        match self {
            LiteralNode::Scalar { .. } => out.push(self),
            LiteralNode::Array { items, .. } => items.iter().for_each(|i| i.collect_scalars(out)),
            LiteralNode::Opaque { .. } => {}
        }
    }
}

/// Bracket nesting past which a literal is no longer sized.
pub const MAX_LITERAL_DEPTH: usize = 32;

/// Parses one value starting at `start`, stopping before `end`. Returns the
/// node and the index just past it. Arrays nested deeper than
/// [`MAX_LITERAL_DEPTH`] come back as a single opaque node.
pub fn parse_literal(tokens: &[Token], start: usize, end: usize) -> Option<(LiteralNode, usize)> {
    let first = tokens.get(start)?;
    if start >= end {
        return None;
    }
    if first.is_punct("[") {
        let close = matching_close(tokens, start).filter(|c| *c < end)?;
        if bracket_depth(&tokens[start..=close]) > MAX_LITERAL_DEPTH {
            return Some((
                LiteralNode::Opaque {
                    first: start,
                    last: close,
                },
                close + 1,
            ));
        }
        return Some(parse_array(tokens, start, close));
    }
    parse_value(tokens, start, end)
}

fn parse_array(tokens: &[Token], start: usize, close: usize) -> (LiteralNode, usize) {
    let mut items = Vec::new();
    let mut i = start + 1;
    while i < close {
        if tokens[i].is_punct(",") {
            i += 1;
            continue;
        }
        let item_end = element_end(tokens, i, close);
        let node = if tokens[i].is_punct("[") && matching_close(tokens, i) == Some(item_end - 1) {
            Some(parse_array(tokens, i, item_end - 1))
        } else {
            parse_value(tokens, i, item_end)
        };
        match node {
            Some((node, next)) if next == item_end => items.push(node),
            _ => items.push(LiteralNode::Opaque {
                first: i,
                last: item_end.saturating_sub(1).max(i),
            }),
        }
        i = item_end;
    }
    (
        LiteralNode::Array {
            open: start,
            close,
            items,
        },
        close + 1,
    )
}

/// A scalar or opaque value at `start`.
fn parse_value(tokens: &[Token], start: usize, end: usize) -> Option<(LiteralNode, usize)> {
    let first = tokens.get(start)?;
    if start >= end {
        return None;
    }
    if let Some(kind) = scalar_kind(first) {
        return Some((
            LiteralNode::Scalar {
                kind,
                first: start,
                last: start,
            },
            start + 1,
        ));
    }
    if first.is_punct("-")
        && tokens
            .get(start + 1)
            .is_some_and(|t| t.kind == TokenKind::Number)
        && start + 1 < end
    {
        return Some((
            LiteralNode::Scalar {
                kind: ScalarKind::Number,
                first: start,
                last: start + 1,
            },
            start + 2,
        ));
    }
    let item_end = element_end(tokens, start, end);
    Some((
        LiteralNode::Opaque {
            first: start,
            last: item_end.saturating_sub(1).max(start),
        },
        item_end,
    ))
}

fn scalar_kind(t: &Token) -> Option<ScalarKind> {
    match t.kind {
        TokenKind::Str => Some(ScalarKind::Str),
        TokenKind::Number => Some(ScalarKind::Number),
        TokenKind::Template if !t.is_interpolated() => Some(ScalarKind::Template),
        TokenKind::Ident => match t.text.as_str() {
            "true" | "false" => Some(ScalarKind::Bool),
            "null" => Some(ScalarKind::Null),
            "undefined" => Some(ScalarKind::Undefined),
            _ => None,
        },
        _ => None,
    }
}

/// Deepest bracket nesting inside `tokens`.
fn bracket_depth(tokens: &[Token]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for t in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        match t.text.as_str() {
            "(" | "[" | "{" => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// End (exclusive) of a comma-separated element beginning at `start`.
fn element_end(tokens: &[Token], start: usize, limit: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;
    while i < limit {
        let t = &tokens[i];
        if t.kind == TokenKind::Punct {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    if depth == 0 {
                        return i;
                    }
                    depth -= 1;
                }
                "," | ";" if depth == 0 => return i,
                _ => {}
            }
        }
        i += 1;
    }
    limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::code_tokens;

    fn shape_of(src: &str) -> Shape {
        let toks = code_tokens(src);
        let (node, _) = parse_literal(&toks, 0, toks.len()).unwrap();
        node.shape()
    }

    #[test]
    fn classifies_shapes() {
        assert_eq!(shape_of(r#""x""#), Shape::Scalar);
        assert_eq!(shape_of("-5"), Shape::Scalar);
        assert_eq!(shape_of(r#"["a", 1, true]"#), Shape::OneLevel { len: 3 });
        assert_eq!(
            shape_of("[[1, 2], [3, 4], [5, 6]]"),
            Shape::TwoLevel {
                rows: 3,
                cols: Some(2)
            }
        );
        assert_eq!(
            shape_of("[[1, 2], [3]]"),
            Shape::TwoLevel {
                rows: 2,
                cols: None
            }
        );
        assert_eq!(shape_of("rows"), Shape::Unknown);
        assert_eq!(shape_of("[a, b]"), Shape::Unknown);
    }

    #[test]
    fn grid_positions() {
        let toks = code_tokens(r#"[["=A1", 2], [null, "x"]]"#);
        let (node, _) = parse_literal(&toks, 0, toks.len()).unwrap();
        let cells = node.grid_cells();
        assert_eq!(cells.len(), 4);
        assert_eq!((cells[2].0, cells[2].1), (1, 0));
        assert!(matches!(
            cells[2].2,
            LiteralNode::Scalar {
                kind: ScalarKind::Null,
                ..
            }
        ));
    }

    #[test]
    fn nesting_past_the_cap_is_opaque() {
        let within = format!("{}1{}", "[".repeat(MAX_LITERAL_DEPTH), "]".repeat(MAX_LITERAL_DEPTH));
        let toks = code_tokens(&within);
        let (node, next) = parse_literal(&toks, 0, toks.len()).unwrap();
        assert!(matches!(node, LiteralNode::Array { .. }));
        assert_eq!(next, toks.len());

        let deep = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        let toks = code_tokens(&deep);
        let (node, next) = parse_literal(&toks, 0, toks.len()).unwrap();
        assert_eq!(node.shape(), Shape::Unknown);
        assert_eq!((node.first(), node.last()), (0, toks.len() - 1));
        assert_eq!(next, toks.len());
    }
}
