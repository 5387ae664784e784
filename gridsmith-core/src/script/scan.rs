//! Structural queries over a token stream: wrapper, routines, call sites,
//! bulk assignments, range and sheet-name literals.

use std::collections::HashMap;

use serde::Serialize;

use crate::address::RangeAddress;
use crate::script::lexer::{code_tokens, matching_close, tokenize_lossy, Token, TokenKind};
use crate::script::literal::{parse_literal, LiteralNode, Shape};

/// Source text plus its comment-free tokens.
#[derive(Debug, Clone)]
pub struct Script<'a> {
    pub source: &'a str,
    pub tokens: Vec<Token>,
}

impl<'a> Script<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: code_tokens(source),
        }
    }

    pub fn comment_count(&self) -> usize {
        tokenize_lossy(self.source)
            .iter()
            .filter(|t| t.kind == TokenKind::Comment)
            .count()
    }

    pub fn text(&self, first: usize, last: usize) -> &'a str {
        &self.source[self.tokens[first].start..self.tokens[last].end]
    }

    pub fn wrapper(&self) -> Option<Wrapper> {
        find_wrapper(&self.tokens)
    }

    pub fn functions(&self) -> Vec<FunctionDecl> {
        find_functions(&self.tokens)
    }

    pub fn bulk_assignments(&self) -> Vec<BulkAssignment> {
        find_bulk_assignments(&self.tokens)
    }

    pub fn range_literals(&self) -> Vec<RangeLiteral> {
        find_range_literals(&self.tokens)
    }

    pub fn sheet_name_refs(&self) -> Vec<SheetNameRef> {
        find_sheet_name_refs(&self.tokens)
    }

    pub fn balance(&self) -> Balance {
        Balance::of(&self.tokens)
    }

    /// Call sites of `name` outside of `exclude` (a token span, usually the
    /// routine's own body).
    pub fn call_sites(&self, name: &str, exclude: Option<(usize, usize)>) -> Vec<usize> {
        find_call_sites(&self.tokens, name, exclude)
    }

    pub fn sync_calls(&self) -> Vec<usize> {
        (0..self.tokens.len())
            .filter(|&i| is_member_call(&self.tokens, i, "sync"))
            .collect()
    }

    /// `sync()` calls that sit inside a `for`/`while`/`do` body.
    pub fn syncs_in_loops(&self) -> Vec<usize> {
        let loops = loop_bodies(&self.tokens);
        self.sync_calls()
            .into_iter()
            .filter(|i| loops.iter().any(|(a, b)| a < i && i < b))
            .collect()
    }

    pub fn has_try(&self) -> bool {
        self.tokens
            .windows(2)
            .any(|w| w[0].is_ident("try") && w[1].is_punct("{"))
    }

    pub fn mentions_member(&self, name: &str) -> bool {
        self.tokens
            .windows(2)
            .any(|w| w[0].is_punct(".") && w[1].is_ident(name))
    }
}

/// `Excel.run(async (context) => { ... })`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wrapper {
    /// Token index of `Excel`.
    pub start: usize,
    /// Index of the `(` after `run`.
    pub call_open: usize,
    pub call_close: Option<usize>,
    pub body_open: usize,
    pub body_close: Option<usize>,
    pub context_param: Option<String>,
}

pub fn find_wrapper(tokens: &[Token]) -> Option<Wrapper> {
    let n = tokens.len();
    for i in 0..n.saturating_sub(3) {
        if !(tokens[i].is_ident("Excel")
            && tokens[i + 1].is_punct(".")
            && tokens[i + 2].is_ident("run")
            && tokens[i + 3].is_punct("("))
        {
            continue;
        }
        let call_open = i + 3;
        let call_close = matching_close(tokens, call_open);
        let limit = call_close.unwrap_or(n);
        let mut j = call_open + 1;
        let mut context_param = None;
        if tokens.get(j).is_some_and(|t| t.is_ident("async")) {
            j += 1;
        }
        if tokens.get(j).is_some_and(|t| t.is_ident("function")) {
            j += 1;
        }
        if tokens.get(j).is_some_and(|t| t.is_punct("(")) {
            let close = matching_close(tokens, j)?;
            if close > j + 1 && tokens[j + 1].is_word() {
                context_param = Some(tokens[j + 1].text.clone());
            }
            j = close + 1;
        } else if tokens.get(j).is_some_and(|t| t.is_word()) {
            context_param = Some(tokens[j].text.clone());
            j += 1;
        }
        if tokens.get(j).is_some_and(|t| t.is_punct("=>")) {
            j += 1;
        }
        let body_open = (j..limit).find(|&k| tokens[k].is_punct("{"))?;
        return Some(Wrapper {
            start: i,
            call_open,
            call_close,
            body_open,
            body_close: matching_close(tokens, body_open),
            context_param,
        });
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclStyle {
    Function,
    ArrowBinding,
    FunctionExpressionBinding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub is_async: bool,
    pub style: DeclStyle,
    pub line: usize,
    /// Token index of the name.
    pub name_idx: usize,
    pub params_open: usize,
    pub params_close: usize,
    pub body_open: Option<usize>,
    pub body_close: Option<usize>,
}

impl FunctionDecl {
    pub fn body_span(&self) -> Option<(usize, usize)> {
        Some((self.body_open?, self.body_close?))
    }

    /// Office Scripts entry points (`main(workbook: ExcelScript.Workbook)`).
    pub fn is_dialect_entry(&self, tokens: &[Token]) -> bool {
        tokens[self.params_open..=self.params_close]
            .iter()
            .any(|t| t.is_ident("ExcelScript"))
    }
}

pub fn find_functions(tokens: &[Token]) -> Vec<FunctionDecl> {
    let mut out = Vec::new();
    let n = tokens.len();
    let mut i = 0;
    while i < n {
        let t = &tokens[i];
        if t.is_ident("function")
            && tokens.get(i + 1).is_some_and(|t| t.is_word())
            && tokens.get(i + 2).is_some_and(|t| t.is_punct("("))
            && !(i > 0 && tokens[i - 1].is_punct("="))
        {
            let is_async = i > 0 && tokens[i - 1].is_ident("async");
            if let Some(decl) = build_decl(tokens, i + 1, i + 2, is_async, DeclStyle::Function) {
                out.push(decl);
            }
        } else if matches!(t.text.as_str(), "const" | "let" | "var")
            && t.kind == TokenKind::Ident
            && tokens.get(i + 1).is_some_and(|t| t.is_word())
            && tokens.get(i + 2).is_some_and(|t| t.is_punct("="))
        {
            let name_idx = i + 1;
            let mut j = i + 3;
            let is_async = tokens.get(j).is_some_and(|t| t.is_ident("async"));
            if is_async {
                j += 1;
            }
            if tokens.get(j).is_some_and(|t| t.is_ident("function")) {
                j += 1;
                if tokens.get(j).is_some_and(|t| t.is_word()) {
                    j += 1;
                }
                if tokens.get(j).is_some_and(|t| t.is_punct("(")) {
                    if let Some(decl) = build_decl(
                        tokens,
                        name_idx,
                        j,
                        is_async,
                        DeclStyle::FunctionExpressionBinding,
                    ) {
                        out.push(decl);
                    }
                }
            } else if tokens.get(j).is_some_and(|t| t.is_punct("(")) {
                if let Some(close) = matching_close(tokens, j) {
                    if tokens.get(close + 1).is_some_and(|t| t.is_punct("=>")) {
                        if let Some(decl) =
                            build_decl(tokens, name_idx, j, is_async, DeclStyle::ArrowBinding)
                        {
                            out.push(decl);
                        }
                    }
                }
            } else if tokens.get(j).is_some_and(|t| t.is_word())
                && tokens.get(j + 1).is_some_and(|t| t.is_punct("=>"))
            {
                let body_open = tokens.get(j + 2).filter(|t| t.is_punct("{")).map(|_| j + 2);
                out.push(FunctionDecl {
                    name: tokens[name_idx].text.clone(),
                    is_async,
                    style: DeclStyle::ArrowBinding,
                    line: tokens[name_idx].line,
                    name_idx,
                    params_open: j,
                    params_close: j,
                    body_open,
                    body_close: body_open.and_then(|b| matching_close(tokens, b)),
                });
            }
        }
        i += 1;
    }
    out
}

fn build_decl(
    tokens: &[Token],
    name_idx: usize,
    params_open: usize,
    is_async: bool,
    style: DeclStyle,
) -> Option<FunctionDecl> {
    let params_close = matching_close(tokens, params_open)?;
    let mut k = params_close + 1;
    // return-type annotation or arrow
    while k < tokens.len() && !tokens[k].is_punct("{") && !tokens[k].is_punct(";") {
        if tokens[k].is_punct("=>") && !tokens.get(k + 1).is_some_and(|t| t.is_punct("{")) {
            break;
        }
        k += 1;
    }
    let body_open = tokens.get(k).filter(|t| t.is_punct("{")).map(|_| k);
    Some(FunctionDecl {
        name: tokens[name_idx].text.clone(),
        is_async,
        style,
        line: tokens[name_idx].line,
        name_idx,
        params_open,
        params_close,
        body_open,
        body_close: body_open.and_then(|b| matching_close(tokens, b)),
    })
}

pub fn find_call_sites(tokens: &[Token], name: &str, exclude: Option<(usize, usize)>) -> Vec<usize> {
    let mut out = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        if !t.is_ident(name) {
            continue;
        }
        if let Some((a, b)) = exclude {
            if a <= i && i <= b {
                continue;
            }
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        if prev.is_some_and(|p| p.is_ident("function")) {
            continue;
        }
        let next = tokens.get(i + 1);
        let direct = next.is_some_and(|n| n.is_punct("("));
        let indirect = next.is_some_and(|n| n.is_punct("."))
            && tokens
                .get(i + 2)
                .is_some_and(|n| n.is_ident("call") || n.is_ident("apply"))
            && tokens.get(i + 3).is_some_and(|n| n.is_punct("("));
        if direct || indirect {
            out.push(i);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkProperty {
    Values,
    Formulas,
    NumberFormat,
}

impl BulkProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "values" => Some(BulkProperty::Values),
            "formulas" => Some(BulkProperty::Formulas),
            "numberFormat" => Some(BulkProperty::NumberFormat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BulkProperty::Values => "values",
            BulkProperty::Formulas => "formulas",
            BulkProperty::NumberFormat => "numberFormat",
        }
    }
}

/// `<target>.values|formulas|numberFormat = <rhs>`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAssignment {
    pub property: BulkProperty,
    pub line: usize,
    pub prop_idx: usize,
    pub eq_idx: usize,
    /// First token of the right-hand side.
    pub rhs_start: usize,
    /// One past the last right-hand-side token.
    pub rhs_end: usize,
    pub rhs: Option<LiteralNode>,
    pub target: Option<RangeAddress>,
}

impl BulkAssignment {
    pub fn shape(&self) -> Shape {
        match &self.rhs {
            Some(node) if node.last() + 1 == self.rhs_end => node.shape(),
            _ => Shape::Unknown,
        }
    }
}

pub fn find_bulk_assignments(tokens: &[Token]) -> Vec<BulkAssignment> {
    let bindings = range_bindings(tokens);
    let mut out = Vec::new();
    for i in 1..tokens.len().saturating_sub(1) {
        let Some(property) = BulkProperty::from_name(&tokens[i].text) else {
            continue;
        };
        if tokens[i].kind != TokenKind::Ident
            || !tokens[i - 1].is_punct(".")
            || !tokens[i + 1].is_punct("=")
        {
            continue;
        }
        let rhs_start = i + 2;
        let rhs_end = statement_end(tokens, rhs_start);
        let rhs = parse_literal(tokens, rhs_start, rhs_end).map(|(node, _)| node);
        out.push(BulkAssignment {
            property,
            line: tokens[i].line,
            prop_idx: i,
            eq_idx: i + 1,
            rhs_start,
            rhs_end,
            rhs,
            target: target_address(tokens, i - 1, &bindings),
        });
    }
    out
}

/// End (exclusive) of the expression statement starting at `start`.
pub fn statement_end(tokens: &[Token], start: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;
    while i < tokens.len() {
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
                ";" if depth == 0 => return i,
                _ => {}
            }
        } else if depth == 0 && i > start && t.line > tokens[i - 1].line && ends_expression(&tokens[i - 1]) {
            return i;
        }
        i += 1;
    }
    tokens.len()
}

fn ends_expression(t: &Token) -> bool {
    t.is_literal() || t.is_word() || t.is_punct(")") || t.is_punct("]")
}

/// Resolves the range a member chain ending at `dot_idx` refers to.
fn target_address(
    tokens: &[Token],
    dot_idx: usize,
    bindings: &HashMap<String, RangeAddress>,
) -> Option<RangeAddress> {
    let before = dot_idx.checked_sub(1)?;
    let t = &tokens[before];
    if t.is_punct(")") {
        let open = matching_open(tokens, before)?;
        let callee = tokens.get(open.checked_sub(1)?)?;
        if callee.is_ident("getRange") && open + 2 == before && tokens[open + 1].kind == TokenKind::Str
        {
            return RangeAddress::parse(&tokens[open + 1].text).ok();
        }
        return None;
    }
    if t.is_word() && !(before > 0 && tokens[before - 1].is_punct(".")) {
        return bindings.get(&t.text).cloned();
    }
    None
}

/// `const x = <...>.getRange("ADDR");` bindings.
fn range_bindings(tokens: &[Token]) -> HashMap<String, RangeAddress> {
    let mut out = HashMap::new();
    for i in 0..tokens.len().saturating_sub(3) {
        if !(matches!(tokens[i].text.as_str(), "const" | "let" | "var")
            && tokens[i + 1].is_word()
            && tokens[i + 2].is_punct("="))
        {
            continue;
        }
        let end = statement_end(tokens, i + 3);
        if end < 4 || end - 1 <= i + 3 {
            continue;
        }
        let last = end - 1;
        if tokens[last].is_punct(")")
            && last >= 3
            && tokens[last - 1].kind == TokenKind::Str
            && tokens[last - 2].is_punct("(")
            && tokens[last - 3].is_ident("getRange")
        {
            if let Ok(addr) = RangeAddress::parse(&tokens[last - 1].text) {
                out.insert(tokens[i + 1].text.clone(), addr);
            }
        }
    }
    out
}

pub fn matching_open(tokens: &[Token], close: usize) -> Option<usize> {
    let (o, c) = match tokens.get(close)?.text.as_str() {
        ")" => ("(", ")"),
        "]" => ("[", "]"),
        "}" => ("{", "}"),
        _ => return None,
    };
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        let t = &tokens[i];
        if t.kind != TokenKind::Punct {
            continue;
        }
        if t.text == c {
            depth += 1;
        } else if t.text == o {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// `getRange("...")` string arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeLiteral {
    pub str_idx: usize,
    pub text: String,
    pub line: usize,
    pub address: Option<RangeAddress>,
}

pub fn find_range_literals(tokens: &[Token]) -> Vec<RangeLiteral> {
    let mut out = Vec::new();
    for i in 0..tokens.len().saturating_sub(3) {
        if tokens[i].is_ident("getRange")
            && tokens[i + 1].is_punct("(")
            && tokens[i + 2].kind == TokenKind::Str
            && tokens[i + 3].is_punct(")")
        {
            out.push(RangeLiteral {
                str_idx: i + 2,
                text: tokens[i + 2].text.clone(),
                line: tokens[i + 2].line,
                address: RangeAddress::parse(&tokens[i + 2].text).ok(),
            });
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetMethod {
    GetItem,
    GetItemOrNullObject,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetNameRef {
    pub method: SheetMethod,
    /// Index of the method name token.
    pub method_idx: usize,
    pub str_idx: usize,
    pub close_idx: usize,
    pub name: String,
    pub line: usize,
}

pub fn find_sheet_name_refs(tokens: &[Token]) -> Vec<SheetNameRef> {
    let mut out = Vec::new();
    for i in 2..tokens.len().saturating_sub(3) {
        let method = match tokens[i].text.as_str() {
            "getItem" => SheetMethod::GetItem,
            "getItemOrNullObject" => SheetMethod::GetItemOrNullObject,
            "add" => SheetMethod::Add,
            _ => continue,
        };
        if !(tokens[i - 1].is_punct(".")
            && tokens[i - 2].is_ident("worksheets")
            && tokens[i + 1].is_punct("(")
            && tokens[i + 2].kind == TokenKind::Str
            && tokens[i + 3].is_punct(")"))
        {
            continue;
        }
        out.push(SheetNameRef {
            method,
            method_idx: i,
            str_idx: i + 2,
            close_idx: i + 3,
            name: tokens[i + 2].text.clone(),
            line: tokens[i].line,
        });
    }
    out
}

/// Net delimiter balance; positive means unclosed openers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub braces: i64,
    pub parens: i64,
    pub brackets: i64,
}

impl Balance {
    pub fn of(tokens: &[Token]) -> Self {
        let mut b = Balance::default();
        for t in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
            match t.text.as_str() {
                "{" => b.braces += 1,
                "}" => b.braces -= 1,
                "(" => b.parens += 1,
                ")" => b.parens -= 1,
                "[" => b.brackets += 1,
                "]" => b.brackets -= 1,
                _ => {}
            }
        }
        b
    }

    pub fn is_balanced(&self) -> bool {
        self.braces == 0 && self.parens == 0 && self.brackets == 0
    }
}

fn is_member_call(tokens: &[Token], i: usize, name: &str) -> bool {
    tokens[i].is_ident(name)
        && i > 0
        && tokens[i - 1].is_punct(".")
        && tokens.get(i + 1).is_some_and(|t| t.is_punct("("))
}

fn loop_bodies(tokens: &[Token]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        if t.is_ident("do") && tokens.get(i + 1).is_some_and(|t| t.is_punct("{")) {
            if let Some(close) = matching_close(tokens, i + 1) {
                out.push((i + 1, close));
            }
            continue;
        }
        let is_loop = t.is_ident("for") || t.is_ident("while");
        let is_method_loop = (t.is_ident("forEach") || t.is_ident("map"))
            && i > 0
            && tokens[i - 1].is_punct(".");
        if !(is_loop || is_method_loop) || !tokens.get(i + 1).is_some_and(|t| t.is_punct("(")) {
            continue;
        }
        let Some(head_close) = matching_close(tokens, i + 1) else {
            continue;
        };
        if is_method_loop {
            out.push((i + 1, head_close));
        } else if tokens.get(head_close + 1).is_some_and(|t| t.is_punct("{")) {
            if let Some(close) = matching_close(tokens, head_close + 1) {
                out.push((head_close + 1, close));
            }
        } else {
            out.push((head_close, statement_end(tokens, head_close + 1)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED: &str = r#"await Excel.run(async (context) => {
    const sheet = context.workbook.worksheets.getActiveWorksheet();
    const header = sheet.getRange("A1:C1");
    header.values = [["Year", "Revenue", "Cost"]];
    sheet.getRange("A2").values = "x";
    await context.sync();
});"#;

    #[test]
    fn finds_wrapper_and_context_param() {
        let s = Script::new(WRAPPED);
        let w = s.wrapper().unwrap();
        assert_eq!(w.context_param.as_deref(), Some("context"));
        assert!(w.body_close.is_some());
        assert!(w.call_close.is_some());
    }

    #[test]
    fn resolves_bulk_targets_through_bindings() {
        let s = Script::new(WRAPPED);
        let bulk = s.bulk_assignments();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[0].target.as_ref().unwrap().local(), "A1:C1");
        assert_eq!(
            bulk[0].shape(),
            Shape::TwoLevel {
                rows: 1,
                cols: Some(3)
            }
        );
        assert_eq!(bulk[1].shape(), Shape::Scalar);
        assert_eq!(bulk[1].line, 5);
    }

    #[test]
    fn detects_declaration_styles() {
        let src = r#"
async function buildModel(context) { }
function helper() {}
const fmt = async (r) => { r.format.font.bold = true; };
const calc = function () { return 1; };
let single = x => x * 2;
"#;
        let s = Script::new(src);
        let names: Vec<(String, bool)> = s
            .functions()
            .into_iter()
            .map(|f| (f.name, f.is_async))
            .collect();
        assert_eq!(
            names,
            vec![
                ("buildModel".to_string(), true),
                ("helper".to_string(), false),
                ("fmt".to_string(), true),
                ("calc".to_string(), false),
                ("single".to_string(), false),
            ]
        );
    }

    #[test]
    fn call_sites_ignore_own_body() {
        let src = "function again() { again(); }\nconst x = 1;";
        let s = Script::new(src);
        let f = &s.functions()[0];
        assert!(s.call_sites(&f.name, f.body_span()).is_empty());
        let src2 = "function a() {}\nawait a();\nobj.a();\na.call(null);";
        let s2 = Script::new(src2);
        assert_eq!(s2.call_sites("a", None).len(), 3);
    }

    #[test]
    fn sync_inside_loop_is_detected() {
        let src = "for (let i = 0; i < 3; i++) { await context.sync(); }\nawait context.sync();";
        let s = Script::new(src);
        assert_eq!(s.sync_calls().len(), 2);
        assert_eq!(s.syncs_in_loops().len(), 1);
    }

    #[test]
    fn reports_unbalanced_delimiters() {
        let s = Script::new("Excel.run(async (context) => { const a = [1, 2;");
        let b = s.balance();
        assert_eq!(b.braces, 1);
        assert_eq!(b.parens, 1);
        assert_eq!(b.brackets, 1);
    }
}
