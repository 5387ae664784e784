use serde::Serialize;

use crate::error::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Template,
    Punct,
    Comment,
}

/// One lexical unit with its byte span in the source it came from.
///
/// For `Str` tokens `text` is the unescaped value; for `Template` tokens it is
/// the raw body between the backticks. Everything else carries its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

impl Token {
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Number | TokenKind::Str | TokenKind::Template
        )
    }

    /// Template literal containing `${...}`.
    pub fn is_interpolated(&self) -> bool {
        self.kind == TokenKind::Template && self.text.contains("${")
    }
}

const PUNCT3: [&str; 6] = ["===", "!==", "...", "**=", "<<=", ">>="];
const PUNCT2: [&str; 19] = [
    "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "+=", "-=", "*=", "/=", "%=", "++",
    "--", "**", "<<", ">>",
];
const PUNCT1: &str = "{}()[];,.:?=+-*/%<>!&|^~";

/// Tokenizes `source`, rejecting unterminated literals and stray characters.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source, true).run()
}

/// Tokenizes `source` without ever failing: unterminated literals run to the
/// end of their line and unknown characters become single-char punctuation.
pub fn tokenize_lossy(source: &str) -> Vec<Token> {
    Lexer::new(source, false).run().unwrap_or_default()
}

/// Lossy tokenization with comments removed.
pub fn code_tokens(source: &str) -> Vec<Token> {
    tokenize_lossy(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    strict: bool,
    out: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, strict: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            strict,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                self.line += 1;
                self.pos += 1;
                continue;
            }
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }
            let start = self.pos;
            let line = self.line;
            if self.starts_with("//") {
                let end = self.src[start..]
                    .find('\n')
                    .map(|i| start + i)
                    .unwrap_or(self.src.len());
                self.pos = end;
                self.push(TokenKind::Comment, self.src[start..end].to_string(), start, line);
            } else if self.starts_with("/*") {
                self.block_comment(start, line)?;
            } else if ch == '"' || ch == '\'' {
                self.string(ch, start, line)?;
            } else if ch == '`' {
                self.template(start, line)?;
            } else if ch.is_ascii_digit()
                || (ch == '.' && self.byte_at(self.pos + 1).is_some_and(|b| b.is_ascii_digit()))
            {
                self.number(start, line);
            } else if is_ident_start(ch) {
                while let Some(c) = self.peek_char() {
                    if is_ident_continue(c) {
                        self.pos += c.len_utf8();
                    } else {
                        break;
                    }
                }
                self.push(TokenKind::Ident, self.src[start..self.pos].to_string(), start, line);
            } else {
                self.punct(ch, start, line)?;
            }
        }
        Ok(self.out)
    }

    fn push(&mut self, kind: TokenKind, text: String, start: usize, line: usize) {
        self.out.push(Token {
            kind,
            text,
            start,
            end: self.pos,
            line,
        });
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn byte_at(&self, idx: usize) -> Option<u8> {
        self.bytes.get(idx).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn block_comment(&mut self, start: usize, line: usize) -> Result<(), ScriptError> {
        match self.src[start + 2..].find("*/") {
            Some(i) => {
                let end = start + 2 + i + 2;
                self.line += self.src[start..end].matches('\n').count();
                self.pos = end;
            }
            None => {
                if self.strict {
                    return Err(ScriptError::UnterminatedComment { line });
                }
                self.line += self.src[start..].matches('\n').count();
                self.pos = self.src.len();
            }
        }
        self.push(TokenKind::Comment, self.src[start..self.pos].to_string(), start, line);
        Ok(())
    }

    fn string(&mut self, quote: char, start: usize, line: usize) -> Result<(), ScriptError> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                if self.strict {
                    return Err(ScriptError::UnterminatedString { line });
                }
                break;
            };
            if c == '\n' {
                if self.strict {
                    return Err(ScriptError::UnterminatedString { line });
                }
                break;
            }
            self.pos += c.len_utf8();
            if c == quote {
                break;
            }
            if c == '\\' {
                if let Some(esc) = self.peek_char() {
                    self.pos += esc.len_utf8();
                    value.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                continue;
            }
            value.push(c);
        }
        self.push(TokenKind::Str, value, start, line);
        Ok(())
    }

    fn template(&mut self, start: usize, line: usize) -> Result<(), ScriptError> {
        self.pos += 1;
        let body_start = self.pos;
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek_char() else {
                if self.strict {
                    return Err(ScriptError::UnterminatedTemplate { line });
                }
                let body = self.src[body_start..].to_string();
                self.push(TokenKind::Template, body, start, line);
                return Ok(());
            };
            if c == '\n' {
                self.line += 1;
            }
            if c == '\\' {
                self.pos += 1;
                if let Some(esc) = self.peek_char() {
                    self.pos += esc.len_utf8();
                }
                continue;
            }
            if depth == 0 && c == '`' {
                let body = self.src[body_start..self.pos].to_string();
                self.pos += 1;
                self.push(TokenKind::Template, body, start, line);
                return Ok(());
            }
            if c == '$' && self.byte_at(self.pos + 1) == Some(b'{') {
                depth += 1;
                self.pos += 2;
                continue;
            }
            if depth > 0 && c == '}' {
                depth -= 1;
            } else if depth > 0 && c == '{' {
                depth += 1;
            }
            self.pos += c.len_utf8();
        }
    }

    fn number(&mut self, start: usize, line: usize) {
        if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            while self.byte_at(self.pos).is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
        } else {
            while let Some(b) = self.byte_at(self.pos) {
                let exp_sign = (b == b'+' || b == b'-')
                    && matches!(self.byte_at(self.pos - 1), Some(b'e') | Some(b'E'));
                if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'_' || exp_sign
                {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.push(TokenKind::Number, self.src[start..self.pos].to_string(), start, line);
    }

    fn punct(&mut self, ch: char, start: usize, line: usize) -> Result<(), ScriptError> {
        for p in PUNCT3.iter().chain(PUNCT2.iter()) {
            if self.starts_with(p) {
                self.pos += p.len();
                self.push(TokenKind::Punct, (*p).to_string(), start, line);
                return Ok(());
            }
        }
        if !PUNCT1.contains(ch) && self.strict {
            return Err(ScriptError::UnexpectedChar { line, ch });
        }
        self.pos += ch.len_utf8();
        self.push(TokenKind::Punct, ch.to_string(), start, line);
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Index of the token closing the bracket opened at `open`, skipping comments.
pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let (o, c) = match tokens.get(open)?.text.as_str() {
        "(" => ("(", ")"),
        "[" => ("[", "]"),
        "{" => ("{", "}"),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.kind != TokenKind::Punct {
            continue;
        }
        if t.text == o {
            depth += 1;
        } else if t.text == c {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_range_assignment() {
        let toks = tokenize(r#"sheet.getRange("A1").values = [["x"]];"#).unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "sheet", ".", "getRange", "(", "A1", ")", ".", "values", "=", "[", "[", "x", "]",
                "]", ";"
            ]
        );
        assert_eq!(toks[4].kind, TokenKind::Str);
    }

    #[test]
    fn tracks_lines_and_comments() {
        let toks = tokenize("// header\nconst a = 1;\n/* x\n y */ let b = `t${a}`;").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Comment);
        let b = toks.iter().find(|t| t.text == "b").unwrap();
        assert_eq!(b.line, 4);
        assert!(toks.iter().any(|t| t.is_interpolated()));
    }

    #[test]
    fn strict_mode_rejects_unterminated_string() {
        let err = tokenize("const a = \"oops;\nconst b = 2;").unwrap_err();
        assert_eq!(err, ScriptError::UnterminatedString { line: 1 });
        assert!(!tokenize_lossy("const a = \"oops;\nconst b = 2;").is_empty());
    }

    #[test]
    fn multi_char_operators() {
        let toks = tokenize("a === b => c?.d").unwrap();
        assert!(toks[1].is_punct("==="));
        assert!(toks[3].is_punct("=>"));
        assert!(toks[5].is_punct("?."));
    }

    #[test]
    fn finds_matching_close() {
        let toks = tokenize("f(a, [1, (2)], {b: 3})").unwrap();
        assert_eq!(matching_close(&toks, 1), Some(toks.len() - 1));
    }
}
