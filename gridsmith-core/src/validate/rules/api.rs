use crate::script::{Script, Token, TokenKind};
use crate::validate::validator::Findings;

struct Denied {
    /// Token texts to match in sequence.
    seq: &'static [&'static str],
    /// Only match when not itself a member access (`x.eval(` is fine).
    bare: bool,
    hint: &'static str,
}

const DENYLIST: &[Denied] = &[
    Denied { seq: &["eval", "("], bare: true, hint: "dynamic evaluation is blocked" },
    Denied { seq: &["new", "Function"], bare: true, hint: "dynamic evaluation is blocked" },
    Denied { seq: &["alert", "("], bare: true, hint: "dialogs are unavailable; use console.log" },
    Denied { seq: &["confirm", "("], bare: true, hint: "dialogs are unavailable" },
    Denied { seq: &["prompt", "("], bare: true, hint: "dialogs are unavailable" },
    Denied { seq: &["document", "."], bare: true, hint: "the task pane DOM is not the workbook" },
    Denied { seq: &["window", "."], bare: true, hint: "the task pane window is not the workbook" },
    Denied { seq: &["localStorage"], bare: true, hint: "browser storage is unavailable" },
    Denied { seq: &["sessionStorage"], bare: true, hint: "browser storage is unavailable" },
    Denied { seq: &["XMLHttpRequest"], bare: true, hint: "network access is blocked" },
    Denied { seq: &["fetch", "("], bare: true, hint: "network access is blocked" },
    Denied { seq: &["require", "("], bare: true, hint: "modules cannot be loaded" },
    Denied { seq: &["import"], bare: true, hint: "modules cannot be loaded" },
    Denied { seq: &["setTimeout", "("], bare: true, hint: "timers outlive the request context" },
    Denied { seq: &["setInterval", "("], bare: true, hint: "timers outlive the request context" },
    Denied {
        seq: &[".", "getActiveSheet", "("],
        bare: false,
        hint: "use context.workbook.worksheets.getActiveWorksheet()",
    },
    Denied {
        seq: &[".", "autoFit", "("],
        bare: false,
        hint: "use range.format.autofitColumns()",
    },
    Denied {
        seq: &["Excel", ".", "createWorkbook"],
        bare: false,
        hint: "chunks must edit the open workbook",
    },
];

/// One denylisted call found in a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenUse {
    pub api: String,
    pub line: usize,
    pub hint: &'static str,
}

pub fn forbidden_uses(script: &Script) -> Vec<ForbiddenUse> {
    let tokens = &script.tokens;
    let mut out = Vec::new();
    for i in 0..tokens.len() {
        for rule in DENYLIST {
            if !matches_at(tokens, i, rule) {
                continue;
            }
            let api = rule
                .seq
                .iter()
                .filter(|s| **s != "(")
                .copied()
                .collect::<String>();
            out.push(ForbiddenUse {
                api,
                line: tokens[i].line,
                hint: rule.hint,
            });
        }
    }
    out
}

fn matches_at(tokens: &[Token], i: usize, rule: &Denied) -> bool {
    if rule.bare && i > 0 && tokens[i - 1].is_punct(".") {
        return false;
    }
    rule.seq.iter().enumerate().all(|(k, text)| {
        tokens
            .get(i + k)
            .is_some_and(|t| t.text == *text && matches!(t.kind, TokenKind::Ident | TokenKind::Punct))
    })
}

pub(crate) fn check(f: &mut Findings) {
    for hit in forbidden_uses(&f.script) {
        f.push_error(format!(
            "Line {}: `{}` is not supported in the Office.js runtime ({})",
            hit.line, hit.api, hit.hint
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bare_calls_only() {
        let s = Script::new("eval(\"1\");\nhelpers.eval(x);\nconst t = \"fetch(\";");
        let hits = forbidden_uses(&s);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].api, "eval");
        assert_eq!(hits[0].line, 1);
    }

    #[test]
    fn flags_member_apis() {
        let s = Script::new("range.autoFit();\nss.getActiveSheet();");
        let apis: Vec<String> = forbidden_uses(&s).into_iter().map(|h| h.api).collect();
        assert_eq!(apis, vec![".autoFit", ".getActiveSheet"]);
    }
}
