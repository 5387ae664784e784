use crate::script::{FunctionDecl, Script, Token};
use crate::validate::validator::Findings;

/// Declared routines with no call site anywhere outside their own body.
///
/// A routine passed by name as an argument (`rows.forEach(styleRow)`) counts
/// as called. Office Scripts entry points are left to the dialect check.
pub fn uncalled_routines(script: &Script) -> Vec<FunctionDecl> {
    script
        .functions()
        .into_iter()
        .filter(|f| !f.is_dialect_entry(&script.tokens))
        .filter(|f| {
            script.call_sites(&f.name, f.body_span()).is_empty()
                && !passed_as_argument(&script.tokens, f)
        })
        .collect()
}

fn passed_as_argument(tokens: &[Token], f: &FunctionDecl) -> bool {
    tokens.iter().enumerate().any(|(i, t)| {
        if i == f.name_idx || !t.is_ident(&f.name) || i == 0 {
            return false;
        }
        let prev = &tokens[i - 1];
        let next = tokens.get(i + 1);
        (prev.is_punct("(") || prev.is_punct(","))
            && next.is_some_and(|n| n.is_punct(")") || n.is_punct(","))
            && !(f.params_open..=f.params_close).contains(&i)
    })
}

pub(crate) fn check(f: &mut Findings) {
    for routine in uncalled_routines(&f.script) {
        f.push_fixable(format!(
            "Line {}: function `{}` is declared but never called",
            routine.line, routine.name
        ));
    }
}
