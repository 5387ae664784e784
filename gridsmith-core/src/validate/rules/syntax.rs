use crate::script::tokenize;
use crate::validate::validator::Findings;

pub(crate) fn check(f: &mut Findings) {
    if let Err(e) = tokenize(f.script.source) {
        f.push_error(format!("Syntax error: {e}"));
    }
    let b = f.script.balance();
    for (count, open, close) in [
        (b.braces, '{', '}'),
        (b.parens, '(', ')'),
        (b.brackets, '[', ']'),
    ] {
        if count > 0 {
            f.push_error(format!("Unbalanced delimiters: {count} unclosed '{open}'"));
        } else if count < 0 {
            f.push_error(format!("Unbalanced delimiters: {} unmatched '{close}'", -count));
        }
    }
}
