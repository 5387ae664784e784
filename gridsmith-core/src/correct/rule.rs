use crate::limits::ScriptLimits;
use crate::script::{Script, Token};

/// One named, independently testable rewrite.
///
/// `apply` returns `None` when the rule's precondition does not match or the
/// rewrite would leave the text unchanged. Applying a rule to its own output
/// must return `None`.
pub trait RewriteRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, script: &Script, limits: &ScriptLimits) -> Option<String>;
}

/// Re-quotes `value` with the same quote character `original` used.
pub(crate) fn requote(original: &Token, source: &str, value: &str) -> String {
    let quote = source[original.start..]
        .chars()
        .next()
        .filter(|c| matches!(c, '"' | '\''))
        .unwrap_or('"');
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `Some(text)` when it differs from the input.
pub(crate) fn changed(script: &Script, text: String) -> Option<String> {
    (text != script.source).then_some(text)
}
