use crate::correct::rule::{changed, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::{indent_at, Script, TokenKind};

/// Wraps the `Excel.run` body in `try { ... } catch (error) { ... }` when
/// nothing inside it handles errors.
pub struct DefensiveWrap;

impl RewriteRule for DefensiveWrap {
    fn name(&self) -> &'static str {
        "defensive_wrap"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        let w = script.wrapper()?;
        let close = w.body_close?;
        let tokens = &script.tokens;
        let body_tokens = &tokens[w.body_open + 1..close];
        if body_tokens.is_empty()
            || body_tokens
                .windows(2)
                .any(|p| p[0].is_ident("try") && p[1].is_punct("{"))
        {
            return None;
        }

        let src = script.source;
        let open_end = tokens[w.body_open].end;
        let close_start = tokens[close].start;
        let indent = format!("{}    ", indent_at(src, close_start));
        let reindent = !body_tokens
            .iter()
            .any(|t| t.kind == TokenKind::Template && t.text.contains('\n'));
        let body = src[open_end..close_start]
            .trim_start_matches(['\r', '\n'])
            .trim_end();

        let mut out = String::with_capacity(src.len() + 96);
        out.push_str(&src[..open_end]);
        out.push('\n');
        out.push_str(&format!("{indent}try {{\n"));
        for line in body.lines() {
            if reindent && !line.trim().is_empty() {
                out.push_str("    ");
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "{indent}}} catch (error) {{\n{indent}    console.error(error);\n{indent}    throw error;\n{indent}}}\n"
        ));
        out.push_str(indent_at(src, close_start));
        out.push_str(&src[close_start..]);
        changed(script, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_body_once() {
        let src = "await Excel.run(async (context) => {\n    const s = context.workbook.worksheets.getActiveWorksheet();\n    await context.sync();\n});";
        let out = DefensiveWrap
            .apply(&Script::new(src), &ScriptLimits::default())
            .unwrap();
        assert_eq!(
            out,
            "await Excel.run(async (context) => {\n    try {\n        const s = context.workbook.worksheets.getActiveWorksheet();\n        await context.sync();\n    } catch (error) {\n        console.error(error);\n        throw error;\n    }\n});"
        );
        assert!(DefensiveWrap
            .apply(&Script::new(&out), &ScriptLimits::default())
            .is_none());
    }
}
