use crate::limits::ScriptLimits;
use crate::script::{Script, SheetNameRef};
use crate::validate::validator::Findings;

/// Sheet-name literals the host would reject.
pub fn invalid_sheet_names(script: &Script, limits: &ScriptLimits) -> Vec<(SheetNameRef, &'static str)> {
    script
        .sheet_name_refs()
        .into_iter()
        .filter_map(|r| limits.sheet_name_problem(&r.name).map(|p| (r, p)))
        .collect()
}

pub(crate) fn check(f: &mut Findings) {
    for (r, problem) in invalid_sheet_names(&f.script, f.limits) {
        f.push_fixable(format!(
            "Line {}: sheet name {:?} {problem}",
            r.line, r.name
        ));
    }
}
