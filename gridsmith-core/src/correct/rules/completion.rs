use crate::cleanup::clean_generated_source;
use crate::correct::rule::{changed, RewriteRule};
use crate::limits::ScriptLimits;
use crate::script::Script;

/// Intake cleanup as a rule, for syntax failures reported after execution.
pub struct Completion;

impl RewriteRule for Completion {
    fn name(&self) -> &'static str {
        "completion"
    }

    fn apply(&self, script: &Script, _limits: &ScriptLimits) -> Option<String> {
        changed(script, clean_generated_source(script.source))
    }
}
