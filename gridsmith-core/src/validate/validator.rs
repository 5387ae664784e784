use tracing::debug;

use crate::limits::ScriptLimits;
use crate::script::Script;
use crate::types::ValidationReport;

use super::policy::ValidationPolicy;
use super::rules;

/// Static checks over one chunk's source. Stateless between calls.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: ValidationPolicy,
    limits: ScriptLimits,
}

impl Validator {
    pub fn new(policy: ValidationPolicy, limits: ScriptLimits) -> Self {
        Self { policy, limits }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    pub fn validate(&self, source: &str) -> ValidationReport {
        let mut f = Findings {
            script: Script::new(source),
            policy: &self.policy,
            limits: &self.limits,
            report: ValidationReport::default(),
        };
        rules::syntax::check(&mut f);
        rules::dialect::check(&mut f);
        rules::api::check(&mut f);
        rules::wrapper::check(&mut f);
        rules::routines::check(&mut f);
        rules::arrays::check(&mut f);
        rules::sheets::check(&mut f);
        rules::ranges::check(&mut f);
        rules::performance::check(&mut f);
        if self.policy.professional_standards {
            rules::standards::check(&mut f);
        }
        let report = f.report;
        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            fixable = report.fixable_issues.len(),
            "validated chunk"
        );
        report
    }
}

/// Accumulates one validation pass.
pub(crate) struct Findings<'a> {
    pub script: Script<'a>,
    pub policy: &'a ValidationPolicy,
    pub limits: &'a ScriptLimits,
    report: ValidationReport,
}

impl Findings<'_> {
    pub(crate) fn push_error(&mut self, message: impl Into<String>) {
        self.report.errors.push(message.into());
    }

    pub(crate) fn push_warning(&mut self, message: impl Into<String>) {
        self.report.warnings.push(message.into());
    }

    pub(crate) fn push_fixable(&mut self, message: impl Into<String>) {
        self.report.fixable_issues.push(message.into());
    }

    pub(crate) fn push_suggestion(&mut self, message: impl Into<String>) {
        self.report.suggestions.push(message.into());
    }
}
