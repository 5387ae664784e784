//! Pattern Corrector: an ordered pipeline of named rewrite rules.

mod rule;
pub mod rules;

pub use rule::RewriteRule;

use serde::Serialize;
use tracing::{debug, trace};

use crate::failure::ErrorFamily;
use crate::limits::ScriptLimits;
use crate::script::Script;
use crate::types::ValidationReport;
use crate::validate::Validator;

use rules::{
    CircularReference, Completion, DefensiveWrap, DialectTranslation, DimensionWrap,
    LiteralCoercion, OrphanCalls, RangeClamp, SheetNames,
};

const DEFAULT_MAX_PASSES: usize = 4;

/// Result of one `correct` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub source: String,
    /// Names of the rules that fired, in firing order.
    pub applied: Vec<&'static str>,
}

impl Correction {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Text after a single rule fired.
#[derive(Debug, Clone)]
struct Stage {
    rule: &'static str,
    source: String,
}

pub struct Corrector {
    rules: Vec<Box<dyn RewriteRule>>,
    limits: ScriptLimits,
    max_passes: usize,
}

impl Default for Corrector {
    fn default() -> Self {
        Self::standard(ScriptLimits::default())
    }
}

impl std::fmt::Debug for Corrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corrector")
            .field("rules", &self.rule_names())
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl Corrector {
    /// The full pipeline, in dependency order.
    pub fn standard(limits: ScriptLimits) -> Self {
        let rules: Vec<Box<dyn RewriteRule>> = vec![
            Box::new(DimensionWrap),
            Box::new(SheetNames),
            Box::new(RangeClamp),
            Box::new(CircularReference),
            Box::new(LiteralCoercion),
            Box::new(OrphanCalls),
            Box::new(DialectTranslation),
            Box::new(DefensiveWrap),
        ];
        Self::with_rules(rules, limits)
    }

    /// Rules keyed to an error family reported by the sandbox or the real
    /// target. Unrecognised families get the full pipeline.
    pub fn targeted(family: ErrorFamily, limits: ScriptLimits) -> Self {
        let rules: Vec<Box<dyn RewriteRule>> = match family {
            ErrorFamily::Dimension => vec![Box::new(DimensionWrap), Box::new(RangeClamp)],
            ErrorFamily::SheetName => vec![Box::new(SheetNames)],
            ErrorFamily::Syntax => vec![Box::new(Completion)],
            ErrorFamily::UnsupportedApi => vec![Box::new(DialectTranslation)],
            ErrorFamily::Reference => vec![Box::new(OrphanCalls), Box::new(DialectTranslation)],
            _ => return Self::standard(limits),
        };
        Self::with_rules(rules, limits)
    }

    pub fn with_rules(rules: Vec<Box<dyn RewriteRule>>, limits: ScriptLimits) -> Self {
        Self {
            rules,
            limits,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Runs the pipeline until a pass fires no rule, or the pass bound is hit.
    /// Returns the input unchanged when nothing matches.
    pub fn correct(&self, source: &str) -> Correction {
        let stages = self.stages(source);
        let applied = stages.iter().map(|s| s.rule).collect();
        let source = stages
            .into_iter()
            .last()
            .map_or_else(|| source.to_string(), |s| s.source);
        Correction { source, applied }
    }

    fn stages(&self, source: &str) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        let mut current = source.to_string();
        for pass in 0..self.max_passes {
            let mut fired = false;
            for rule in &self.rules {
                let script = Script::new(&current);
                let Some(next) = rule.apply(&script, &self.limits) else {
                    continue;
                };
                trace!(rule = rule.name(), pass, "rewrite rule fired");
                fired = true;
                current = next;
                stages.push(Stage {
                    rule: rule.name(),
                    source: current.clone(),
                });
            }
            if !fired {
                break;
            }
        }
        stages
    }
}

/// The text kept after correcting and re-validating.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub source: String,
    pub report: ValidationReport,
    /// Rules that contributed to the kept text.
    pub applied: Vec<&'static str>,
    /// The kept text scores strictly better than the input.
    pub improved: bool,
}

/// Corrects `source`, re-validates the original and every intermediate
/// stage, and keeps the one with the fewest errors then fewest fixable
/// issues. Ties go to the later stage.
pub fn correct_and_revalidate(
    corrector: &Corrector,
    validator: &Validator,
    source: &str,
) -> Revision {
    let original = validator.validate(source);
    let baseline = original.score();
    let mut best = Revision {
        source: source.to_string(),
        report: original,
        applied: Vec::new(),
        improved: false,
    };
    let mut best_score = baseline;
    let mut applied = Vec::new();
    for stage in corrector.stages(source) {
        applied.push(stage.rule);
        let report = validator.validate(&stage.source);
        let score = report.score();
        if score <= best_score {
            best_score = score;
            best = Revision {
                source: stage.source,
                report,
                applied: applied.clone(),
                improved: score < baseline,
            };
        }
    }
    debug!(
        applied = ?best.applied,
        errors = best.report.errors.len(),
        fixable = best.report.fixable_issues.len(),
        improved = best.improved,
        "correction revalidated"
    );
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rule_order() {
        assert_eq!(
            Corrector::default().rule_names(),
            [
                "dimension_wrap",
                "sheet_names",
                "range_clamp",
                "circular_reference",
                "literal_coercion",
                "orphan_calls",
                "dialect_translation",
                "defensive_wrap",
            ]
        );
    }

    #[test]
    fn targeted_subsets() {
        let limits = ScriptLimits::default();
        assert_eq!(
            Corrector::targeted(ErrorFamily::Dimension, limits).rule_names(),
            ["dimension_wrap", "range_clamp"]
        );
        assert_eq!(
            Corrector::targeted(ErrorFamily::Syntax, limits).rule_names(),
            ["completion"]
        );
        assert_eq!(Corrector::targeted(ErrorFamily::Timeout, limits).rule_names().len(), 8);
    }

    #[test]
    fn untouched_input_is_returned_as_is() {
        let src = "await Excel.run(async (context) => {\n    try {\n        await context.sync();\n    } catch (error) {\n        console.error(error);\n        throw error;\n    }\n});";
        let out = Corrector::default().correct(src);
        assert!(!out.changed());
        assert_eq!(out.source, src);
    }
}
