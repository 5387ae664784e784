use serde::{Deserialize, Serialize};

/// Findings for a single chunk. Produced fresh per validation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub fixable_issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fixable_issues(&self) -> bool {
        !self.fixable_issues.is_empty()
    }

    /// Invalid or mechanically repairable.
    pub fn needs_correction(&self) -> bool {
        !self.is_valid() || self.has_fixable_issues()
    }

    /// Lower is better; compared lexicographically when choosing between revisions.
    pub fn score(&self) -> (usize, usize) {
        (self.errors.len(), self.fixable_issues.len())
    }
}
