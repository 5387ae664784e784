use serde::{Deserialize, Serialize};

/// Numeric limits shared by the validator, the corrector and the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Rectangular writes taller than this are treated as runaway.
    pub max_range_rows: u32,
    pub max_sheet_name_len: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_range_rows: 1000,
            max_sheet_name_len: 31,
        }
    }
}

pub const ILLEGAL_SHEET_CHARS: [char; 7] = ['\\', '/', '?', '*', '[', ']', ':'];

impl ScriptLimits {
    /// Why `name` cannot be used as a worksheet name, if it cannot.
    pub fn sheet_name_problem(&self, name: &str) -> Option<&'static str> {
        if name.trim().is_empty() {
            Some("is empty")
        } else if name.chars().any(|c| ILLEGAL_SHEET_CHARS.contains(&c)) {
            Some("contains one of \\ / ? * [ ] :")
        } else if name.chars().count() > self.max_sheet_name_len {
            Some("is longer than 31 characters")
        } else if name.starts_with('\'') || name.ends_with('\'') {
            Some("starts or ends with an apostrophe")
        } else if name.eq_ignore_ascii_case("history") {
            Some("is reserved")
        } else {
            None
        }
    }

    /// Mechanical repair of a sheet name; never returns an invalid name.
    pub fn sanitize_sheet_name(&self, name: &str) -> String {
        let cleaned: String = name
            .chars()
            .filter(|c| !ILLEGAL_SHEET_CHARS.contains(c) && !c.is_control())
            .collect();
        let trimmed = cleaned.trim().trim_matches('\'').trim();
        let truncated: String = trimmed.chars().take(self.max_sheet_name_len).collect();
        let truncated = truncated.trim().to_string();
        if truncated.is_empty() || self.sheet_name_problem(&truncated).is_some() {
            "Sheet".to_string()
        } else {
            truncated
        }
    }
}
