use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Setup,
    Header,
    Data,
    Formula,
    Formatting,
    Validation,
    Finalization,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Setup => "setup",
            ChunkKind::Header => "header",
            ChunkKind::Data => "data",
            ChunkKind::Formula => "formula",
            ChunkKind::Formatting => "formatting",
            ChunkKind::Validation => "validation",
            ChunkKind::Finalization => "finalization",
        }
    }

    /// Guesses what a chunk does from its text and position in the build.
    pub fn infer(source: &str, stage: u32) -> Self {
        let lower = source.to_ascii_lowercase();
        let sheet_setup = lower.contains("worksheets.add")
            || (lower.contains("getactiveworksheet") && !lower.contains(".values"));
        if stage == 0 || sheet_setup {
            ChunkKind::Setup
        } else if lower.contains("datavalidation") || lower.contains("conditionalformats") {
            ChunkKind::Validation
        } else if lower.contains("header") || stage == 1 {
            ChunkKind::Header
        } else if lower.contains(".formulas") {
            ChunkKind::Formula
        } else if lower.contains(".values") && !lower.contains("format") {
            ChunkKind::Data
        } else if lower.contains("format") || lower.contains("color") || lower.contains("font") {
            ChunkKind::Formatting
        } else if lower.contains("freezepanes")
            || lower.contains("autofit")
            || lower.contains("activate()")
        {
            ChunkKind::Finalization
        } else {
            ChunkKind::Data
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    Critical,
}

const CRITICAL_KEYWORDS: [&str; 3] = ["datavalidation", "iferror", "npv("];
const COMPLEX_KEYWORDS: [&str; 6] = ["if(", "vlookup", "xlookup", "index(", "match(", "sumproduct"];
const MEDIUM_KEYWORDS: [&str; 5] = ["formulas", "format", "sum(", "average(", "numberformat"];

impl Complexity {
    pub fn infer(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        let has = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));
        if has(&CRITICAL_KEYWORDS) {
            Complexity::Critical
        } else if has(&COMPLEX_KEYWORDS) {
            Complexity::Complex
        } else if has(&MEDIUM_KEYWORDS) {
            Complexity::Medium
        } else {
            Complexity::Simple
        }
    }

    /// Rough ceiling on document operations a chunk of this complexity should carry.
    pub fn max_operations(&self) -> usize {
        match self {
            Complexity::Simple => 15,
            Complexity::Medium => 8,
            Complexity::Complex => 4,
            Complexity::Critical => 2,
        }
    }
}

const OPERATION_MARKERS: [&str; 9] = [
    "getrange",
    ".values =",
    ".formulas =",
    "format.",
    "add(",
    "delete(",
    "insert(",
    "load(",
    "sync()",
];

/// Counts likely document operations; never less than one.
pub fn estimate_operations(source: &str) -> usize {
    let lower = source.to_ascii_lowercase();
    OPERATION_MARKERS
        .iter()
        .map(|m| lower.matches(m).count())
        .sum::<usize>()
        .max(1)
}

/// One generated, independently executable unit of script.
///
/// Values are never edited in place; a corrected chunk is a new value with the
/// same `id` (see [`Chunk::with_source`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub kind: ChunkKind,
    pub complexity: Complexity,
    pub source_text: String,
    pub stage: u32,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Chunk {
    /// Builds a chunk, inferring kind and complexity from the text.
    pub fn new(id: impl Into<String>, source_text: impl Into<String>, stage: u32) -> Self {
        let source_text = source_text.into();
        Self {
            id: id.into(),
            kind: ChunkKind::infer(&source_text, stage),
            complexity: Complexity::infer(&source_text),
            source_text,
            stage,
            depends_on: BTreeSet::new(),
            optional: false,
            description: None,
        }
    }

    pub fn with_source(&self, source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            ..self.clone()
        }
    }

    pub fn estimated_operations(&self) -> usize {
        estimate_operations(&self.source_text)
    }
}
