//! Outcome Ledger: a bounded record of past chunk outcomes.
//!
//! The ledger only feeds aggregate statistics and suggestion text. Nothing in
//! the pass/fail path reads it.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use gridsmith_core::ErrorFamily;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_CAPACITY: usize = 200;
pub const DEFAULT_EXCERPT_LEN: usize = 240;

/// Failures in one family before the ledger suggests something about it.
const SUGGESTION_THRESHOLD: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LedgerEntry {
    #[serde(rename_all = "camelCase")]
    Failure {
        chunk_id: String,
        fingerprint: String,
        excerpt: String,
        category: ErrorFamily,
        message: String,
        operations_recorded: usize,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Success {
        chunk_id: String,
        fingerprint: String,
        excerpt: String,
        operations_recorded: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEntry {
    pub fn chunk_id(&self) -> &str {
        match self {
            LedgerEntry::Failure { chunk_id, .. } | LedgerEntry::Success { chunk_id, .. } => chunk_id,
        }
    }

    pub fn excerpt(&self) -> &str {
        match self {
            LedgerEntry::Failure { excerpt, .. } | LedgerEntry::Success { excerpt, .. } => excerpt,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, LedgerEntry::Failure { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub failures: usize,
    pub successes: usize,
    /// Entries dropped to stay within capacity.
    pub evicted: u64,
    pub failures_by_category: BTreeMap<ErrorFamily, usize>,
    pub success_rate: f64,
    pub mean_success_ms: Option<f64>,
}

/// Ring buffer of outcomes; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct OutcomeLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
    excerpt_len: usize,
    evicted: u64,
}

impl Default for OutcomeLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EXCERPT_LEN)
    }
}

impl OutcomeLedger {
    pub fn new(capacity: usize, excerpt_len: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            excerpt_len,
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn record_failure(
        &mut self,
        chunk_id: &str,
        source: &str,
        message: &str,
        category: ErrorFamily,
        operations_recorded: usize,
    ) {
        self.push(LedgerEntry::Failure {
            chunk_id: chunk_id.to_string(),
            fingerprint: fingerprint(source),
            excerpt: excerpt(source, self.excerpt_len),
            category,
            message: excerpt(message, self.excerpt_len),
            operations_recorded,
            timestamp: Utc::now(),
        });
    }

    pub fn record_success(&mut self, chunk_id: &str, source: &str, operations_recorded: usize, duration_ms: u64) {
        self.push(LedgerEntry::Success {
            chunk_id: chunk_id.to_string(),
            fingerprint: fingerprint(source),
            excerpt: excerpt(source, self.excerpt_len),
            operations_recorded,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn push(&mut self, entry: LedgerEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            evicted: self.evicted,
            ..LedgerStats::default()
        };
        let mut success_ms = Vec::new();
        for entry in &self.entries {
            match entry {
                LedgerEntry::Failure { category, .. } => {
                    stats.failures += 1;
                    *stats.failures_by_category.entry(*category).or_default() += 1;
                }
                LedgerEntry::Success { duration_ms, .. } => {
                    stats.successes += 1;
                    success_ms.push(*duration_ms as f64);
                }
            }
        }
        let total = stats.failures + stats.successes;
        if total > 0 {
            stats.success_rate = stats.successes as f64 / total as f64;
        }
        if !success_ms.is_empty() {
            stats.mean_success_ms = Some(success_ms.iter().sum::<f64>() / success_ms.len() as f64);
        }
        stats
    }

    /// Improvement hints derived from the failure mix, most frequent first.
    pub fn suggestions(&self) -> Vec<String> {
        let stats = self.stats();
        let mut families: Vec<(ErrorFamily, usize)> = stats
            .failures_by_category
            .iter()
            .filter(|(_, n)| **n >= SUGGESTION_THRESHOLD)
            .map(|(f, n)| (*f, *n))
            .collect();
        families.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut out: Vec<String> = families
            .into_iter()
            .map(|(family, n)| format!("{n} {family} failures: {}", family_hint(family)))
            .collect();

        let mut repeats: BTreeMap<&str, (&str, usize)> = BTreeMap::new();
        for entry in &self.entries {
            if let LedgerEntry::Failure {
                fingerprint, chunk_id, ..
            } = entry
            {
                repeats.entry(fingerprint).or_insert((chunk_id, 0)).1 += 1;
            }
        }
        for (chunk_id, n) in repeats.values().filter(|(_, n)| *n >= SUGGESTION_THRESHOLD) {
            out.push(format!(
                "chunk {chunk_id} failed {n} times with identical source; request a regenerated chunk instead of retrying it"
            ));
        }

        let total = stats.failures + stats.successes;
        if total >= 4 && stats.success_rate < 0.5 {
            out.push(format!(
                "only {:.0}% of recent chunks succeeded; ask the generator for smaller chunks",
                stats.success_rate * 100.0
            ));
        }
        out
    }
}

fn family_hint(family: ErrorFamily) -> &'static str {
    match family {
        ErrorFamily::Dimension => "write bulk values as [[...]] and size every array to its target range",
        ErrorFamily::Syntax => "generated chunks are being truncated; lower the chunk size or raise the output limit",
        ErrorFamily::UnsupportedApi => "the generator is using APIs outside the supported surface; restate the allowed API list in the prompt",
        ErrorFamily::SheetName => "fetch sheets with getItemOrNullObject and create them before use; keep names short and free of \\ / ? * [ ] :",
        ErrorFamily::Reference => "chunks use variables or routines they never declare; pass prior context or inline helper routines",
        ErrorFamily::Timeout => "chunks run too long; split large writes and avoid context.sync() inside loops",
        ErrorFamily::Permission => "the document is protected or read-only for this user",
        ErrorFamily::RateLimit => "the runtime is throttling requests; slow the session down",
        ErrorFamily::Unavailable => "the runtime API surface is missing; check the host version",
        ErrorFamily::Other => "inspect the recorded messages for a common cause",
    }
}

/// First 16 hex chars of the SHA-256 of the trimmed source.
pub fn fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.trim().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Char-safe prefix of at most `max` characters, marked when cut.
fn excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        let out = excerpt("ééééé", 3);
        assert_eq!(out, "ééé…");
        assert_eq!(excerpt("short", 10), "short");
    }

    #[test]
    fn fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(fingerprint("  abc \n"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 16);
    }
}
