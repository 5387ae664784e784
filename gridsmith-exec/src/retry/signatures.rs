use serde::{Deserialize, Serialize};

const DEFAULT_SIGNATURES: [&str; 8] = [
    "runtime api unavailable",
    "permission denied",
    "access denied",
    "rate limited",
    "too many requests",
    "read-only",
    "protected",
    "quota exceeded",
];

/// Failure messages that no retry can fix. Matching is a case-insensitive
/// substring test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentSignatures(Vec<String>);

impl Default for PersistentSignatures {
    fn default() -> Self {
        Self(DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect())
    }
}

impl PersistentSignatures {
    pub fn new(signatures: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(
            signatures
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
        )
    }

    pub fn with(mut self, signature: impl Into<String>) -> Self {
        self.0.push(signature.into().to_lowercase());
        self
    }

    /// The signature `message` matches, if any.
    pub fn matching(&self, message: &str) -> Option<&str> {
        let lower = message.to_lowercase();
        self.0
            .iter()
            .find(|sig| !sig.is_empty() && lower.contains(&sig.to_lowercase()))
            .map(String::as_str)
    }

    pub fn is_persistent(&self, message: &str) -> bool {
        self.matching(message).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
