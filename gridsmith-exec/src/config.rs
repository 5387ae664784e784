use std::time::Duration;

use gridsmith_core::{ScriptLimits, ValidationPolicy};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ledger::{DEFAULT_CAPACITY, DEFAULT_EXCERPT_LEN};
use crate::retry::{duration_ms, PersistentSignatures, RetryConfig};
use crate::sandbox::SandboxConfig;

/// Everything one orchestrator needs to know up front. Every field has a
/// default, so a config file only names what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub retry: RetryConfig,
    pub persistent_signatures: PersistentSignatures,
    /// Corrector passes per chunk before moving on regardless.
    pub max_correction_rounds: u32,
    #[serde(with = "duration_ms", rename = "chunkTimeoutMs")]
    pub chunk_timeout: Duration,
    /// Chunks pulled from the generator before the session is cut off.
    pub max_chunks_per_session: u32,
    pub ledger_capacity: usize,
    pub excerpt_len: usize,
    pub policy: ValidationPolicy,
    pub limits: ScriptLimits,
    pub sandbox: SandboxConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            persistent_signatures: PersistentSignatures::default(),
            max_correction_rounds: 3,
            chunk_timeout: Duration::from_secs(30),
            max_chunks_per_session: 50,
            ledger_capacity: DEFAULT_CAPACITY,
            excerpt_len: DEFAULT_EXCERPT_LEN,
            policy: ValidationPolicy::default(),
            limits: ScriptLimits::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.chunk_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "chunkTimeoutMs",
                problem: "must be positive".into(),
            });
        }
        if self.max_chunks_per_session == 0 {
            return Err(ConfigError::Invalid {
                field: "maxChunksPerSession",
                problem: "must be at least 1".into(),
            });
        }
        if self.ledger_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "ledgerCapacity",
                problem: "must be at least 1".into(),
            });
        }
        if self.sandbox.max_steps == 0 {
            return Err(ConfigError::Invalid {
                field: "sandbox.maxSteps",
                problem: "must be at least 1".into(),
            });
        }
        if self.sandbox.max_nesting == 0 {
            return Err(ConfigError::Invalid {
                field: "sandbox.maxNesting",
                problem: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: OrchestratorConfig =
            serde_json::from_str(r#"{"chunkTimeoutMs": 1500, "retry": {"maxTotalRetries": 4}}"#)
                .unwrap();
        assert_eq!(cfg.chunk_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.retry.max_total_retries, 4);
        assert_eq!(cfg.retry.max_consecutive_failures, 3);
        assert_eq!(cfg.max_correction_rounds, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        let cfg = OrchestratorConfig {
            chunk_timeout: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "chunkTimeoutMs", .. })
        ));
    }

    #[test]
    fn rejects_zero_nesting() {
        let cfg: OrchestratorConfig =
            serde_json::from_str(r#"{"sandbox": {"maxNesting": 0}}"#).unwrap();
        assert_eq!(cfg.sandbox.max_steps, 200_000);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "sandbox.maxNesting", .. })
        ));
    }
}
