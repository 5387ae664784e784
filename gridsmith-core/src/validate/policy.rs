use serde::{Deserialize, Serialize};

/// Thresholds for the heuristic checks. None of these affect validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub max_single_cell_ops: usize,
    /// Warn when `sync()` calls exceed this share of estimated operations.
    pub max_sync_ratio: f64,
    pub min_syncs_for_ratio: usize,
    /// Compare literal shapes against explicit target addresses.
    pub cross_check_dimensions: bool,
    pub professional_standards: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_single_cell_ops: 20,
            max_sync_ratio: 0.5,
            min_syncs_for_ratio: 4,
            cross_check_dimensions: true,
            professional_standards: true,
        }
    }
}
