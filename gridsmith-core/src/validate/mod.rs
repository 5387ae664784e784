mod policy;
pub(crate) mod rules;
mod validator;

pub use policy::ValidationPolicy;
pub use rules::dialect::{detect_dialect, Dialect};
pub use rules::routines::uncalled_routines;
pub use validator::Validator;

use crate::types::ValidationReport;

/// Validates with the default policy and limits.
pub fn validate(source: &str) -> ValidationReport {
    Validator::default().validate(source)
}
