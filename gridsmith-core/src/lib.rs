#![forbid(unsafe_code)]

pub mod address;
pub mod cleanup;
pub mod correct;
pub mod error;
pub mod failure;
pub mod limits;
pub mod script;
pub mod types;
pub mod validate;

pub use crate::address::{CellRef, RangeAddress};
pub use crate::cleanup::clean_generated_source;
pub use crate::correct::{correct_and_revalidate, Correction, Corrector, Revision, RewriteRule};
pub use crate::error::{AddressError, ScriptError};
pub use crate::failure::{classify_error, ErrorFamily};
pub use crate::limits::ScriptLimits;
pub use crate::types::{estimate_operations, Chunk, ChunkKind, Complexity, ValidationReport};
pub use crate::validate::{validate, ValidationPolicy, Validator};
