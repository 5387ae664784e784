//! Process exit codes shared by every subcommand.

pub const SUCCESS: i32 = 0;
/// The script failed static validation.
pub const VALIDATION_FAILED: i32 = 2;
/// A simulation failed or a build session aborted.
pub const RUN_FAILED: i32 = 3;
/// I/O, config or runtime setup errors.
pub const RUNTIME_ERROR: i32 = 4;
