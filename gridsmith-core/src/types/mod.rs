mod chunk;
mod report;

pub use chunk::{estimate_operations, Chunk, ChunkKind, Complexity};
pub use report::ValidationReport;
