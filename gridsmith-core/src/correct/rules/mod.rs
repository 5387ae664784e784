mod circular;
mod coercion;
mod completion;
mod defensive;
mod dialect;
mod dimensions;
mod orphans;
mod range_clamp;
mod sheet_names;

pub use circular::CircularReference;
pub use coercion::LiteralCoercion;
pub use completion::Completion;
pub use defensive::DefensiveWrap;
pub use dialect::DialectTranslation;
pub use dimensions::DimensionWrap;
pub use orphans::OrphanCalls;
pub use range_clamp::RangeClamp;
pub use sheet_names::SheetNames;
