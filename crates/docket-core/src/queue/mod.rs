//! Queue module: candidate selection, the claim protocol, and retention.

mod claim;
mod retention;
mod selection;

pub use claim::{ClaimTarget, Claimer};
pub use retention::RetentionPolicy;
pub use selection::{Selection, SortOrder};
