pub mod coalesce;
pub mod tiered;

pub use coalesce::RequestCoalescer;
pub use tiered::{CacheHit, CacheTier, TieredCache};
