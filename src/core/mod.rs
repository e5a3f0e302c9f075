pub mod enrichment;
pub mod grouping;
pub mod mapping;
pub mod sync;
pub mod tracker;
pub mod validation_report;

pub use enrichment::{EnrichmentResolver, ResolvedText};
pub use grouping::group_by_epic;
pub use sync::{sync_records, LiveEngine, SyncEngine};
pub use tracker::{RetryPolicy, TrackerClient};
pub use validation_report::{validate_records, ValidationReport};
