pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;

pub use adapters::csv_reader::validate_input_path;
pub use adapters::{OpenAiEnricher, ReqwestTransport, RequirementReader};
pub use config::{LookupStrategy, SyncConfig};
pub use core::{
    sync_records, validate_records, EnrichmentResolver, LiveEngine, SyncEngine, TrackerClient,
    ValidationReport,
};
pub use domain::model::{RequirementRecord, StoryStatus, SyncResult, TicketRef};
pub use domain::ports::{Enricher, Tracker, Transport};
pub use utils::error::{Result, SyncError};
