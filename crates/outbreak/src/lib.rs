pub mod builder;
pub mod config;
pub mod diff;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod types;

pub use config::Config;
pub use pipeline::{CycleError, CycleOutcome, Orchestrator};
pub use types::{RegionRecord, Snapshot};
