pub mod fetcher;
pub mod harvester;
pub mod resolver;
pub mod retry;
pub mod state;
pub mod stats;

pub use fetcher::{FetchConfig, FetchOutcome, FieldSpec, MetricFetcher};
pub use harvester::{HarvestConfig, HarvestError, HarvestOutcome, ListHarvester};
pub use resolver::{EntityResolver, IdentifierResolver};
pub use state::{HarvestState, Termination};
pub use stats::RunStats;
