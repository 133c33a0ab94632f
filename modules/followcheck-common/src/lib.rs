pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, PageError};
pub use file_config::{
    load_config, FetchSettings, FileConfig, HarvestSettings, ScoringConfig, SiteSettings,
};
pub use types::*;
