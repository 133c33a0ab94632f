use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// TOML-backed tunables. Every section is optional; a missing file or section
/// falls back to the empirically tuned defaults below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub harvest: HarvestSettings,
    pub fetch: FetchSettings,
    pub scoring: ScoringConfig,
    pub site: SiteSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestSettings {
    pub target_sample_size: usize,
    pub max_cycles: u32,
    /// Consecutive cycles with neither new ids nor a change in raw snapshot size.
    pub stagnation_limit: u32,
    pub settle_timeout_ms: u64,
    /// Pause after each scroll when a remote browser replays the scroll history.
    pub scroll_pause_ms: u64,
    pub snapshot_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Tried in order when scrolling the list panel; the window is the fallback.
    pub container_selectors: Vec<String>,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            target_sample_size: 100,
            max_cycles: 120,
            stagnation_limit: 5,
            settle_timeout_ms: 3_500,
            scroll_pause_ms: 1_200,
            snapshot_attempts: 3,
            retry_backoff_ms: 2_000,
            container_selectors: vec![
                "div[role='dialog'] div._aano".to_string(),
                "div[role='dialog'] > div > div:nth-child(2)".to_string(),
                "div[role='dialog'] div[style*='overflow']".to_string(),
                "div.x1dm5mii".to_string(),
                "div._aano".to_string(),
            ],
        }
    }
}

impl HarvestSettings {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub ready_timeout_ms: u64,
    pub snapshot_attempts: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_500,
            max_delay_ms: 3_000,
            ready_timeout_ms: 8_000,
            snapshot_attempts: 2,
        }
    }
}

impl FetchSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Cutoffs and weights for the bot-likelihood rubric. Deviations are in
/// percentage points, CV thresholds are plain ratios.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub min_samples: u64,
    pub full_deviation: f64,
    pub partial_deviation: f64,
    pub full_cv: f64,
    pub partial_cv: f64,
    pub primary_weight: u32,
    pub secondary_weight: u32,
    pub cv_weight: u32,
    pub suspicious_pct: f64,
    pub bot_pct: f64,
    /// Below this average deviation a lone distribution is called REAL rather
    /// than LIKELY_REAL.
    pub real_deviation: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            full_deviation: 15.0,
            partial_deviation: 10.0,
            full_cv: 0.15,
            partial_cv: 0.25,
            primary_weight: 40,
            secondary_weight: 30,
            cv_weight: 30,
            suspicious_pct: 40.0,
            bot_pct: 70.0,
            real_deviation: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSettings {
    pub base_url: String,
    /// Host-site navigation endpoints that look like identifiers but are not.
    pub reserved_words: Vec<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.instagram.com".to_string(),
            reserved_words: [
                "explore", "reels", "reel", "direct", "accounts", "followers", "following",
                "p", "stories", "tv", "about", "legal", "privacy", "terms", "help", "web",
                "developer", "challenge", "emails", "session", "press", "api", "jobs",
                "blog", "lite", "locations", "directory", "follow", "seguir", "siguiendo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl FileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.target_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "harvest.target_sample_size must be greater than 0".into(),
            ));
        }
        if self.harvest.stagnation_limit == 0 {
            return Err(ConfigError::Invalid(
                "harvest.stagnation_limit must be greater than 0".into(),
            ));
        }
        if self.fetch.max_delay_ms < self.fetch.min_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "fetch.max_delay_ms ({}) is below fetch.min_delay_ms ({})",
                self.fetch.max_delay_ms, self.fetch.min_delay_ms
            )));
        }
        if self.scoring.partial_deviation > self.scoring.full_deviation {
            return Err(ConfigError::Invalid(
                "scoring.partial_deviation must not exceed scoring.full_deviation".into(),
            ));
        }
        if self.scoring.full_cv > self.scoring.partial_cv {
            return Err(ConfigError::Invalid(
                "scoring.full_cv must not exceed scoring.partial_cv".into(),
            ));
        }
        Ok(())
    }
}

/// Load, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = FileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.harvest.target_sample_size, 100);
        assert_eq!(config.harvest.stagnation_limit, 5);
        assert_eq!(config.scoring.primary_weight, 40);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[harvest]\ntarget_sample_size = 25\nstagnation_limit = 8").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.harvest.target_sample_size, 25);
        assert_eq!(config.harvest.stagnation_limit, 8);
        assert_eq!(config.harvest.max_cycles, 120);
        assert_eq!(config.fetch.min_delay_ms, 1_500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[harvest]\ntarget = 25").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_target_is_invalid() {
        let mut config = FileConfig::default();
        config.harvest.target_sample_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn inverted_delay_bounds_are_invalid() {
        let mut config = FileConfig::default();
        config.fetch.min_delay_ms = 5_000;
        config.fetch.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
