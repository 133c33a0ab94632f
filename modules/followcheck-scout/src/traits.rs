// Page-accessor boundary.
//
// Everything that talks to a live browser sits behind PageAccessor so the
// harvester and fetcher can be driven by MockPage in tests: no browser,
// no network, no wall-clock waits.

use std::time::Duration;

use async_trait::async_trait;

use followcheck_common::PageError;

/// Serialized rendered content of the current page at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub url: String,
    pub html: String,
}

impl Snapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Raw size in bytes; the harvester's second progress signal.
    pub fn size(&self) -> usize {
        self.html.len()
    }
}

/// Conditions a caller can block on instead of sleeping blindly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Rendered content has grown past `baseline` bytes.
    ContentGrows { baseline: usize },
    /// Rendered content contains the given marker (e.g. `"<header"`).
    Contains(String),
}

impl WaitCondition {
    pub fn is_met(&self, snapshot: &Snapshot) -> bool {
        match self {
            WaitCondition::ContentGrows { baseline } => snapshot.size() > *baseline,
            WaitCondition::Contains(marker) => snapshot.html.contains(marker.as_str()),
        }
    }
}

#[async_trait]
pub trait PageAccessor: Send + Sync {
    /// Load `url` as the current page. Fails with `PageError::Navigation` when
    /// the target is unreachable or blocked.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Serialized rendered content of the current page.
    async fn snapshot(&self) -> Result<Snapshot, PageError>;

    /// Scroll the container matching `container_hint` (or the window) to its
    /// current bottom.
    async fn scroll_to_bottom(&self, container_hint: Option<&str>) -> Result<(), PageError>;

    /// Block until `condition` holds or `timeout` elapses. `Ok(false)` is a
    /// timeout, not an error.
    async fn wait_for(&self, condition: &WaitCondition, timeout: Duration)
        -> Result<bool, PageError>;
}
