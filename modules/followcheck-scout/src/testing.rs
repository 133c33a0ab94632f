// Test mocks for the audit pipeline.
//
// Two mocks matching the two trait boundaries:
// - MockPage (PageAccessor): per-URL frames, one per scroll depth, with
//   injectable navigation and snapshot failures
// - ScriptedResolver (IdentifierResolver): fixed batch sequence per cycle
//
// Nothing here sleeps: wait_for answers immediately from the current frame.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use followcheck_common::PageError;

use crate::pipeline::resolver::IdentifierResolver;
use crate::traits::{PageAccessor, Snapshot, WaitCondition};

/// URL `MockPage::list` registers its frames under.
pub const LIST_URL: &str = "mock://list";

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    current: Option<String>,
    scrolls: usize,
    snapshot_calls: u32,
    navigations: Vec<String>,
    scroll_hints: Vec<Option<String>>,
}

/// Scripted page accessor. Each URL holds a list of frames; frame `n` is what
/// the page looks like after `n` scrolls, and the last frame repeats once the
/// list runs out. Navigating resets the scroll depth. Unregistered URLs fail
/// with `PageError::Navigation`.
///
/// Builder pattern: `.on_page()`, `.on_frames()`, `.on_navigation_failure()`,
/// `.on_snapshot_failure()`.
#[derive(Default)]
pub struct MockPage {
    pages: HashMap<String, Vec<String>>,
    navigation_failures: HashMap<String, PageError>,
    /// Keyed by 1-based snapshot call number across the whole mock.
    snapshot_failures: HashMap<u32, PageError>,
    state: Mutex<MockState>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A virtualized list at `LIST_URL`.
    pub fn list(frames: Vec<String>) -> Self {
        Self::new().on_frames(LIST_URL, frames)
    }

    /// A static page that looks the same at every scroll depth.
    pub fn on_page(self, url: &str, html: &str) -> Self {
        self.on_frames(url, vec![html.to_string()])
    }

    pub fn on_frames(mut self, url: &str, frames: Vec<String>) -> Self {
        self.pages.insert(url.to_string(), frames);
        self
    }

    pub fn on_navigation_failure(mut self, url: &str, error: PageError) -> Self {
        self.navigation_failures.insert(url.to_string(), error);
        self
    }

    pub fn on_snapshot_failure(mut self, call: u32, error: PageError) -> Self {
        self.snapshot_failures.insert(call, error);
        self
    }

    /// Every URL passed to `navigate`, failed ones included.
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn snapshot_calls(&self) -> u32 {
        self.state.lock().unwrap().snapshot_calls
    }

    pub fn scroll_hints(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().scroll_hints.clone()
    }

    fn current_html(&self, state: &MockState) -> Option<(String, String)> {
        let url = state.current.as_ref()?;
        let frames = self.pages.get(url)?;
        let html = frames
            .get(state.scrolls.min(frames.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default();
        Some((url.clone(), html))
    }
}

#[async_trait]
impl PageAccessor for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());

        if let Some(err) = self.navigation_failures.get(url) {
            return Err(err.clone());
        }
        if !self.pages.contains_key(url) {
            return Err(PageError::Navigation {
                url: url.to_string(),
                message: "no mock page registered".into(),
            });
        }
        state.current = Some(url.to_string());
        state.scrolls = 0;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, PageError> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        if let Some(err) = self.snapshot_failures.get(&state.snapshot_calls) {
            return Err(err.clone());
        }
        match self.current_html(&state) {
            Some((url, html)) => Ok(Snapshot::new(url, html)),
            None => Err(PageError::Transient("no page loaded".into())),
        }
    }

    async fn scroll_to_bottom(&self, container_hint: Option<&str>) -> Result<(), PageError> {
        let mut state = self.state.lock().unwrap();
        state.scroll_hints.push(container_hint.map(String::from));
        if state.current.is_none() {
            return Err(PageError::Transient("scroll requested before navigation".into()));
        }
        state.scrolls += 1;
        Ok(())
    }

    async fn wait_for(
        &self,
        condition: &WaitCondition,
        _timeout: Duration,
    ) -> Result<bool, PageError> {
        let state = self.state.lock().unwrap();
        Ok(self
            .current_html(&state)
            .map(|(url, html)| condition.is_met(&Snapshot::new(url, html)))
            .unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// ScriptedResolver
// ---------------------------------------------------------------------------

/// Ignores the snapshot and returns a scripted batch per call. Call `n`
/// (1-based) gets batch `n - 1`, the last batch repeating after that.
pub struct ScriptedResolver {
    batches: Vec<Vec<String>>,
    fresh_per_call: Option<usize>,
    failing: HashSet<u32>,
    calls: AtomicU32,
}

impl ScriptedResolver {
    pub fn new(batches: Vec<Vec<String>>) -> Self {
        Self {
            batches,
            fresh_per_call: None,
            failing: HashSet::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Yields `n` never-before-seen ids on every call: `entity_0`, `entity_1`, ...
    pub fn fresh_each_cycle(n: usize) -> Self {
        Self {
            fresh_per_call: Some(n),
            ..Self::new(Vec::new())
        }
    }

    /// The same ids on every call.
    pub fn repeating(ids: &[&str]) -> Self {
        Self::new(vec![ids.iter().map(|s| s.to_string()).collect()])
    }

    /// Make call number `call` (1-based) return an error.
    pub fn failing_on(mut self, call: u32) -> Self {
        self.failing.insert(call);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentifierResolver for ScriptedResolver {
    fn resolve(&self, _snapshot: &Snapshot) -> Result<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&call) {
            bail!("scripted extraction failure on call {call}");
        }
        if let Some(n) = self.fresh_per_call {
            let start = (call as usize - 1) * n;
            return Ok((start..start + n).map(|i| format!("entity_{i}")).collect());
        }
        let index = (call as usize - 1).min(self.batches.len().saturating_sub(1));
        Ok(self.batches.get(index).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Page fixtures
// ---------------------------------------------------------------------------

/// A followers-panel frame listing `ids` as profile links.
pub fn followers_frame(ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<li><a href="/{id}/"><img alt="{id}'s profile picture"></a><a href="/{id}/"><span>{id}</span></a></li>"#
            )
        })
        .collect();
    format!(r#"<div role="dialog"><div class="_aano"><ul>{items}</ul></div></div>"#)
}

/// A profile page whose header shows `followers`.
pub fn profile_page(id: &str, followers: &str) -> String {
    format!(
        r#"<html><head><meta property="og:description" content="{followers} Followers, 10 Following"></head><body><header><a href="/{id}/followers/"><span title="{followers}">{followers}</span> followers</a></header></body></html>"#
    )
}

/// A post page showing `likes` and `comments`.
pub fn post_page(likes: u64, comments: u64) -> String {
    format!(
        r#"<html><body><article><section><a href="/p/x/liked_by/"><span>{likes}</span> likes</a></section><section><span>View all {comments} comments</span></section></article></body></html>"#
    )
}

/// A profile grid frame linking to `codes` as posts.
pub fn grid_frame(codes: &[&str]) -> String {
    let items: String = codes
        .iter()
        .map(|c| format!(r#"<a href="/p/{c}/"><img alt="Photo"></a>"#))
        .collect();
    format!("<main><header></header><div>{items}</div></main>")
}
