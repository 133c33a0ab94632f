// EntityResolver: candidate identifiers visible in one page snapshot.
//
// No single extraction method survives every render state of the list, so
// several independent strategies run against the same snapshot and their
// results are unioned. Each recovers a different subset with little overlap.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::trace;

use followcheck_common::SiteSettings;

use crate::infra::util::{decode_entities, is_bare_count, visible_text_runs};
use crate::traits::Snapshot;

/// Longest identifier the host site allows, exclusive.
const MAX_ID_LEN: usize = 30;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])@([A-Za-z0-9._]{1,30})").expect("valid mention regex")
});

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]{1,30}$").expect("valid handle regex"));

static LABEL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:title|aria-label|alt)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

static PROFILE_PICTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@?([A-Za-z0-9._]{1,30})(?:'s profile picture| profile picture)?$")
        .expect("valid profile picture regex")
});

/// Anything that turns a snapshot into an ordered list of candidate ids.
/// The harvester only depends on this, so tests can script it.
pub trait IdentifierResolver: Send + Sync {
    fn resolve(&self, snapshot: &Snapshot) -> Result<Vec<String>>;
}

/// One extraction method. Returns raw candidates in document order; filtering
/// happens once, in the resolver.
pub trait IdStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &str) -> Vec<String>;
}

fn href_values(html: &str) -> impl Iterator<Item = String> + '_ {
    HREF_RE.captures_iter(html).filter_map(|cap| {
        cap.get(1)
            .or_else(|| cap.get(2))
            .map(|m| decode_entities(m.as_str()))
    })
}

/// Path segments of an href pointing at the host site, or `None` for foreign
/// links, anchors and scripts.
fn site_path_segments(href: &str, host: &str) -> Option<Vec<String>> {
    let path = if href.starts_with("http://") || href.starts_with("https://") {
        let parsed = url::Url::parse(href).ok()?;
        let link_host = parsed.host_str()?;
        if link_host != host && !link_host.ends_with(&format!(".{}", host.trim_start_matches("www."))) {
            return None;
        }
        parsed.path().to_string()
    } else if href.starts_with('/') && !href.starts_with("//") {
        href.split(['?', '#']).next().unwrap_or_default().to_string()
    } else {
        return None;
    };

    Some(
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

// --- Strategies ---

/// Profile links: `/name/` or `https://host/name/`.
pub struct LinkPathStrategy {
    host: String,
}

impl LinkPathStrategy {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
        }
    }
}

impl IdStrategy for LinkPathStrategy {
    fn name(&self) -> &'static str {
        "link_path"
    }

    fn extract(&self, html: &str) -> Vec<String> {
        href_values(html)
            .filter_map(|href| {
                let segments = site_path_segments(&href, &self.host)?;
                match segments.as_slice() {
                    [only] => Some(only.trim_start_matches('@').to_string()),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Post links: `/p/<shortcode>/` and `/reel/<shortcode>/`, with or without a
/// leading owner segment.
pub struct PostLinkStrategy {
    host: String,
}

impl PostLinkStrategy {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
        }
    }
}

impl IdStrategy for PostLinkStrategy {
    fn name(&self) -> &'static str {
        "post_link"
    }

    fn extract(&self, html: &str) -> Vec<String> {
        href_values(html)
            .filter_map(|href| {
                let segments = site_path_segments(&href, &self.host)?;
                segments
                    .windows(2)
                    .find(|pair| pair[0] == "p" || pair[0] == "reel")
                    .map(|pair| pair[1].clone())
            })
            .collect()
    }
}

/// Inline text: explicit `@mentions`, plus text runs that are a single
/// handle-shaped token carrying a `.`, `_` or digit (plain words like
/// "Remove" are UI labels, not handles). Runs that read as a count, such as
/// the `12.5K` in a profile header, are skipped.
pub struct InlineTextStrategy;

impl IdStrategy for InlineTextStrategy {
    fn name(&self) -> &'static str {
        "inline_text"
    }

    fn extract(&self, html: &str) -> Vec<String> {
        let mut out = Vec::new();
        for run in visible_text_runs(html) {
            for cap in MENTION_RE.captures_iter(&run) {
                out.push(cap[1].to_string());
            }
            if HANDLE_RE.is_match(&run)
                && !is_bare_count(&run)
                && run
                    .chars()
                    .any(|c| c == '.' || c == '_' || c.is_ascii_digit())
            {
                out.push(run);
            }
        }
        out
    }
}

/// Structured attributes: `title`, `aria-label` and `alt` values that are a
/// bare handle or "<handle>'s profile picture".
pub struct AttributeStrategy;

impl IdStrategy for AttributeStrategy {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn extract(&self, html: &str) -> Vec<String> {
        LABEL_ATTR_RE
            .captures_iter(html)
            .filter_map(|cap| {
                let raw = cap.get(1).or_else(|| cap.get(2))?.as_str();
                let value = decode_entities(raw);
                PROFILE_PICTURE_RE
                    .captures(value.trim())
                    .map(|c| c[1].to_string())
            })
            .collect()
    }
}

// --- Filter ---

/// Rules every candidate must pass regardless of which strategy found it.
pub struct IdFilter {
    reserved: HashSet<String>,
}

impl IdFilter {
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            reserved: reserved
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Also reject `id`; used to keep the audited profile out of its own list.
    pub fn excluding(mut self, id: &str) -> Self {
        self.reserved.insert(id.to_ascii_lowercase());
        self
    }

    pub fn accepts(&self, id: &str) -> bool {
        let len = id.chars().count();
        (1..MAX_ID_LEN).contains(&len)
            && !self.reserved.contains(&id.to_ascii_lowercase())
            && !id.chars().all(|c| c.is_ascii_digit())
            && id.chars().any(|c| c.is_alphanumeric())
    }
}

// --- Resolver ---

pub struct EntityResolver {
    strategies: Vec<Box<dyn IdStrategy>>,
    filter: IdFilter,
}

impl EntityResolver {
    pub fn new(strategies: Vec<Box<dyn IdStrategy>>, filter: IdFilter) -> Self {
        Self { strategies, filter }
    }

    /// Resolver for a followers/following panel.
    pub fn followers(site: &SiteSettings, audited: &str) -> Self {
        let host = site_host(&site.base_url);
        Self::new(
            vec![
                Box::new(LinkPathStrategy::new(&host)),
                Box::new(InlineTextStrategy),
                Box::new(AttributeStrategy),
            ],
            IdFilter::new(&site.reserved_words).excluding(audited),
        )
    }

    /// Resolver for the post grid on a profile page.
    pub fn posts(site: &SiteSettings) -> Self {
        let host = site_host(&site.base_url);
        Self::new(
            vec![Box::new(PostLinkStrategy::new(&host))],
            IdFilter::new(&site.reserved_words),
        )
    }
}

impl IdentifierResolver for EntityResolver {
    fn resolve(&self, snapshot: &Snapshot) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for strategy in &self.strategies {
            let before = ids.len();
            for candidate in strategy.extract(&snapshot.html) {
                let candidate = candidate.trim().to_string();
                if self.filter.accepts(&candidate) && seen.insert(candidate.clone()) {
                    ids.push(candidate);
                }
            }
            trace!(strategy = strategy.name(), added = ids.len() - before, "Strategy applied");
        }
        Ok(ids)
    }
}

/// Host part of the configured base URL, e.g. `www.instagram.com`.
pub fn site_host(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| base_url.to_string())
}
