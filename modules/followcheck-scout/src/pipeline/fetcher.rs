// MetricFetcher: one isolated navigation + extraction per identifier.
//
// Fetches run strictly one after another with a randomized pause in between.
// The target site blocks accounts that open profile pages in parallel or in
// quick succession, so there is no concurrency here at all.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use followcheck_common::{FetchSettings, PageError, SiteSettings};

use crate::infra::util::{decode_entities, inner_text, is_bare_count, parse_count, visible_text_runs};
use crate::pipeline::retry::{random_delay, snapshot_with_retry};
use crate::traits::{PageAccessor, WaitCondition};

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#)
        .expect("valid anchor regex")
});

static TITLE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btitle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid title regex")
});

static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid meta regex"));

static CONTENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid content regex")
});

static LABEL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:aria-label|title)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid label attribute regex")
});

static SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<span\b[^>]*>([^<]*)</span>").expect("valid span regex")
});

fn first_capture(cap: &regex::Captures<'_>) -> Option<String> {
    cap.get(1)
        .or_else(|| cap.get(2))
        .map(|m| decode_entities(m.as_str()))
}

fn contains_any(text: &str, labels: &[String]) -> bool {
    let lower = text.to_lowercase();
    labels.iter().any(|l| lower.contains(l.as_str()))
}

fn lowercase(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_lowercase()).collect()
}

/// One way of reading a single numeric value out of a page. `None` or `0`
/// means "not found here"; the fetcher moves on to the next strategy.
pub trait MetricStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &str) -> Option<u64>;
}

// --- Strategies ---

/// The count inside a link whose href contains a fragment, e.g. the
/// `/followers/` link on a profile header or the `liked_by` link on a post.
/// A `title` attribute inside the link wins over its text.
pub struct LinkCountStrategy {
    href_fragment: String,
}

impl LinkCountStrategy {
    pub fn new(href_fragment: &str) -> Self {
        Self {
            href_fragment: href_fragment.to_string(),
        }
    }
}

impl MetricStrategy for LinkCountStrategy {
    fn name(&self) -> &'static str {
        "link_count"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        ANCHOR_RE
            .captures_iter(html)
            .filter(|cap| cap[1].contains(self.href_fragment.as_str()))
            .find_map(|cap| {
                let inner = &cap[2];
                let from_title = TITLE_ATTR_RE
                    .captures(inner)
                    .and_then(|t| first_capture(&t))
                    .and_then(|t| parse_count(&t))
                    .filter(|n| *n > 0);
                from_title.or_else(|| parse_count(&inner_text(inner)).filter(|n| *n > 0))
            })
    }
}

/// `<meta property="og:description" content="1,234 Followers, 56 Following, ...">`.
pub struct MetaDescriptionStrategy {
    pattern: Regex,
}

impl MetaDescriptionStrategy {
    pub fn new(labels: &[&str]) -> Self {
        let alternatives = labels
            .iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"(?i)(\d+(?:[.,]\d+)*\s?[KM]?)\s*(?:{alternatives})"
        ))
        .expect("escaped labels form a valid regex");
        Self { pattern }
    }
}

impl MetricStrategy for MetaDescriptionStrategy {
    fn name(&self) -> &'static str {
        "meta_description"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        META_RE
            .find_iter(html)
            .map(|m| m.as_str())
            .filter(|tag| tag.contains("og:description"))
            .find_map(|tag| {
                let content = CONTENT_ATTR_RE.captures(tag).and_then(|c| first_capture(&c))?;
                let cap = self.pattern.captures(&content)?;
                parse_count(&cap[1]).filter(|n| *n > 0)
            })
    }
}

/// A visible text run mentioning one of the labels, e.g. "46 Me gusta".
pub struct LabeledTextStrategy {
    labels: Vec<String>,
}

impl LabeledTextStrategy {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            labels: lowercase(labels),
        }
    }
}

impl MetricStrategy for LabeledTextStrategy {
    fn name(&self) -> &'static str {
        "labeled_text"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        visible_text_runs(html)
            .into_iter()
            .filter(|run| contains_any(run, &self.labels))
            .find_map(|run| parse_count(&run).filter(|n| *n > 0))
    }
}

/// An `aria-label` or `title` attribute mentioning one of the labels.
pub struct LabeledAttributeStrategy {
    labels: Vec<String>,
}

impl LabeledAttributeStrategy {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            labels: lowercase(labels),
        }
    }
}

impl MetricStrategy for LabeledAttributeStrategy {
    fn name(&self) -> &'static str {
        "labeled_attribute"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        LABEL_ATTR_RE
            .captures_iter(html)
            .filter_map(|cap| first_capture(&cap))
            .filter(|value| contains_any(value, &self.labels))
            .find_map(|value| parse_count(&value).filter(|n| *n > 0))
    }
}

/// Number of elements matching a pattern, e.g. rendered comment items.
pub struct ElementCountStrategy {
    pattern: Regex,
}

impl ElementCountStrategy {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl MetricStrategy for ElementCountStrategy {
    fn name(&self) -> &'static str {
        "element_count"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        let n = self.pattern.find_iter(html).count() as u64;
        (n > 0).then_some(n)
    }
}

/// Last resort: the first bare number in a `<span>` above `min`. Small
/// numbers are usually post or following counts.
pub struct SpanNumberFallback {
    min: u64,
}

impl SpanNumberFallback {
    pub fn new(min: u64) -> Self {
        Self { min }
    }
}

impl MetricStrategy for SpanNumberFallback {
    fn name(&self) -> &'static str {
        "span_number"
    }

    fn extract(&self, html: &str) -> Option<u64> {
        SPAN_RE
            .captures_iter(html)
            .map(|cap| decode_entities(cap[1].trim()))
            .filter(|text| is_bare_count(text))
            .find_map(|text| parse_count(&text).filter(|n| *n > self.min))
    }
}

// --- Fields ---

/// A named numeric field and its strategies in priority order.
pub struct FieldSpec {
    pub field: String,
    strategies: Vec<Box<dyn MetricStrategy>>,
}

impl FieldSpec {
    pub fn new(field: &str, strategies: Vec<Box<dyn MetricStrategy>>) -> Self {
        Self {
            field: field.to_string(),
            strategies,
        }
    }

    /// First non-zero value any strategy yields, or `0` for unknown.
    pub fn extract(&self, html: &str) -> u64 {
        for strategy in &self.strategies {
            if let Some(value) = strategy.extract(html).filter(|v| *v > 0) {
                debug!(field = self.field.as_str(), strategy = strategy.name(), value, "Metric extracted");
                return value;
            }
        }
        0
    }

    pub fn followers() -> Self {
        let labels = ["followers", "seguidores"];
        Self::new(
            "followers",
            vec![
                Box::new(LinkCountStrategy::new("/followers")),
                Box::new(MetaDescriptionStrategy::new(&labels)),
                Box::new(LabeledAttributeStrategy::new(&labels)),
                Box::new(LabeledTextStrategy::new(&labels)),
                Box::new(SpanNumberFallback::new(10)),
            ],
        )
    }

    pub fn likes() -> Self {
        let labels = ["likes", "like", "me gusta", "gusta"];
        Self::new(
            "likes",
            vec![
                Box::new(LinkCountStrategy::new("liked_by")),
                Box::new(LabeledTextStrategy::new(&labels)),
                Box::new(LabeledAttributeStrategy::new(&labels)),
            ],
        )
    }

    pub fn comments() -> Self {
        let labels = ["comments", "comment", "comentarios", "comentario"];
        let mut strategies: Vec<Box<dyn MetricStrategy>> = vec![
            Box::new(LabeledTextStrategy::new(&labels)),
            Box::new(LabeledAttributeStrategy::new(&labels)),
        ];
        if let Ok(items) = ElementCountStrategy::new(r#"(?i)<li\b[^>]*role\s*=\s*["']menuitem["']"#) {
            strategies.push(Box::new(items));
        }
        Self::new("comments", strategies)
    }
}

// --- Fetcher ---

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub ready_timeout: Duration,
    pub snapshot_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&FetchSettings> for FetchConfig {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ready_timeout: settings.ready_timeout(),
            snapshot_attempts: settings.snapshot_attempts,
            retry_backoff: Duration::from_millis(settings.min_delay_ms),
        }
    }
}

/// Values for one id, in the fetcher's field order. Zeros are unknowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRow {
    pub id: String,
    pub values: Vec<u64>,
}

#[derive(Debug)]
pub struct FetchOutcome {
    /// One row per requested id, in request order.
    pub rows: Vec<FetchedRow>,
    /// Ids whose every field came back unknown.
    pub failures: usize,
    /// Set when the session died; rows after that point are all zeros.
    pub aborted: Option<PageError>,
}

impl FetchOutcome {
    /// Rows with at least one known value.
    pub fn fetched(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.values.iter().any(|v| *v > 0))
            .count()
    }

    /// Values of one field across all rows.
    pub fn column(&self, index: usize) -> Vec<u64> {
        self.rows
            .iter()
            .map(|r| r.values.get(index).copied().unwrap_or(0))
            .collect()
    }
}

pub struct MetricFetcher<'a> {
    page: &'a dyn PageAccessor,
    url_template: String,
    ready_marker: String,
    fields: Vec<FieldSpec>,
    config: FetchConfig,
}

impl<'a> MetricFetcher<'a> {
    /// `url_template` holds one `{id}` placeholder.
    pub fn new(
        page: &'a dyn PageAccessor,
        url_template: String,
        ready_marker: &str,
        fields: Vec<FieldSpec>,
        config: FetchConfig,
    ) -> Self {
        Self {
            page,
            url_template,
            ready_marker: ready_marker.to_string(),
            fields,
            config,
        }
    }

    /// Follower count of a profile page.
    pub fn followers(page: &'a dyn PageAccessor, site: &SiteSettings, config: FetchConfig) -> Self {
        let base = site.base_url.trim_end_matches('/');
        Self::new(
            page,
            format!("{base}/{{id}}/"),
            "<header",
            vec![FieldSpec::followers()],
            config,
        )
    }

    /// Likes and comments of a post page.
    pub fn posts(page: &'a dyn PageAccessor, site: &SiteSettings, config: FetchConfig) -> Self {
        let base = site.base_url.trim_end_matches('/');
        Self::new(
            page,
            format!("{base}/p/{{id}}/"),
            "<section",
            vec![FieldSpec::likes(), FieldSpec::comments()],
            config,
        )
    }

    pub fn url_for(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }

    /// Fetch every field for one id. Per-entity failures come back as zeros;
    /// only a lost session is an `Err`.
    pub async fn fetch_fields(&self, id: &str) -> Result<Vec<u64>, PageError> {
        let unknown = vec![0; self.fields.len()];
        let url = self.url_for(id);

        match self.page.navigate(&url).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(id, error = %e, "Navigation failed, metric unknown");
                return Ok(unknown);
            }
        }

        match self
            .page
            .wait_for(
                &WaitCondition::Contains(self.ready_marker.clone()),
                self.config.ready_timeout,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(id, marker = self.ready_marker.as_str(), "Page not ready in time, reading anyway"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!(id, error = %e, "Wait failed"),
        }

        let Some(snapshot) =
            snapshot_with_retry(self.page, self.config.snapshot_attempts, self.config.retry_backoff)
                .await?
        else {
            warn!(id, "No snapshot, metric unknown");
            return Ok(unknown);
        };

        Ok(self.fields.iter().map(|f| f.extract(&snapshot.html)).collect())
    }

    /// First field only; `0` when unknown.
    pub async fn fetch_metric(&self, id: &str) -> Result<u64, PageError> {
        let values = self.fetch_fields(id).await?;
        Ok(values.first().copied().unwrap_or(0))
    }

    /// Fetch all ids sequentially, pausing a random delay within the
    /// configured bounds between calls. Stops at the first fatal error and
    /// fills the remaining rows with unknowns.
    pub async fn fetch_all(&self, ids: &[String]) -> FetchOutcome {
        let mut rows = Vec::with_capacity(ids.len());
        let mut failures = 0;
        let mut aborted = None;

        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(random_delay(self.config.min_delay, self.config.max_delay)).await;
            }

            match self.fetch_fields(id).await {
                Ok(values) => {
                    if values.iter().all(|v| *v == 0) {
                        failures += 1;
                        warn!(id = id.as_str(), "No metric found");
                    } else {
                        debug!(id = id.as_str(), ?values, "Fetched");
                    }
                    rows.push(FetchedRow {
                        id: id.clone(),
                        values,
                    });
                }
                Err(e) => {
                    warn!(id = id.as_str(), fetched = i, error = %e, "Session lost during fetch, stopping");
                    aborted = Some(e);
                    break;
                }
            }

            if (i + 1) % 10 == 0 {
                info!(fetched = i + 1, total = ids.len(), failures, "Fetch progress");
            }
        }

        let width = self.fields.len();
        for id in ids.iter().skip(rows.len()) {
            rows.push(FetchedRow {
                id: id.clone(),
                values: vec![0; width],
            });
        }

        FetchOutcome {
            rows,
            failures,
            aborted,
        }
    }
}
