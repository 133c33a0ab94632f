// Text helpers shared by the resolver and fetcher strategies.
//
// HTML is scanned with regexes rather than a DOM parser: the markup we read is
// machine-generated and we only ever need hrefs, a few attributes and visible
// text runs.

use std::sync::LazyLock;

use regex::Regex;

/// Counts with 10+ digits are ids or timestamps that leaked into the text.
const MAX_COUNT_DIGITS: usize = 10;

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)*)\s?([KkMm]\b)?").expect("valid count regex")
});

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
        .expect("valid script regex")
});

static BARE_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:[.,]\d+)*\s?[KkMm]?$").expect("valid bare count regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// Parse a displayed count such as `1,234`, `12.5K`, `1,2K`, `3M` or
/// `46 Me gusta` into an integer.
///
/// Magnitude suffixes are expanded first, thousands separators stripped, and
/// the result floored. Returns `None` when the text holds no usable number.
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = COUNT_RE.captures(text)?;
    let number = caps.get(1)?.as_str();

    match caps.get(2).map(|m| m.as_str()) {
        Some(suffix) => {
            let multiplier = if suffix.eq_ignore_ascii_case("k") {
                1_000.0
            } else {
                1_000_000.0
            };
            // "1,234.5K" uses ',' for thousands; a lone ',' is a decimal mark ("1,2K").
            let normalized = if number.contains('.') {
                number.replace(',', "")
            } else {
                number.replace(',', ".")
            };
            let value: f64 = normalized.parse().ok()?;
            Some((value * multiplier).floor() as u64)
        }
        None => {
            let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() || digits.len() >= MAX_COUNT_DIGITS {
                return None;
            }
            digits.parse().ok()
        }
    }
}

/// True when `text` is nothing but a displayed count (`320`, `12.5K`, `1,2M`).
pub fn is_bare_count(text: &str) -> bool {
    BARE_COUNT_RE.is_match(text)
}

/// Decode the handful of entities that show up in rendered attribute values
/// and text runs.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Strip tags from a fragment and collapse whitespace.
pub fn inner_text(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, " ");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text runs of a document, one per element boundary, in document order.
pub fn visible_text_runs(html: &str) -> Vec<String> {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    TAG_RE
        .split(&without_scripts)
        .map(|run| decode_entities(run).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|run| !run.is_empty())
        .collect()
}
