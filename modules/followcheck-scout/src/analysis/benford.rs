//! First-digit (Benford) distribution of a numeric field.
//!
//! Naturally occurring counts spread over several orders of magnitude have a
//! leading digit `d` with probability `log10(1 + 1/d)`. Synthetic counts
//! (bought followers, botted likes) tend to cluster and miss that curve.

use std::collections::BTreeMap;

use followcheck_common::{first_digit, DigitDistribution};

pub const DIGITS: std::ops::RangeInclusive<u8> = 1..=9;

/// Expected share of leading digit `d`, in percent.
pub fn expected_pct(d: u8) -> f64 {
    (1.0 + 1.0 / d as f64).log10() * 100.0
}

/// Build the observed-vs-expected histogram for `values`.
///
/// Values `<= 0` are unknowns and are discarded. With nothing left the result
/// has `total_samples == 0` and empty maps.
pub fn analyze<I>(field: &str, values: I) -> DigitDistribution
where
    I: IntoIterator,
    I::Item: Into<i128>,
{
    let mut counts: BTreeMap<u8, u64> = DIGITS.map(|d| (d, 0)).collect();
    let mut total: u64 = 0;

    for value in values {
        let value: i128 = value.into();
        if value <= 0 {
            continue;
        }
        if let Some(d) = first_digit(value) {
            *counts.entry(d).or_insert(0) += 1;
            total += 1;
        }
    }

    if total == 0 {
        return DigitDistribution::empty(field);
    }

    let mut observed_pct = BTreeMap::new();
    let mut expected = BTreeMap::new();
    let mut deviation_sum = 0.0;
    let mut chi_squared = 0.0;

    for d in DIGITS {
        let count = counts[&d];
        let observed = 100.0 * count as f64 / total as f64;
        let exp = expected_pct(d);
        deviation_sum += (observed - exp).abs();

        let expected_count = exp / 100.0 * total as f64;
        if expected_count > 0.0 {
            chi_squared += (count as f64 - expected_count).powi(2) / expected_count;
        }

        observed_pct.insert(d, observed);
        expected.insert(d, exp);
    }

    DigitDistribution {
        field: field.to_string(),
        counts,
        observed_pct,
        expected_pct: expected,
        avg_deviation: deviation_sum / 9.0,
        chi_squared,
        total_samples: total,
    }
}
