use tracing::{debug, warn};

use followcheck_common::{DigitDistribution, ScoreResult, ScoringConfig, Verdict};

/// Weighted rubric turning digit distributions (and optionally the raw values
/// behind the first one) into a bot-likelihood score.
///
/// Each criterion only counts toward `max_score` once it has at least
/// `min_samples` usable values. With none evaluated the verdict is
/// `INSUFFICIENT_DATA`.
pub struct BotLikelihoodScorer {
    config: ScoringConfig,
}

enum Band {
    Full,
    Partial,
    None,
}

impl BotLikelihoodScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score up to two distributions (primary, secondary) plus the
    /// coefficient of variation of `raw_metrics`.
    pub fn score(
        &self,
        distributions: &[DigitDistribution],
        raw_metrics: Option<&[u64]>,
    ) -> ScoreResult {
        let cfg = &self.config;
        let weights = [cfg.primary_weight, cfg.secondary_weight];

        if distributions.len() > weights.len() {
            warn!(
                given = distributions.len(),
                scored = weights.len(),
                "Extra distributions ignored by scorer"
            );
        }

        let mut score = 0;
        let mut max_score = 0;
        let mut reasons = Vec::new();
        let mut deviation_criteria = 0;
        let mut last_deviation = 0.0;

        for (dist, weight) in distributions.iter().zip(weights) {
            if dist.total_samples < cfg.min_samples {
                debug!(
                    field = dist.field.as_str(),
                    samples = dist.total_samples,
                    "Too few samples, criterion skipped"
                );
                continue;
            }

            max_score += weight;
            deviation_criteria += 1;
            let dev = dist.avg_deviation;
            last_deviation = dev;

            let field = dist.field.to_uppercase();
            match self.deviation_band(dev) {
                Band::Full => {
                    score += weight;
                    reasons.push(format!(
                        "{field}: high Benford deviation ({dev:.2}%), distribution is not natural"
                    ));
                }
                Band::Partial => {
                    score += weight / 2;
                    reasons.push(format!(
                        "{field}: moderate Benford deviation ({dev:.2}%), suspicious"
                    ));
                }
                Band::None => {
                    reasons.push(format!("{field}: natural Benford distribution ({dev:.2}%)"));
                }
            }
        }

        let mut cv_evaluated = false;
        if let Some(raw) = raw_metrics {
            let positive: Vec<u64> = raw.iter().copied().filter(|v| *v > 0).collect();
            match coefficient_of_variation(&positive) {
                Some(cv) if positive.len() as u64 >= cfg.min_samples => {
                    cv_evaluated = true;
                    max_score += cfg.cv_weight;
                    if cv < cfg.full_cv {
                        score += cfg.cv_weight;
                        reasons.push(format!(
                            "ENGAGEMENT: very uniform values (CV={cv:.2}), bot-like behavior"
                        ));
                    } else if cv < cfg.partial_cv {
                        score += cfg.cv_weight / 2;
                        reasons.push(format!("ENGAGEMENT: low variation (CV={cv:.2}), suspicious"));
                    } else {
                        reasons.push(format!("ENGAGEMENT: natural variation (CV={cv:.2})"));
                    }
                }
                _ => debug!(samples = positive.len(), "Too few raw values, CV criterion skipped"),
            }
        }

        let mut result = ScoreResult {
            score,
            max_score,
            reasons,
            verdict: Verdict::InsufficientData,
        };
        if let Some(pct) = result.percentage() {
            result.verdict = if pct >= cfg.bot_pct {
                Verdict::LikelyBot
            } else if pct >= cfg.suspicious_pct {
                Verdict::Suspicious
            } else if deviation_criteria == 1 && !cv_evaluated && last_deviation < cfg.real_deviation {
                Verdict::Real
            } else {
                Verdict::LikelyReal
            };
        }
        result
    }

    /// Verdict for one distribution on its own, used in the distribution
    /// table's summary row.
    pub fn classify(&self, dist: &DigitDistribution) -> Verdict {
        if !dist.has_data() {
            return Verdict::InsufficientData;
        }
        let dev = dist.avg_deviation;
        if dev < self.config.real_deviation {
            Verdict::Real
        } else if dev < self.config.partial_deviation {
            Verdict::LikelyReal
        } else if dev < self.config.full_deviation {
            Verdict::Suspicious
        } else {
            Verdict::LikelyBot
        }
    }

    fn deviation_band(&self, dev: f64) -> Band {
        if dev > self.config.full_deviation {
            Band::Full
        } else if dev > self.config.partial_deviation {
            Band::Partial
        } else {
            Band::None
        }
    }
}

/// Population standard deviation over mean. `None` for an empty slice.
pub fn coefficient_of_variation(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values
        .iter()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::benford::analyze;

    fn dist(field: &str, avg_deviation: f64, samples: u64) -> DigitDistribution {
        let mut d = DigitDistribution::empty(field);
        d.avg_deviation = avg_deviation;
        d.total_samples = samples;
        d
    }

    fn scorer() -> BotLikelihoodScorer {
        BotLikelihoodScorer::new(ScoringConfig::default())
    }

    #[test]
    fn everything_tripped_is_a_likely_bot() {
        // mean 100, population std 5 -> CV 0.05
        let raw: Vec<u64> = (0..20).map(|i| if i % 2 == 0 { 95 } else { 105 }).collect();
        let result = scorer().score(
            &[dist("likes", 20.0, 20), dist("comments", 20.0, 20)],
            Some(raw.as_slice()),
        );
        assert_eq!(result.score, 100);
        assert_eq!(result.max_score, 100);
        assert_eq!(result.verdict, Verdict::LikelyBot);
        assert_eq!(result.reasons.len(), 3);
        assert!(result.reasons[0].starts_with("LIKES"));
        assert!(result.reasons[2].starts_with("ENGAGEMENT"));
    }

    #[test]
    fn nothing_evaluated_is_insufficient_data() {
        let result = scorer().score(&[dist("followers", 40.0, 4)], Some(&[10u64, 20, 0, 0][..]));
        assert_eq!(result.max_score, 0);
        assert_eq!(result.verdict, Verdict::InsufficientData);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn empty_distribution_is_never_a_confident_verdict() {
        let empty = analyze("followers", Vec::<u64>::new());
        let result = scorer().score(&[empty.clone()], None);
        assert_eq!(result.verdict, Verdict::InsufficientData);
        assert_eq!(scorer().classify(&empty), Verdict::InsufficientData);
    }

    #[test]
    fn partial_triggers_earn_half_weight() {
        let result = scorer().score(&[dist("followers", 12.0, 50)], None);
        assert_eq!(result.score, 20);
        assert_eq!(result.max_score, 40);
        assert_eq!(result.verdict, Verdict::Suspicious);
    }

    #[test]
    fn single_clean_distribution_is_real() {
        let result = scorer().score(&[dist("followers", 3.0, 80)], None);
        assert_eq!(result.score, 0);
        assert_eq!(result.verdict, Verdict::Real);

        let result = scorer().score(&[dist("followers", 7.0, 80)], None);
        assert_eq!(result.verdict, Verdict::LikelyReal);
    }

    #[test]
    fn multi_criterion_low_score_is_likely_real() {
        let raw = [10u64, 400, 35, 2_000, 90, 7];
        let result = scorer().score(
            &[dist("likes", 2.0, 30), dist("comments", 3.0, 30)],
            Some(&raw[..]),
        );
        assert_eq!(result.score, 0);
        assert_eq!(result.max_score, 100);
        assert_eq!(result.verdict, Verdict::LikelyReal);
    }

    #[test]
    fn criteria_below_sample_threshold_are_skipped() {
        let result = scorer().score(
            &[dist("likes", 30.0, 3), dist("comments", 30.0, 30)],
            None,
        );
        assert_eq!(result.max_score, 30);
        assert_eq!(result.score, 30);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].starts_with("COMMENTS"));
    }

    #[test]
    fn classify_tiers() {
        let s = scorer();
        assert_eq!(s.classify(&dist("f", 4.9, 10)), Verdict::Real);
        assert_eq!(s.classify(&dist("f", 9.0, 10)), Verdict::LikelyReal);
        assert_eq!(s.classify(&dist("f", 14.0, 10)), Verdict::Suspicious);
        assert_eq!(s.classify(&dist("f", 15.5, 10)), Verdict::LikelyBot);
    }

    #[test]
    fn coefficient_of_variation_basics() {
        assert_eq!(coefficient_of_variation(&[]), None);
        assert_eq!(coefficient_of_variation(&[5, 5, 5]), Some(0.0));
        let cv = coefficient_of_variation(&[95, 105]).unwrap();
        assert!((cv - 0.05).abs() < 1e-12);
    }
}
