//! Follower audit: sample a profile's followers list, fetch each follower's
//! own follower count and test those counts against the Benford curve.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use followcheck_common::{AuditMode, Entity, EntityRow, FileConfig, SummaryRecord};

use super::{harvest_list, termination_label, AuditRun};
use crate::analysis::benford::analyze;
use crate::analysis::scorer::BotLikelihoodScorer;
use crate::pipeline::fetcher::{FetchConfig, MetricFetcher};
use crate::pipeline::resolver::EntityResolver;
use crate::pipeline::stats::RunStats;
use crate::report::build_report;
use crate::traits::PageAccessor;

pub const FIELD: &str = "followers";

pub struct FollowerAudit<'a> {
    page: &'a dyn PageAccessor,
    config: &'a FileConfig,
    scorer: BotLikelihoodScorer,
}

impl<'a> FollowerAudit<'a> {
    pub fn new(page: &'a dyn PageAccessor, config: &'a FileConfig) -> Self {
        Self {
            page,
            config,
            scorer: BotLikelihoodScorer::new(config.scoring.clone()),
        }
    }

    pub fn list_url(&self, profile: &str) -> String {
        format!(
            "{}/{profile}/followers/",
            self.config.site.base_url.trim_end_matches('/')
        )
    }

    pub async fn run(&self, profile: &str) -> AuditRun {
        let run_id = Uuid::new_v4();
        let mut stats = RunStats::default();
        info!(%run_id, profile, "Starting follower audit");

        let fetcher = MetricFetcher::followers(
            self.page,
            &self.config.site,
            FetchConfig::from(&self.config.fetch),
        );

        let mut aborted = None;
        let profile_metric = match fetcher.fetch_metric(profile).await {
            Ok(0) => {
                warn!(profile, "Profile follower total not found");
                None
            }
            Ok(n) => {
                info!(profile, followers = n, "Profile follower total");
                Some(n)
            }
            Err(e) => {
                aborted = Some(format!("session lost before harvest: {e}"));
                None
            }
        };

        let mut ids = Vec::new();
        if aborted.is_none() {
            let resolver = EntityResolver::followers(&self.config.site, profile);
            let stage = harvest_list(
                self.page,
                &resolver,
                &self.list_url(profile),
                &self.config.harvest,
                &mut stats,
            )
            .await;
            ids = stage.ids;
            aborted = stage.aborted;
        }

        let mut metrics = vec![0u64; ids.len()];
        if aborted.is_none() && !ids.is_empty() {
            let outcome = fetcher.fetch_all(&ids).await;
            stats.fetched = outcome.fetched();
            stats.fetch_failures = outcome.failures;
            metrics = outcome.column(0);
            if let Some(e) = outcome.aborted {
                aborted = Some(format!("session lost while fetching: {e}"));
            }
        }

        let entities: Vec<Entity> = ids
            .iter()
            .zip(&metrics)
            .map(|(id, m)| Entity::with_metric(id.clone(), *m))
            .collect();

        let dist = analyze(FIELD, metrics.iter().copied());
        stats.analyzed = dist.total_samples;
        let result = self.scorer.score(std::slice::from_ref(&dist), None);

        if let Some(ref reason) = aborted {
            warn!(profile, reason = reason.as_str(), "Follower audit aborted, report is partial");
        }
        info!(
            profile,
            score = result.score,
            max_score = result.max_score,
            verdict = %result.verdict,
            "Follower audit finished"
        );

        let summary = SummaryRecord {
            run_id,
            profile_id: profile.to_string(),
            mode: AuditMode::Followers,
            timestamp: Utc::now(),
            profile_metric,
            total_harvested: ids.len(),
            total_analyzed: dist.total_samples,
            score: result.score,
            max_score: result.max_score,
            verdict: result.verdict,
            reasons: result.reasons,
            termination: termination_label(&stats),
            aborted,
        };
        let rows = entities.iter().map(|e| EntityRow::new(e, FIELD)).collect();

        AuditRun {
            report: build_report(summary, rows, &[dist], &self.scorer),
            stats,
        }
    }
}
