//! Engagement audit: sample a profile's posts and test likes and comments
//! against the Benford curve, plus how uniform the like counts are.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use followcheck_common::{AuditMode, Entity, EntityRow, FileConfig, PostSample, SummaryRecord};

use super::{harvest_list, termination_label, AuditRun};
use crate::analysis::benford::analyze;
use crate::analysis::scorer::BotLikelihoodScorer;
use crate::pipeline::fetcher::{FetchConfig, MetricFetcher};
use crate::pipeline::resolver::EntityResolver;
use crate::pipeline::stats::RunStats;
use crate::report::build_report;
use crate::traits::PageAccessor;

pub struct EngagementAudit<'a> {
    page: &'a dyn PageAccessor,
    config: &'a FileConfig,
    scorer: BotLikelihoodScorer,
}

impl<'a> EngagementAudit<'a> {
    pub fn new(page: &'a dyn PageAccessor, config: &'a FileConfig) -> Self {
        Self {
            page,
            config,
            scorer: BotLikelihoodScorer::new(config.scoring.clone()),
        }
    }

    pub fn profile_url(&self, profile: &str) -> String {
        format!(
            "{}/{profile}/",
            self.config.site.base_url.trim_end_matches('/')
        )
    }

    pub async fn run(&self, profile: &str) -> AuditRun {
        let run_id = Uuid::new_v4();
        let mut stats = RunStats::default();
        info!(%run_id, profile, "Starting engagement audit");

        let resolver = EntityResolver::posts(&self.config.site);
        let stage = harvest_list(
            self.page,
            &resolver,
            &self.profile_url(profile),
            &self.config.harvest,
            &mut stats,
        )
        .await;
        let ids = stage.ids;
        let mut aborted = stage.aborted;

        let mut posts: Vec<PostSample> = ids
            .iter()
            .map(|id| PostSample {
                id: id.clone(),
                likes: 0,
                comments: 0,
            })
            .collect();

        if aborted.is_none() && !ids.is_empty() {
            let fetcher = MetricFetcher::posts(
                self.page,
                &self.config.site,
                FetchConfig::from(&self.config.fetch),
            );
            let outcome = fetcher.fetch_all(&ids).await;
            stats.fetched = outcome.fetched();
            stats.fetch_failures = outcome.failures;
            for (post, row) in posts.iter_mut().zip(&outcome.rows) {
                post.likes = row.values.first().copied().unwrap_or(0);
                post.comments = row.values.get(1).copied().unwrap_or(0);
            }
            if let Some(e) = outcome.aborted {
                aborted = Some(format!("session lost while fetching: {e}"));
            }
        }

        let likes: Vec<u64> = posts.iter().map(|p| p.likes).collect();
        let comments: Vec<u64> = posts.iter().map(|p| p.comments).collect();
        let distributions = [
            analyze("likes", likes.iter().copied()),
            analyze("comments", comments.iter().copied()),
        ];
        stats.analyzed = distributions[0].total_samples;
        let result = self.scorer.score(&distributions, Some(likes.as_slice()));

        if let Some(ref reason) = aborted {
            warn!(profile, reason = reason.as_str(), "Engagement audit aborted, report is partial");
        }
        info!(
            profile,
            posts = posts.len(),
            score = result.score,
            max_score = result.max_score,
            verdict = %result.verdict,
            "Engagement audit finished"
        );

        let summary = SummaryRecord {
            run_id,
            profile_id: profile.to_string(),
            mode: AuditMode::Engagement,
            timestamp: Utc::now(),
            profile_metric: None,
            total_harvested: posts.len(),
            total_analyzed: distributions[0].total_samples,
            score: result.score,
            max_score: result.max_score,
            verdict: result.verdict,
            reasons: result.reasons,
            termination: termination_label(&stats),
            aborted,
        };

        let mut rows = Vec::with_capacity(posts.len() * 2);
        for post in &posts {
            rows.push(EntityRow::new(&Entity::with_metric(post.id.clone(), post.likes), "likes"));
            rows.push(EntityRow::new(
                &Entity::with_metric(post.id.clone(), post.comments),
                "comments",
            ));
        }

        AuditRun {
            report: build_report(summary, rows, &distributions, &self.scorer),
            stats,
        }
    }
}
