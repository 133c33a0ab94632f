//! Audit workflows.
//!
//! Each workflow composes the same stages (navigate to a list, harvest ids,
//! fetch metrics, analyze, score) for one kind of audit and always returns a
//! report. A lost session cuts the run short and marks the report `aborted`
//! instead of discarding what was already collected.

pub mod engagement;
pub mod followers;

use tracing::{info, warn};

use followcheck_common::{HarvestSettings, RunReport};

use crate::pipeline::harvester::{HarvestConfig, HarvestError, ListHarvester};
use crate::pipeline::resolver::IdentifierResolver;
use crate::pipeline::stats::RunStats;
use crate::traits::PageAccessor;

pub use engagement::EngagementAudit;
pub use followers::FollowerAudit;

/// What a workflow hands back: the report to persist and the run stats.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub report: RunReport,
    pub stats: RunStats,
}

impl AuditRun {
    pub fn is_aborted(&self) -> bool {
        self.report.summary.aborted.is_some()
    }
}

/// Ids from the list stage, plus the reason the run must stop early, if any.
pub(crate) struct ListStage {
    pub ids: Vec<String>,
    pub aborted: Option<String>,
}

/// Navigate to `list_url` and harvest it with `resolver`.
///
/// Any navigation failure here aborts the run: without the list there is
/// nothing to sample. A session lost mid-harvest keeps the partial ids.
pub(crate) async fn harvest_list(
    page: &dyn PageAccessor,
    resolver: &dyn IdentifierResolver,
    list_url: &str,
    settings: &HarvestSettings,
    stats: &mut RunStats,
) -> ListStage {
    if let Err(e) = page.navigate(list_url).await {
        warn!(url = list_url, error = %e, "Could not open list");
        return ListStage {
            ids: Vec::new(),
            aborted: Some(format!("could not open {list_url}: {e}")),
        };
    }

    let harvester = ListHarvester::new(page, resolver, HarvestConfig::from(settings));
    match harvester
        .harvest(
            settings.target_sample_size,
            settings.max_cycles,
            settings.stagnation_limit,
        )
        .await
    {
        Ok(outcome) => {
            stats.cycles = outcome.cycles;
            stats.termination = Some(outcome.termination);
            stats.discovered = outcome.discovered;
            stats.harvested = outcome.ids.len();
            ListStage {
                ids: outcome.ids,
                aborted: None,
            }
        }
        Err(e) => {
            let message = e.to_string();
            let HarvestError::SessionLost {
                partial, cycles, ..
            } = e;
            info!(cycles, partial = partial.len(), "Keeping partial harvest");
            stats.cycles = cycles;
            stats.discovered = partial.len();
            stats.harvested = partial.len();
            ListStage {
                ids: partial,
                aborted: Some(message),
            }
        }
    }
}

/// Termination label for the summary record: how the harvest ended, or
/// `aborted` when it never finished.
pub(crate) fn termination_label(stats: &RunStats) -> String {
    stats
        .termination
        .map(|t| t.to_string())
        .unwrap_or_else(|| "aborted".to_string())
}
