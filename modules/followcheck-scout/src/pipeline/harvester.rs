use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use followcheck_common::{HarvestSettings, PageError};

use crate::pipeline::resolver::IdentifierResolver;
use crate::pipeline::retry::snapshot_with_retry;
use crate::pipeline::state::{CycleObservation, HarvestLimits, HarvestState, Termination};
use crate::traits::{PageAccessor, WaitCondition};

/// Cycles between info-level progress lines.
const PROGRESS_LOG_EVERY: u32 = 5;

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Scrollable container to target; `None` scrolls the window.
    pub container_hint: Option<String>,
    /// How long to wait for new content after each scroll.
    pub settle_timeout: Duration,
    pub snapshot_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&HarvestSettings> for HarvestConfig {
    fn from(settings: &HarvestSettings) -> Self {
        Self {
            container_hint: settings.container_selectors.first().cloned(),
            settle_timeout: settings.settle_timeout(),
            snapshot_attempts: settings.snapshot_attempts,
            retry_backoff: settings.retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOutcome {
    /// At most `target` ids, first-discovered first.
    pub ids: Vec<String>,
    pub termination: Termination,
    pub cycles: u32,
    /// Distinct ids seen before truncation to the target.
    pub discovered: usize,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The page session became unusable. `partial` holds what was harvested
    /// before it failed.
    #[error("session lost after {cycles} cycles ({} ids harvested): {source}", partial.len())]
    SessionLost {
        partial: Vec<String>,
        cycles: u32,
        #[source]
        source: PageError,
    },
}

/// Drives scroll/extract/merge cycles against a virtualized list until it
/// saturates, converges or runs out of cycles.
///
/// The caller navigates to the list first; the harvester only scrolls and
/// reads the current page.
pub struct ListHarvester<'a> {
    page: &'a dyn PageAccessor,
    resolver: &'a dyn IdentifierResolver,
    config: HarvestConfig,
}

impl<'a> ListHarvester<'a> {
    pub fn new(
        page: &'a dyn PageAccessor,
        resolver: &'a dyn IdentifierResolver,
        config: HarvestConfig,
    ) -> Self {
        Self {
            page,
            resolver,
            config,
        }
    }

    pub async fn harvest(
        &self,
        target: usize,
        max_cycles: u32,
        stagnation_limit: u32,
    ) -> Result<HarvestOutcome, HarvestError> {
        let mut state = HarvestState::new(HarvestLimits {
            target,
            max_cycles,
            stagnation_limit,
        })
        .begin();

        info!(target, max_cycles, stagnation_limit, "Starting harvest");

        while !state.is_terminal() {
            let observation = match self.run_cycle(state.last_snapshot_size()).await {
                Ok(obs) => obs,
                Err(source) => {
                    let cycles = state.cycle();
                    warn!(cycles, error = %source, "Session lost during harvest");
                    return Err(HarvestError::SessionLost {
                        partial: state.into_ids(),
                        cycles,
                        source,
                    });
                }
            };

            state = state.step(observation);

            debug!(
                cycle = state.cycle(),
                seen = state.discovered(),
                stagnant = state.stagnant_cycles(),
                phase = ?state.phase(),
                "Harvest cycle complete"
            );
            if state.cycle() % PROGRESS_LOG_EVERY == 0 && !state.is_terminal() {
                info!(
                    cycle = state.cycle(),
                    seen = state.discovered(),
                    stagnant = state.stagnant_cycles(),
                    "Harvest progress"
                );
            }
        }

        // The loop only exits on a terminal phase.
        let termination = state.termination().unwrap_or(Termination::Exhausted);
        let cycles = state.cycle();
        let discovered = state.discovered();
        let ids = state.into_ids();

        info!(
            termination = %termination,
            cycles,
            discovered,
            harvested = ids.len(),
            "Harvest finished"
        );

        Ok(HarvestOutcome {
            ids,
            termination,
            cycles,
            discovered,
        })
    }

    /// Scroll, wait for the list to settle, snapshot and resolve.
    ///
    /// `Ok(None)` is a cycle that produced nothing usable. Only fatal page
    /// errors are returned as `Err`.
    async fn run_cycle(&self, baseline: usize) -> Result<Option<CycleObservation>, PageError> {
        if let Err(e) = self
            .page
            .scroll_to_bottom(self.config.container_hint.as_deref())
            .await
        {
            if e.is_fatal() {
                return Err(e);
            }
            debug!(error = %e, "Scroll failed, extracting anyway");
        }

        match self
            .page
            .wait_for(
                &WaitCondition::ContentGrows { baseline },
                self.config.settle_timeout,
            )
            .await
        {
            Ok(grew) => {
                if !grew {
                    debug!(baseline, "No growth within settle timeout");
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!(error = %e, "Wait failed"),
        }

        let Some(snapshot) = snapshot_with_retry(
            self.page,
            self.config.snapshot_attempts,
            self.config.retry_backoff,
        )
        .await?
        else {
            return Ok(None);
        };

        match self.resolver.resolve(&snapshot) {
            Ok(candidates) if candidates.is_empty() => {
                debug!("Resolver found no candidates");
                Ok(None)
            }
            Ok(candidates) => Ok(Some(CycleObservation {
                candidates,
                snapshot_size: snapshot.size(),
            })),
            Err(e) => {
                warn!(error = %e, "Extraction failed, counting cycle as stagnant");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPage, ScriptedResolver};

    fn config() -> HarvestConfig {
        HarvestConfig {
            container_hint: Some("div._aano".into()),
            settle_timeout: Duration::ZERO,
            snapshot_attempts: 2,
            retry_backoff: Duration::ZERO,
        }
    }

    async fn list_page() -> MockPage {
        let page = MockPage::list(vec!["<ul></ul>".into()]);
        page.navigate("mock://list").await.unwrap();
        page
    }

    #[tokio::test]
    async fn scrolls_with_the_container_hint() {
        let page = list_page().await;
        let resolver = ScriptedResolver::fresh_each_cycle(1);
        let outcome = ListHarvester::new(&page, &resolver, config())
            .harvest(2, 10, 5)
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Saturated);
        assert_eq!(page.scroll_hints(), vec![Some("div._aano".to_string()); 2]);
    }

    #[tokio::test]
    async fn resolver_errors_count_as_stagnant() {
        let page = list_page().await;
        let resolver = ScriptedResolver::new(vec![vec!["a".into()]]).failing_on(2);
        let outcome = ListHarvester::new(&page, &resolver, config())
            .harvest(5, 20, 3)
            .await
            .unwrap();

        // Cycle 1 grows; cycles 2 (error), 3 and 4 (repeat batch) stagnate.
        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.cycles, 4);
        assert_eq!(outcome.ids, vec!["a"]);
    }

    #[tokio::test]
    async fn zero_max_cycles_never_touches_the_page() {
        let page = list_page().await;
        let resolver = ScriptedResolver::fresh_each_cycle(3);
        let outcome = ListHarvester::new(&page, &resolver, config())
            .harvest(10, 0, 5)
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Exhausted);
        assert!(outcome.ids.is_empty());
        assert_eq!(page.snapshot_calls(), 0);
    }
}
