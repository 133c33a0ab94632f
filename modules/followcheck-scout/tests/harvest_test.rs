//! Harvest scenarios: ListHarvester driven by MockPage and a scripted or real
//! resolver. No browser, no network, no sleeping.

use std::time::Duration;

use followcheck_common::{PageError, SiteSettings};
use followcheck_scout::pipeline::harvester::{HarvestConfig, HarvestError, ListHarvester};
use followcheck_scout::pipeline::resolver::EntityResolver;
use followcheck_scout::pipeline::state::{
    CycleObservation, HarvestLimits, HarvestState, Termination,
};
use followcheck_scout::testing::{followers_frame, MockPage, ScriptedResolver, LIST_URL};
use followcheck_scout::traits::PageAccessor;

fn config(snapshot_attempts: u32) -> HarvestConfig {
    HarvestConfig {
        container_hint: None,
        settle_timeout: Duration::ZERO,
        snapshot_attempts,
        retry_backoff: Duration::ZERO,
    }
}

async fn open(page: &MockPage) {
    page.navigate(LIST_URL).await.unwrap();
}

// ---------------------------------------------------------------------------
// Terminal states
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saturates_in_ceil_target_over_batch_cycles() {
    let page = MockPage::list(vec!["<ul></ul>".into()]);
    open(&page).await;
    let resolver = ScriptedResolver::fresh_each_cycle(3);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(10, 100, 5)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Saturated);
    assert_eq!(outcome.cycles, 4);
    assert_eq!(outcome.ids.len(), 10);
    assert_eq!(outcome.discovered, 12);
    assert_eq!(outcome.ids.first().map(String::as_str), Some("entity_0"));
    assert_eq!(outcome.ids.last().map(String::as_str), Some("entity_9"));
}

#[tokio::test]
async fn converges_after_stagnation_limit_without_reaching_target() {
    let page = MockPage::list(vec!["<ul><li>static</li></ul>".into()]);
    open(&page).await;
    let resolver = ScriptedResolver::repeating(&["a", "b"]);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(10, 100, 5)
        .await
        .unwrap();

    // One growing cycle, then five stagnant ones.
    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.cycles, 6);
    assert_eq!(outcome.ids, vec!["a", "b"]);
}

#[tokio::test]
async fn exhausts_cycle_budget_while_still_growing() {
    let page = MockPage::list(vec!["<ul></ul>".into()]);
    open(&page).await;
    let resolver = ScriptedResolver::fresh_each_cycle(1);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(1_000, 7, 5)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(outcome.cycles, 7);
    assert_eq!(outcome.ids.len(), 7);
}

#[tokio::test]
async fn size_change_without_new_ids_is_not_stagnation() {
    // Each scroll re-renders a longer page but the same ids.
    let frames: Vec<String> = (0..20).map(|i| format!("<ul>{}</ul>", "x".repeat(i))).collect();
    let page = MockPage::list(frames);
    open(&page).await;
    let resolver = ScriptedResolver::repeating(&["only"]);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(10, 8, 2)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(outcome.cycles, 8);
}

// ---------------------------------------------------------------------------
// Failure semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_snapshot_failure_costs_one_stagnant_cycle() {
    let page = MockPage::list(vec!["<ul></ul>".into()])
        .on_snapshot_failure(2, PageError::Transient("render timed out".into()));
    open(&page).await;
    let resolver = ScriptedResolver::fresh_each_cycle(2);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(6, 100, 5)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Saturated);
    assert_eq!(outcome.cycles, 4);
    assert_eq!(resolver.calls(), 3);
}

#[tokio::test]
async fn retried_snapshot_keeps_the_cycle_productive() {
    let page = MockPage::list(vec!["<ul></ul>".into()])
        .on_snapshot_failure(2, PageError::Transient("render timed out".into()));
    open(&page).await;
    let resolver = ScriptedResolver::fresh_each_cycle(2);

    let outcome = ListHarvester::new(&page, &resolver, config(2))
        .harvest(6, 100, 5)
        .await
        .unwrap();

    assert_eq!(outcome.cycles, 3);
    assert_eq!(page.snapshot_calls(), 4);
}

#[tokio::test]
async fn session_loss_propagates_with_partial_ids() {
    let page = MockPage::list(vec!["<ul></ul>".into()])
        .on_snapshot_failure(3, PageError::SessionLost("logged out".into()));
    open(&page).await;
    let resolver = ScriptedResolver::fresh_each_cycle(2);

    let err = ListHarvester::new(&page, &resolver, config(3))
        .harvest(100, 100, 5)
        .await
        .unwrap_err();

    let HarvestError::SessionLost {
        partial,
        cycles,
        source,
    } = err;
    assert_eq!(cycles, 2);
    assert_eq!(partial, vec!["entity_0", "entity_1", "entity_2", "entity_3"]);
    assert!(source.is_fatal());
}

#[tokio::test]
async fn missing_page_fails_every_cycle_until_convergence() {
    // Never navigated: every snapshot is a transient failure.
    let page = MockPage::list(vec!["<ul></ul>".into()]);
    let resolver = ScriptedResolver::fresh_each_cycle(2);

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(10, 100, 3)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.cycles, 3);
    assert!(outcome.ids.is_empty());
    assert_eq!(resolver.calls(), 0);
}

// ---------------------------------------------------------------------------
// Real resolver over a virtualized followers panel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn harvests_growing_followers_panel() {
    let ids: Vec<String> = (0..12).map(|i| format!("user_{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let frames = vec![
        followers_frame(&refs[..3]),
        followers_frame(&refs[..6]),
        followers_frame(&refs[..9]),
        followers_frame(&refs[..12]),
    ];
    let page = MockPage::list(frames);
    open(&page).await;
    let resolver = EntityResolver::followers(&SiteSettings::default(), "audited");

    let outcome = ListHarvester::new(&page, &resolver, config(1))
        .harvest(100, 50, 3)
        .await
        .unwrap();

    // Frames 1..=3 grow, then the last frame repeats for three stagnant cycles.
    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.cycles, 6);
    assert_eq!(outcome.ids.len(), 12);
    assert_eq!(outcome.ids[0], "user_0");
    assert_eq!(outcome.ids[11], "user_11");
}

// ---------------------------------------------------------------------------
// State machine properties
// ---------------------------------------------------------------------------

#[test]
fn seen_set_never_shrinks_and_loop_is_bounded() {
    let batches: Vec<Vec<&str>> = vec![
        vec!["a", "b"],
        vec![],
        vec!["b"],
        vec!["c", "a", "d"],
        vec!["d"],
        vec!["e"],
    ];
    let mut state = HarvestState::new(HarvestLimits {
        target: 100,
        max_cycles: 25,
        stagnation_limit: 50,
    })
    .begin();

    let mut previous = 0;
    let mut steps = 0;
    while !state.is_terminal() {
        let batch = &batches[steps % batches.len()];
        let observation = (!batch.is_empty()).then(|| CycleObservation {
            candidates: batch.iter().map(|s| s.to_string()).collect(),
            snapshot_size: 100,
        });
        state = state.step(observation);
        assert!(state.discovered() >= previous);
        previous = state.discovered();
        steps += 1;
        assert!(steps <= 25);
    }

    assert_eq!(state.termination(), Some(Termination::Exhausted));
    assert_eq!(state.into_ids(), vec!["a", "b", "c", "d", "e"]);
}
