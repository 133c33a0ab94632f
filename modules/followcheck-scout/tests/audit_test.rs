//! End-to-end audit runs against MockPage: list harvest, per-id fetches,
//! analysis, scoring and report emission into a temp directory.

use followcheck_common::{FileConfig, PageError, SummaryRecord, Verdict};
use followcheck_scout::report::ReportWriter;
use followcheck_scout::testing::{
    followers_frame, grid_frame, post_page, profile_page, MockPage,
};
use followcheck_scout::workflows::{EngagementAudit, FollowerAudit};

const BASE: &str = "https://www.instagram.com";
const PROFILE: &str = "target.acct";

fn fast_config(target: usize, stagnation_limit: u32) -> FileConfig {
    let mut config = FileConfig::default();
    config.harvest.target_sample_size = target;
    config.harvest.stagnation_limit = stagnation_limit;
    config.harvest.max_cycles = 20;
    config.harvest.settle_timeout_ms = 0;
    config.harvest.retry_backoff_ms = 0;
    config.harvest.snapshot_attempts = 1;
    config.fetch.min_delay_ms = 0;
    config.fetch.max_delay_ms = 0;
    config.fetch.ready_timeout_ms = 0;
    config.fetch.snapshot_attempts = 1;
    config
}

const FOLLOWERS: [(&str, &str); 6] = [
    ("ana.r", "1,200"),
    ("b_martin", "1.5K"),
    ("carla99", "2,300"),
    ("dev.ops", "150"),
    ("ghost.user", ""),
    ("zed_z", "8,700"),
];

/// Profile page, a followers panel that reveals three then six entries, and
/// a profile page per follower (except `ghost.user`).
fn followers_site() -> MockPage {
    let ids: Vec<&str> = FOLLOWERS.iter().map(|(id, _)| *id).collect();
    let mut page = MockPage::new()
        .on_page(&format!("{BASE}/{PROFILE}/"), &profile_page(PROFILE, "12.5K"))
        .on_frames(
            &format!("{BASE}/{PROFILE}/followers/"),
            vec![
                followers_frame(&ids[..3]),
                followers_frame(&ids[..3]),
                followers_frame(&ids),
            ],
        );
    for (id, count) in FOLLOWERS {
        if !count.is_empty() {
            page = page.on_page(&format!("{BASE}/{id}/"), &profile_page(id, count));
        }
    }
    page
}

fn read_summary(path: &std::path::Path) -> SummaryRecord {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Follower audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follower_audit_end_to_end() {
    let page = followers_site();
    let config = fast_config(6, 3);

    let run = FollowerAudit::new(&page, &config).run(PROFILE).await;
    let summary = &run.report.summary;

    assert!(!run.is_aborted());
    assert_eq!(summary.profile_metric, Some(12_500));
    assert_eq!(summary.total_harvested, 6);
    assert_eq!(summary.total_analyzed, 5);
    assert_eq!(summary.termination, "saturated");
    assert_eq!(summary.max_score, 40);
    assert_ne!(summary.verdict, Verdict::InsufficientData);
    assert_eq!(summary.reasons.len(), 1);

    let ghost = run
        .report
        .entities
        .iter()
        .find(|e| e.id == "ghost.user")
        .unwrap();
    assert_eq!(ghost.metric, 0);
    assert_eq!(ghost.first_digit, "N/A");

    assert_eq!(run.stats.harvested, 6);
    assert_eq!(run.stats.fetched, 5);
    assert_eq!(run.stats.fetch_failures, 1);

    // One navigation for the profile, one for the list, one per follower.
    assert_eq!(page.navigations().len(), 8);

    let dir = tempfile::tempdir().unwrap();
    let paths = ReportWriter::new(dir.path()).write(&run.report).unwrap();
    let entities_csv = std::fs::read_to_string(&paths[0]).unwrap();
    assert!(entities_csv.contains("b_martin,followers,1500,1"));
    assert!(entities_csv.contains("ghost.user,followers,0,N/A"));

    let written = read_summary(&paths[2]);
    assert_eq!(written.total_harvested, 6);
    assert!(written.aborted.is_none());
}

#[tokio::test]
async fn tiny_sample_is_insufficient_data() {
    let page = MockPage::new()
        .on_page(&format!("{BASE}/{PROFILE}/"), &profile_page(PROFILE, "90"))
        .on_page(
            &format!("{BASE}/{PROFILE}/followers/"),
            &followers_frame(&["solo.one", "solo.two"]),
        )
        .on_page(&format!("{BASE}/solo.one/"), &profile_page("solo.one", "300"))
        .on_page(&format!("{BASE}/solo.two/"), &profile_page("solo.two", "4,100"));
    let config = fast_config(100, 2);

    let run = FollowerAudit::new(&page, &config).run(PROFILE).await;
    let summary = &run.report.summary;

    assert_eq!(summary.termination, "converged");
    assert_eq!(summary.total_harvested, 2);
    assert_eq!(summary.total_analyzed, 2);
    assert_eq!(summary.max_score, 0);
    assert_eq!(summary.verdict, Verdict::InsufficientData);
    assert_eq!(run.report.distributions[0].rows.len(), 9);
}

#[tokio::test]
async fn session_loss_while_fetching_still_reports() {
    let page = followers_site().on_navigation_failure(
        &format!("{BASE}/carla99/"),
        PageError::SessionLost("checkpoint required".into()),
    );
    let config = fast_config(6, 3);

    let run = FollowerAudit::new(&page, &config).run(PROFILE).await;
    let summary = &run.report.summary;

    assert!(run.is_aborted());
    assert_eq!(summary.termination, "saturated");
    assert_eq!(summary.total_harvested, 6);
    assert_eq!(summary.total_analyzed, 2);
    assert_eq!(summary.verdict, Verdict::InsufficientData);
    assert_eq!(run.report.entities.len(), 6);

    let dir = tempfile::tempdir().unwrap();
    let paths = ReportWriter::new(dir.path()).write(&run.report).unwrap();
    let written = read_summary(&paths[2]);
    assert!(written.aborted.unwrap().contains("checkpoint required"));
}

#[tokio::test]
async fn session_loss_while_harvesting_keeps_partial_ids() {
    // Snapshot 1 is the profile page, 2 the first list cycle, 3 the second.
    let page = followers_site().on_snapshot_failure(3, PageError::SessionLost("logged out".into()));
    let config = fast_config(6, 3);

    let run = FollowerAudit::new(&page, &config).run(PROFILE).await;
    let summary = &run.report.summary;

    assert!(run.is_aborted());
    assert_eq!(summary.termination, "aborted");
    assert_eq!(summary.total_harvested, 3);
    assert_eq!(summary.total_analyzed, 0);
    assert_eq!(run.stats.cycles, 1);
    assert!(run.report.distributions[0].rows.is_empty());
}

#[tokio::test]
async fn unreachable_list_aborts_with_empty_report() {
    let page = MockPage::new().on_page(&format!("{BASE}/{PROFILE}/"), &profile_page(PROFILE, "1,000"));
    let config = fast_config(10, 3);

    let run = FollowerAudit::new(&page, &config).run(PROFILE).await;

    assert!(run.is_aborted());
    assert_eq!(run.report.summary.profile_metric, Some(1_000));
    assert!(run.report.entities.is_empty());
    assert_eq!(run.report.summary.verdict, Verdict::InsufficientData);
}

// ---------------------------------------------------------------------------
// Engagement audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn uniform_engagement_is_a_likely_bot() {
    let posts: [(&str, u64, u64); 6] = [
        ("Ca1", 95, 10),
        ("Ca2", 97, 11),
        ("Ca3", 96, 12),
        ("Ca4", 98, 13),
        ("Ca5", 94, 14),
        ("Ca6", 99, 15),
    ];
    let codes: Vec<&str> = posts.iter().map(|(c, _, _)| *c).collect();
    let mut page = MockPage::new().on_frames(
        &format!("{BASE}/brand.x/"),
        vec![
            grid_frame(&codes[..3]),
            grid_frame(&codes[..3]),
            grid_frame(&codes),
        ],
    );
    for (code, likes, comments) in posts {
        page = page.on_page(&format!("{BASE}/p/{code}/"), &post_page(likes, comments));
    }
    let config = fast_config(100, 2);

    let run = EngagementAudit::new(&page, &config).run("brand.x").await;
    let summary = &run.report.summary;

    assert!(!run.is_aborted());
    assert_eq!(summary.termination, "converged");
    assert_eq!(summary.total_harvested, 6);
    assert_eq!(summary.total_analyzed, 6);
    assert_eq!(summary.score, 100);
    assert_eq!(summary.max_score, 100);
    assert_eq!(summary.verdict, Verdict::LikelyBot);
    assert_eq!(summary.reasons.len(), 3);

    // One row per post per field.
    assert_eq!(run.report.entities.len(), 12);
    let fields: Vec<&str> = run.report.distributions.iter().map(|d| d.field.as_str()).collect();
    assert_eq!(fields, vec!["likes", "comments"]);

    let dir = tempfile::tempdir().unwrap();
    let paths = ReportWriter::new(dir.path()).write(&run.report).unwrap();
    assert!(paths[1].ends_with("brand.x_engagement_distribution.csv"));
    let dist_csv = std::fs::read_to_string(&paths[1]).unwrap();
    assert!(dist_csv.contains("likes,9,6,100.00"));
    assert!(dist_csv.contains("comments,1,6,100.00"));
}
