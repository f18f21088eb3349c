mod common;

use chrono::{Duration, Local, Utc};
use common::{days_ago, Harness};
use keeper_core::config::models::SchedulerConfig;
use keeper_core::KeeperError;
use keeper_dispatcher::eligibility::cadence_reference_time;
use keeper_dispatcher::{Eligibility, GuardKind};

fn harness_with_max_load(max_load_allowed: f64) -> Harness {
    Harness::with_config(SchedulerConfig {
        max_load_allowed,
        ..SchedulerConfig::default()
    })
}

#[tokio::test]
async fn test_never_run_spider_is_eligible() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);

    let result = h
        .evaluator()
        .evaluate(&spiders[0], 4.0, 0.0, Local::now())
        .await
        .unwrap();
    assert_eq!(result, Eligibility::Eligible);
}

#[tokio::test]
async fn test_spider_that_ran_today_is_rejected() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    let now = Local::now();
    let earlier_today = cadence_reference_time(&now, false) + Duration::seconds(1);
    h.finished_run(&spiders[0], earlier_today.with_timezone(&Utc), 0, Some(1.0));

    let result = h.evaluator().evaluate(&spiders[0], 4.0, 0.0, now).await.unwrap();
    assert_eq!(result, Eligibility::Rejected(GuardKind::Cadence));
}

#[tokio::test]
async fn test_spider_that_ran_yesterday_is_eligible() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    h.finished_run(&spiders[0], days_ago(1) - Duration::hours(1), 30, Some(1.0));

    let result = h
        .evaluator()
        .evaluate(&spiders[0], 4.0, 0.0, Local::now())
        .await
        .unwrap();
    assert!(result.is_eligible());
}

#[tokio::test]
async fn test_weekly_spider_cadence() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["sellers.recent", "sellers.stale"]);
    h.finished_run(&spiders[0], days_ago(3), 60, Some(2.0));
    h.finished_run(&spiders[1], days_ago(8), 60, Some(2.0));

    let evaluator = h.evaluator();
    let now = Local::now();
    assert_eq!(
        evaluator.evaluate(&spiders[0], 2.0, 0.0, now).await.unwrap(),
        Eligibility::Rejected(GuardKind::Cadence)
    );
    assert_eq!(
        evaluator.evaluate(&spiders[1], 2.0, 0.0, now).await.unwrap(),
        Eligibility::Eligible
    );
}

#[tokio::test]
async fn test_pending_or_running_spider_is_never_selected() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["queued", "busy"]);
    h.pending_run(&spiders[0], days_ago(2));
    h.running_run(&spiders[1], days_ago(2), Some(1.0));

    let evaluator = h.evaluator();
    let now = Local::now();
    assert_eq!(
        evaluator.evaluate(&spiders[0], 0.1, 0.0, now).await.unwrap(),
        Eligibility::Rejected(GuardKind::Pending)
    );
    assert_eq!(
        evaluator.evaluate(&spiders[1], 0.1, 0.0, now).await.unwrap(),
        Eligibility::Rejected(GuardKind::Running)
    );
}

#[tokio::test]
async fn test_manual_override() {
    let h = Harness::new();
    let (project, spiders) = h.project_with_spiders("shop", &["manual"]);
    h.store.set_auto_schedule(spiders[0].id, false);
    let no_setup = h.store.add_spider_without_setup(project.id, "legacy");

    let evaluator = h.evaluator();
    let now = Local::now();
    assert_eq!(
        evaluator.evaluate(&spiders[0], 1.0, 0.0, now).await.unwrap(),
        Eligibility::Rejected(GuardKind::ManualOverride)
    );
    assert!(evaluator
        .evaluate(&no_setup, 1.0, 0.0, now)
        .await
        .unwrap()
        .is_eligible());
}

#[tokio::test]
async fn test_load_ceiling() {
    let h = harness_with_max_load(10.0);
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    let evaluator = h.evaluator();
    let now = Local::now();

    assert_eq!(
        evaluator.evaluate(&spiders[0], 3.0, 8.0, now).await.unwrap(),
        Eligibility::Rejected(GuardKind::Load)
    );
    assert_eq!(
        evaluator.evaluate(&spiders[0], 2.0, 8.0, now).await.unwrap(),
        Eligibility::Eligible
    );
}

#[tokio::test]
async fn test_insufficient_memory() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    h.memory.set_enough(false);

    let result = h
        .evaluator()
        .evaluate(&spiders[0], 1.0, 0.0, Local::now())
        .await
        .unwrap();
    assert_eq!(result, Eligibility::Rejected(GuardKind::Resource));
}

#[tokio::test]
async fn test_guards_short_circuit_in_order() {
    let h = harness_with_max_load(10.0);
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    h.running_run(&spiders[0], days_ago(2), Some(1.0));
    h.store.set_auto_schedule(spiders[0].id, false);
    h.memory.set_fail(true);

    // 运行中检查先于人工开关、负载与内存检查，内存检查不会被调用
    let result = h
        .evaluator()
        .evaluate(&spiders[0], 50.0, 50.0, Local::now())
        .await
        .unwrap();
    assert_eq!(result, Eligibility::Rejected(GuardKind::Running));
}

#[tokio::test]
async fn test_should_run_by_id() {
    let h = harness_with_max_load(10.0);
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);
    let evaluator = h.evaluator();

    assert!(evaluator.should_run(spiders[0].id, 2.0, 8.0).await.unwrap());
    assert!(!evaluator.should_run(spiders[0].id, 3.0, 8.0).await.unwrap());
    assert!(matches!(
        evaluator.should_run(9999, 1.0, 0.0).await,
        Err(KeeperError::SpiderNotFound { id: 9999 })
    ));
}
