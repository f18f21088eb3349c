mod common;

use common::{days_ago, Harness};
use keeper_core::KeeperError;
use keeper_dispatcher::LoadAccountant;
use std::sync::Arc;

#[tokio::test]
async fn test_recommended_throttle_without_history_is_default() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books"]);

    let throttle = h.throttle().recommended_throttle_by_id(spiders[0].id).await.unwrap();
    assert_eq!(throttle, 4.0);
}

#[tokio::test]
async fn test_recommended_throttle_from_history() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["quick", "slow"]);
    for day in 1..=3 {
        h.finished_run(&spiders[0], days_ago(day), 144, Some(4.0));
        h.finished_run(&spiders[1], days_ago(day), 14_400, Some(4.0));
    }
    // 未结束的运行不参与估算
    h.running_run(&spiders[0], days_ago(0), Some(4.0));

    let estimator = h.throttle();
    assert_eq!(estimator.recommended_throttle(&spiders[0]).await.unwrap(), 0.4);
    assert_eq!(estimator.recommended_throttle(&spiders[1]).await.unwrap(), 8.0);
}

#[tokio::test]
async fn test_average_load_uses_productive_runs() {
    let h = Harness::new();
    let (_, spiders) = h.project_with_spiders("shop", &["books", "fresh"]);
    h.finished_run(&spiders[0], days_ago(3), 60, Some(2.0));
    h.finished_run(&spiders[0], days_ago(2), 60, Some(4.0));
    h.store.record_run(spiders[0].project_id, "books", Some(9.0), |e| {
        e.running_status = keeper_core::models::SpiderStatus::Finished;
        e.start_time = Some(days_ago(1));
        e.end_time = Some(days_ago(1));
        e.requests_count = Some(0);
    });

    let estimator = h.throttle();
    assert_eq!(estimator.average_load(&spiders[0]).await.unwrap(), 3.0);
    assert_eq!(estimator.average_load(&spiders[1]).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_unknown_spider() {
    let h = Harness::new();
    let result = h.throttle().recommended_throttle_by_id(42).await;
    assert!(matches!(result, Err(KeeperError::SpiderNotFound { id: 42 })));
}

#[tokio::test]
async fn test_current_load_sums_running_executions() {
    let h = Harness::new();
    let (project, spiders) = h.project_with_spiders("shop", &["a", "b", "c", "d"]);
    let (other, other_spiders) = h.project_with_spiders("other", &["a"]);
    h.running_run(&spiders[0], days_ago(0), Some(3.0));
    h.running_run(&spiders[1], days_ago(0), None);
    h.pending_run(&spiders[2], days_ago(0));
    h.finished_run(&spiders[3], days_ago(1), 10, Some(7.0));
    h.running_run(&other_spiders[0], days_ago(0), Some(5.0));

    let accountant = LoadAccountant::new(Arc::new(h.store.clone()));
    assert_eq!(accountant.current_load(project.id).await.unwrap(), 3.0);
    assert_eq!(accountant.current_load(other.id).await.unwrap(), 5.0);
    assert_eq!(accountant.current_load(9999).await.unwrap(), 0.0);
}
