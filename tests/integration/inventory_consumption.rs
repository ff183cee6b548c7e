//! Integration tests for lesson consumption and pool accounting

use crate::integration::test_utils::{available, set_available, test_engine, TestEngine};
use chrono::{Duration, Utc};
use lessonpool::batch::RefillOutcome;
use lessonpool::store::{ItemStore, JobStore};
use lessonpool::types::{Lesson, PoolType};

fn lesson(id: &str, pool: PoolType, age_minutes: i64) -> Lesson {
    Lesson {
        id: id.to_string(),
        pool,
        theme: "Typography".to_string(),
        title: format!("Lesson {}", id),
        content: vec!["Body text.".to_string()],
        quiz_question: "Which is best?".to_string(),
        quiz_options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        correct_option_index: 0,
        explanation: "A is best.".to_string(),
        option_explanations: vec!["Correct.".into(), "No.".into(), "No.".into(), "No.".into()],
        hashtags: vec!["#UIUX".to_string()],
        batch_id: "batch_seed".to_string(),
        created_at: Utc::now() - Duration::minutes(age_minutes),
        used: false,
        used_at: None,
    }
}

/// Store `count` lessons, oldest first by id, and count them as produced
fn seed(t: &TestEngine, pool: PoolType, count: usize) {
    for i in 0..count {
        let age = (count - i) as i64;
        t.store
            .put_item(&lesson(&format!("{}-{}", pool, i), pool, age))
            .unwrap();
    }
    t.engine
        .inventory()
        .record_production(pool, count as u64)
        .unwrap();
}

#[tokio::test]
async fn test_next_lesson_returns_oldest_and_decrements_available() {
    let t = test_engine();
    seed(&t, PoolType::OnDemand, 12);

    let next = t.engine.next_lesson(PoolType::OnDemand).unwrap();

    let lesson = next.lesson.unwrap();
    assert_eq!(lesson.id, "on_demand-0");
    assert!(lesson.used);
    assert!(lesson.used_at.is_some());
    assert!(next.refill.is_none());
    assert_eq!(available(&t.store, PoolType::OnDemand), 11);
    assert!(t.store.get_item("on_demand-0").unwrap().unwrap().used);

    let next = t.engine.next_lesson(PoolType::OnDemand).unwrap();
    assert_eq!(next.lesson.unwrap().id, "on_demand-1");
}

#[tokio::test]
async fn test_dropping_below_threshold_starts_one_refill() {
    let t = test_engine();
    seed(&t, PoolType::Scheduled, 5);

    let first = t.engine.next_lesson(PoolType::Scheduled).unwrap();
    assert!(first.lesson.is_some());
    let outcome = first.refill.unwrap().await.unwrap().unwrap();
    match outcome {
        RefillOutcome::Submitted { job } => {
            assert_eq!(job.pool, PoolType::Scheduled);
            assert_eq!(job.expected_count, 5);
        }
        other => panic!("expected a submission, got {:?}", other),
    }

    let second = t.engine.next_lesson(PoolType::Scheduled).unwrap();
    assert!(second.lesson.is_some());
    let outcome = second.refill.unwrap().await.unwrap().unwrap();
    assert!(matches!(outcome, RefillOutcome::AlreadyActive));

    assert_eq!(t.api.submit_calls(), 1);
    assert_eq!(t.store.list_active_jobs().unwrap().len(), 1);
    assert_eq!(available(&t.store, PoolType::Scheduled), 3);
}

#[tokio::test]
async fn test_empty_pool_yields_nothing_and_requests_refill() {
    let t = test_engine();

    let next = t.engine.next_lesson(PoolType::Scheduled).unwrap();

    assert!(next.lesson.is_none());
    let outcome = next.refill.unwrap().await.unwrap().unwrap();
    assert!(matches!(outcome, RefillOutcome::Submitted { .. }));
    assert_eq!(available(&t.store, PoolType::Scheduled), 0);
}

#[test]
fn test_next_lesson_outside_runtime_defers_refill() {
    let t = test_engine();
    seed(&t, PoolType::Scheduled, 1);

    let next = t.engine.next_lesson(PoolType::Scheduled).unwrap();

    assert!(next.lesson.is_some());
    assert!(next.refill.is_none());
    assert_eq!(t.api.submit_calls(), 0);
}

#[test]
fn test_consuming_twice_changes_nothing() {
    let t = test_engine();
    seed(&t, PoolType::OnDemand, 3);
    let inventory = t.engine.inventory();

    assert!(inventory
        .record_consumption(PoolType::OnDemand, "on_demand-1")
        .unwrap());
    assert!(!inventory
        .record_consumption(PoolType::OnDemand, "on_demand-1")
        .unwrap());
    assert_eq!(available(&t.store, PoolType::OnDemand), 2);
}

#[test]
fn test_pools_are_accounted_separately() {
    let t = test_engine();
    seed(&t, PoolType::Scheduled, 2);
    seed(&t, PoolType::OnDemand, 4);

    let next = t.engine.next_lesson(PoolType::Scheduled).unwrap();
    assert_eq!(next.lesson.unwrap().pool, PoolType::Scheduled);

    assert_eq!(available(&t.store, PoolType::Scheduled), 1);
    assert_eq!(available(&t.store, PoolType::OnDemand), 4);
}

#[test]
fn test_refill_needed_is_strictly_below_threshold() {
    let t = test_engine();
    let inventory = t.engine.inventory();

    set_available(&t.store, PoolType::Scheduled, 2);
    assert!(inventory.is_refill_needed(PoolType::Scheduled).unwrap());
    assert_eq!(inventory.refill_quantity(PoolType::Scheduled).unwrap(), 18);

    set_available(&t.store, PoolType::Scheduled, 5);
    assert!(!inventory.is_refill_needed(PoolType::Scheduled).unwrap());

    set_available(&t.store, PoolType::Scheduled, 25);
    assert_eq!(inventory.refill_quantity(PoolType::Scheduled).unwrap(), 0);
}

#[tokio::test]
async fn test_status_reports_pools_and_active_jobs() {
    let t = test_engine();
    seed(&t, PoolType::OnDemand, 15);
    t.engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    let status = t.engine.status().unwrap();

    assert_eq!(status.pools.len(), 2);
    let scheduled = &status.pools[0];
    assert_eq!(scheduled.stats.pool, PoolType::Scheduled);
    assert!(scheduled.refill_needed);
    let on_demand = &status.pools[1];
    assert_eq!(on_demand.stats.available_items, 15);
    assert!(!on_demand.refill_needed);
    assert_eq!(on_demand.settings.size, 30);

    assert_eq!(status.active_jobs.len(), 1);
    assert_eq!(status.active_jobs[0].pool, PoolType::Scheduled);
}
