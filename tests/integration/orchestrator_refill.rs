//! Integration tests for pool refills

use crate::integration::test_utils::{available, set_available, test_config, test_engine, test_engine_with};
use lessonpool::batch::RefillOutcome;
use lessonpool::config::Environment;
use lessonpool::store::{JobStore, StatsStore};
use lessonpool::types::{BatchJobStatus, PoolType};

#[tokio::test]
async fn test_low_pool_in_development_submits_one_request() {
    let t = test_engine();
    set_available(&t.store, PoolType::Scheduled, 2);

    let inventory = t.engine.inventory();
    assert!(inventory.is_refill_needed(PoolType::Scheduled).unwrap());
    assert_eq!(inventory.refill_quantity(PoolType::Scheduled).unwrap(), 18);

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    let job = match outcome {
        RefillOutcome::Submitted { job } => job,
        other => panic!("expected a submission, got {:?}", other),
    };
    assert_eq!(job.expected_count, 5);
    assert_eq!(job.status, BatchJobStatus::Created);
    assert_eq!(job.pool, PoolType::Scheduled);

    let submissions = t.api.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 1);
    assert!(submissions[0][0].custom_id.starts_with("scheduled-"));

    let stored = t.store.get_job(&job.id).unwrap().unwrap();
    assert_eq!(stored, job);

    let stats = t.store.get_stats(PoolType::Scheduled).unwrap().unwrap();
    assert_eq!(stats.last_batch_id.as_deref(), Some(job.batch_id.as_str()));
    assert!(stats.last_generated_at.is_some());
    // Submission alone does not change the counts.
    assert_eq!(stats.available_items, 2);
}

#[tokio::test]
async fn test_production_cap_allows_more_requests() {
    let mut config = test_config();
    config.environment = Environment::Production;
    let t = test_engine_with(config);
    set_available(&t.store, PoolType::Scheduled, 2);

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    match outcome {
        RefillOutcome::Submitted { job } => assert_eq!(job.expected_count, 20),
        other => panic!("expected a submission, got {:?}", other),
    }
    assert_eq!(t.api.submissions()[0].len(), 4);
}

#[tokio::test]
async fn test_pool_never_refilled_counts_as_empty() {
    let t = test_engine();

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::OnDemand)
        .await
        .unwrap();

    assert!(matches!(outcome, RefillOutcome::Submitted { .. }));
    assert_eq!(t.api.submit_calls(), 1);
}

#[tokio::test]
async fn test_second_refill_while_job_in_flight_is_skipped() {
    let t = test_engine();
    set_available(&t.store, PoolType::Scheduled, 0);
    let orchestrator = t.engine.orchestrator();

    let first = orchestrator.refill_pool(PoolType::Scheduled).await.unwrap();
    assert!(matches!(first, RefillOutcome::Submitted { .. }));

    let second = orchestrator.refill_pool(PoolType::Scheduled).await.unwrap();
    assert!(matches!(second, RefillOutcome::AlreadyActive));
    assert_eq!(t.api.submit_calls(), 1);

    let active: Vec<_> = t
        .store
        .list_active_jobs()
        .unwrap()
        .into_iter()
        .filter(|job| job.pool == PoolType::Scheduled)
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_concurrent_refills_leave_one_active_job() {
    let t = test_engine();
    set_available(&t.store, PoolType::OnDemand, 0);
    let orchestrator = t.engine.orchestrator().clone();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.refill_pool(PoolType::OnDemand).await })
        })
        .collect();

    let mut submitted = 0;
    for handle in handles {
        if let RefillOutcome::Submitted { .. } = handle.await.unwrap().unwrap() {
            submitted += 1;
        }
    }

    assert_eq!(submitted, 1);
    let active = t
        .store
        .list_active_jobs()
        .unwrap()
        .into_iter()
        .filter(|job| job.pool == PoolType::OnDemand)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_pool_at_threshold_needs_no_refill() {
    let t = test_engine();
    // Scheduled threshold is 5; refill only triggers strictly below it.
    set_available(&t.store, PoolType::Scheduled, 5);

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    assert!(matches!(outcome, RefillOutcome::NotNeeded));
    assert_eq!(t.api.submit_calls(), 0);
}

#[tokio::test]
async fn test_failed_submission_records_attempt_without_job() {
    let t = test_engine();
    set_available(&t.store, PoolType::Scheduled, 1);
    t.api.fail_next_submit("upstream unavailable");

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    match outcome {
        RefillOutcome::SubmissionFailed { error } => assert!(error.contains("upstream unavailable")),
        other => panic!("expected a submission failure, got {:?}", other),
    }
    assert!(t.store.list_jobs().unwrap().is_empty());

    let stats = t.store.get_stats(PoolType::Scheduled).unwrap().unwrap();
    assert!(stats.last_generated_at.is_some());
    assert!(stats.last_batch_id.is_none());
    assert_eq!(available(&t.store, PoolType::Scheduled), 1);

    // The next trigger tries again.
    let retry = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();
    assert!(matches!(retry, RefillOutcome::Submitted { .. }));
}

#[tokio::test]
async fn test_themes_rotate_across_requests() {
    let mut config = test_config();
    config.environment = Environment::Production;
    let t = test_engine_with(config);
    set_available(&t.store, PoolType::Scheduled, 0);

    t.engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    let themes: Vec<String> = t.api.submissions()[0]
        .iter()
        .map(|request| request.theme.clone())
        .collect();
    assert_eq!(
        themes,
        vec!["Color Theory", "Typography", "Accessibility", "Color Theory"]
    );

    let ids: Vec<String> = t.api.submissions()[0]
        .iter()
        .map(|request| request.custom_id.clone())
        .collect();
    assert!(ids[0].ends_with("-0-color-theory"));
    assert!(ids[1].ends_with("-1-typography"));
}

#[tokio::test]
async fn test_refill_all_covers_every_pool() {
    let t = test_engine();

    let outcomes = t.engine.orchestrator().refill_all().await;

    assert_eq!(outcomes.len(), PoolType::ALL.len());
    for (_, outcome) in outcomes {
        assert!(matches!(outcome.unwrap(), RefillOutcome::Submitted { .. }));
    }
    assert_eq!(t.store.list_active_jobs().unwrap().len(), 2);
}
