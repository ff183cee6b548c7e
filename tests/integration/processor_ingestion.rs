//! Integration tests for batch result ingestion

use crate::integration::test_utils::{available, lesson_json, result_line, test_engine, wrapped_line};
use lessonpool::error::ApiError;
use lessonpool::store::{ItemStore, JobStore, PoolStore};
use lessonpool::types::{BatchJob, BatchJobStatus, PoolType};
use serde_json::json;
use std::sync::Arc;

fn tracked_job(store: &Arc<dyn PoolStore>, batch_id: &str, pool: PoolType) -> BatchJob {
    let job = BatchJob::new(batch_id.to_string(), pool, 15);
    store.insert_active_job(&job).unwrap();
    job
}

#[tokio::test]
async fn test_malformed_line_does_not_abort_ingestion() {
    let t = test_engine();
    let mut job = tracked_job(&t.store, "batch_a", PoolType::Scheduled);
    let ndjson = [
        result_line("req-1", &lesson_json("Contrast").to_string()),
        "{\"custom_id\": \"req-2\", \"response\": ".to_string(),
        wrapped_line("req-3", 2),
    ]
    .join("\n");
    t.api.set_results("file_a", ndjson);

    let report = t
        .engine
        .processor()
        .process(&mut job, "file_a")
        .await
        .unwrap();

    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 1);
    assert!(t.store.get_item("req-1").unwrap().is_some());
    assert!(t.store.get_item("req-3").unwrap().is_some());
    assert!(t.store.get_item("req-3-1").unwrap().is_some());
    assert_eq!(available(&t.store, PoolType::Scheduled), 3);

    let stored = t.store.get_job(&job.id).unwrap().unwrap();
    assert_eq!(stored.status, BatchJobStatus::Completed);
    assert_eq!(stored.results_ref.as_deref(), Some("file_a"));
}

#[tokio::test]
async fn test_fetch_failure_marks_job_failed() {
    let t = test_engine();
    let mut job = tracked_job(&t.store, "batch_b", PoolType::OnDemand);
    t.api.fail_results("file_b", "connection refused");

    let err = t
        .engine
        .processor()
        .process(&mut job, "file_b")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::ResultsFetchFailed(_)));
    assert_eq!(job.status, BatchJobStatus::Failed);
    let stored = t.store.get_job(&job.id).unwrap().unwrap();
    assert_eq!(stored.status, BatchJobStatus::Failed);
    assert_eq!(available(&t.store, PoolType::OnDemand), 0);
}

#[tokio::test]
async fn test_reingesting_same_results_does_not_double_count() {
    let t = test_engine();
    t.api.set_results("file_c", wrapped_line("dup", 3));

    let mut first = tracked_job(&t.store, "batch_c1", PoolType::Scheduled);
    let report = t
        .engine
        .processor()
        .process(&mut first, "file_c")
        .await
        .unwrap();
    assert_eq!(report.success_count, 3);

    let mut second = tracked_job(&t.store, "batch_c2", PoolType::Scheduled);
    let report = t
        .engine
        .processor()
        .process(&mut second, "file_c")
        .await
        .unwrap();

    assert_eq!(report.success_count, 0);
    assert_eq!(report.failure_count, 0);
    assert_eq!(available(&t.store, PoolType::Scheduled), 3);
    assert_eq!(t.store.list_items(PoolType::Scheduled).unwrap().len(), 3);
    assert_eq!(second.status, BatchJobStatus::Completed);
}

#[tokio::test]
async fn test_fenced_and_truncated_payloads_are_repaired() {
    let t = test_engine();
    let mut job = tracked_job(&t.store, "batch_d", PoolType::OnDemand);
    let fenced = format!("```json\n{}\n```", lesson_json("Spacing"));
    let truncated = r#"{"title": "Grids", "content": ["Columns align content."], "quiz_options": ["A", "B""#;
    let ndjson = [result_line("fenced", &fenced), result_line("cut", truncated)].join("\n");
    t.api.set_results("file_d", ndjson);

    let report = t
        .engine
        .processor()
        .process(&mut job, "file_d")
        .await
        .unwrap();

    assert_eq!(report.success_count, 2);
    assert_eq!(report.failure_count, 0);
    assert_eq!(t.store.get_item("fenced").unwrap().unwrap().title, "Spacing");
    assert_eq!(t.store.get_item("cut").unwrap().unwrap().title, "Grids");
}

#[tokio::test]
async fn test_sparse_lessons_are_normalized_before_storage() {
    let t = test_engine();
    let mut job = tracked_job(&t.store, "batch_e", PoolType::Scheduled);
    let sparse = json!({
        "title": "Affordances",
        "quiz_options": "Buttons, Links",
        "correct_option_index": 7
    });
    t.api.set_results(
        "file_e",
        result_line("scheduled-1-0-typography", &sparse.to_string()),
    );

    t.engine
        .processor()
        .process(&mut job, "file_e")
        .await
        .unwrap();

    let lesson = t.store.get_item("scheduled-1-0-typography").unwrap().unwrap();
    assert_eq!(lesson.theme, "Typography");
    assert!(lesson.quiz_options.len() >= 4);
    assert!(lesson.correct_option_index < lesson.quiz_options.len());
    assert_eq!(lesson.option_explanations.len(), lesson.quiz_options.len());
    assert!(!lesson.content.is_empty());
    assert!(!lesson.explanation.is_empty());
    assert!(lesson.hashtags.iter().all(|tag| tag.starts_with('#')));
}

#[tokio::test]
async fn test_line_without_lessons_counts_as_failure() {
    let t = test_engine();
    let mut job = tracked_job(&t.store, "batch_f", PoolType::OnDemand);
    let ndjson = [
        result_line("empty", r#"{"lessons": []}"#),
        result_line("prose", "I'm sorry, I can't help with that."),
        wrapped_line("ok", 1),
    ]
    .join("\n");
    t.api.set_results("file_f", ndjson);

    let report = t
        .engine
        .processor()
        .process(&mut job, "file_f")
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failure_count, 2);
}
