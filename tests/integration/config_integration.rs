//! Integration tests for Configuration System

use crate::integration::test_utils::{set_available, test_engine_with, with_isolated_env};
use lessonpool::batch::RefillOutcome;
use lessonpool::config::{ConfigLoader, Environment, LessonPoolConfig, ValidationError};
use lessonpool::types::PoolType;
use lessonpool::LessonEngine;
use tempfile::TempDir;

fn write_workspace_config(root: &std::path::Path, name: &str, body: &str) {
    let dir = root.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), body).unwrap();
}

#[test]
fn test_workspace_without_config_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();

    let config = with_isolated_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap());

    assert_eq!(config, LessonPoolConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_file_selects_production_cap() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write_workspace_config(
        &workspace,
        "config.toml",
        r#"
[batch]
items_per_request = 4
max_requests_production = 3
"#,
    );
    write_workspace_config(&workspace, "production.toml", "environment = \"production\"\n");

    let config = with_isolated_env(&temp_dir, || {
        std::env::set_var("LESSONPOOL_ENV", "production");
        ConfigLoader::load(&workspace).unwrap()
    });

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.batch.items_per_request, 4);
    assert_eq!(config.batch.request_cap(config.environment), 3);
}

#[tokio::test]
async fn test_loaded_batch_settings_drive_refill_size() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("lessonpool.toml");
    std::fs::write(
        &config_file,
        r#"
environment = "production"
themes = ["Typography"]

[pools.scheduled]
size = 12
min_threshold = 4

[batch]
items_per_request = 4
max_requests_production = 10

[monitor]
inter_job_delay_ms = 0
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());

    let t = test_engine_with(config);
    set_available(&t.store, PoolType::Scheduled, 1);

    let outcome = t
        .engine
        .orchestrator()
        .refill_pool(PoolType::Scheduled)
        .await
        .unwrap();

    match outcome {
        RefillOutcome::Submitted { job } => assert_eq!(job.expected_count, 12),
        other => panic!("expected a submission, got {:?}", other),
    }
    let requests = &t.api.submissions()[0];
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|request| request.theme == "Typography"));
}

#[test]
fn test_invalid_pool_settings_are_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("lessonpool.toml");
    std::fs::write(
        &config_file,
        r#"
themes = ["Typography", "typography"]

[pools.on_demand]
size = 5
min_threshold = 9
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();

    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Pool(PoolType::OnDemand, _))));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Themes(_))));
}

#[test]
fn test_engine_opens_and_reports_status_without_api_key() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store");

    let status = with_isolated_env(&temp_dir, || {
        let engine = LessonEngine::open(&LessonPoolConfig::default(), &store_path).unwrap();
        engine.status().unwrap()
    });

    assert_eq!(status.pools.len(), 2);
    assert!(status.pools.iter().all(|pool| pool.stats.available_items == 0));
    assert!(status.active_jobs.is_empty());
}
