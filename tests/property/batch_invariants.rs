//! Property-based tests for backoff, request planning and lesson normalization

use chrono::Utc;
use lessonpool::batch::backoff::BackoffConfig;
use lessonpool::batch::normalize::{normalize_lesson, LessonContext};
use lessonpool::batch::orchestrator::plan_requests;
use lessonpool::batch::processor::parse_results;
use lessonpool::batch::repair::parse_payload;
use lessonpool::types::{BatchJob, PoolType};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

const ROUNDING: Duration = Duration::from_millis(1);

fn backoff_config() -> impl Strategy<Value = BackoffConfig> {
    (1u64..5_000, 0u64..600_000, 0.0f64..=1.0).prop_map(|(base, extra, ratio)| BackoffConfig {
        base_delay_ms: base,
        max_delay_ms: base + extra,
        jitter_ratio: ratio,
    })
}

/// Unjittered delay never shrinks as retries grow and never passes the cap
#[test]
fn test_backoff_is_monotonic_and_capped() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(backoff_config(), 0u32..80), |(config, retry)| {
            let current = config.base_delay(retry);
            let next = config.base_delay(retry + 1);
            let cap = Duration::from_millis(config.max_delay_ms);

            prop_assert!(next >= current);
            prop_assert!(current <= cap);
            prop_assert!(current >= Duration::from_millis(config.base_delay_ms));
            Ok(())
        })
        .unwrap();
}

/// Jitter stays within the configured ratio of the unjittered delay
#[test]
fn test_backoff_jitter_is_bounded() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(backoff_config(), 0u32..40, "[a-z0-9_]{1,24}"),
            |(config, retry, seed)| {
                let base = config.base_delay(retry).as_secs_f64();
                let delay = config.delay(retry, &seed);
                let cap = Duration::from_millis(config.max_delay_ms);
                let spread = Duration::from_secs_f64(base * config.jitter_ratio);
                let base = config.base_delay(retry);

                prop_assert!(delay <= cap + ROUNDING);
                prop_assert!(delay + ROUNDING >= base);
                prop_assert!(delay <= base + spread + ROUNDING);
                prop_assert_eq!(delay, config.delay(retry, &seed));
                Ok(())
            },
        )
        .unwrap();
}

/// Jittered delays never shrink as retries grow, including past the cap
#[test]
fn test_jittered_backoff_is_monotonic() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(backoff_config(), 0u32..60, "[a-z0-9_]{1,24}"),
            |(config, retry, seed)| {
                let current = config.delay(retry, &seed);
                let next = config.delay(retry + 1, &seed);

                prop_assert!(next >= current, "{:?} then {:?}", current, next);
                Ok(())
            },
        )
        .unwrap();
}

/// Planned requests cover the refill unless the cap stops them
#[test]
fn test_plan_requests_covers_demand_within_cap() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0u64..10_000, 1u32..50, 0u32..20), |(items, per_request, cap)| {
            let planned = plan_requests(items, per_request, cap);
            let per_request = u64::from(per_request);
            let planned_items = u64::from(planned) * per_request;

            prop_assert!(planned <= cap);
            if planned < cap {
                prop_assert!(planned_items >= items);
            }
            if planned > 0 {
                prop_assert!(planned_items - per_request < items);
            } else {
                prop_assert!(items == 0 || cap == 0);
            }
            Ok(())
        })
        .unwrap();
}

fn loose_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,40}".prop_map(Value::from),
        prop::collection::vec(".{0,20}", 0..14).prop_map(|items| json!(items)),
    ]
}

fn loose_lesson() -> impl Strategy<Value = Value> {
    (
        loose_value(),
        loose_value(),
        loose_value(),
        loose_value(),
        loose_value(),
        loose_value(),
        loose_value(),
    )
        .prop_map(|(title, content, question, options, index, explanations, tags)| {
            json!({
                "title": title,
                "content": content,
                "quiz_question": question,
                "quiz_options": options,
                "correct_option_index": index,
                "option_explanations": explanations,
                "hashtags": tags
            })
        })
}

/// Any generated object becomes a lesson that can be rendered as a quiz
#[test]
fn test_normalized_lessons_are_always_complete() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&loose_lesson(), |raw| {
            let ctx = LessonContext {
                id: "prop".to_string(),
                pool: PoolType::OnDemand,
                theme: "Typography",
                batch_id: "batch_prop",
                created_at: Utc::now(),
            };
            let lesson = normalize_lesson(&raw, &ctx);

            prop_assert!(!lesson.title.is_empty());
            prop_assert!(!lesson.content.is_empty());
            prop_assert!(!lesson.quiz_question.is_empty());
            prop_assert!((4..=10).contains(&lesson.quiz_options.len()));
            prop_assert!(lesson.correct_option_index < lesson.quiz_options.len());
            prop_assert_eq!(lesson.option_explanations.len(), lesson.quiz_options.len());
            prop_assert!(!lesson.explanation.is_empty());
            prop_assert!(!lesson.hashtags.is_empty());
            prop_assert!(lesson.hashtags.iter().all(|tag| tag.starts_with('#')));
            prop_assert!(!lesson.used);
            Ok(())
        })
        .unwrap();
}

/// Well-formed JSON survives the repair stage unchanged
#[test]
fn test_valid_payloads_parse_unchanged() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&loose_lesson(), |raw| {
            let text = raw.to_string();
            prop_assert_eq!(parse_payload(&text).unwrap(), raw.clone());

            let pretty = serde_json::to_string_pretty(&raw).unwrap();
            let fenced = format!("```json\n{}\n```", pretty);
            prop_assert_eq!(parse_payload(&fenced).unwrap(), raw);
            Ok(())
        })
        .unwrap();
}

/// Every non-blank line is either stored or counted as a failure
#[test]
fn test_every_result_line_is_accounted_for() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let job = BatchJob::new("batch_prop".to_string(), PoolType::Scheduled, 5);

    runner
        .run(&prop::collection::vec(".{0,60}", 0..12), |lines| {
            let ndjson = lines
                .iter()
                .enumerate()
                .map(|(i, content)| {
                    json!({
                        "custom_id": format!("req-{}", i),
                        "response": {
                            "status_code": 200,
                            "body": {"choices": [{"message": {"content": content}}]}
                        }
                    })
                    .to_string()
                })
                .collect::<Vec<_>>()
                .join("\n");

            let parsed = parse_results(&ndjson, &job, &[], Utc::now());

            let lines_with_lessons = (0..lines.len())
                .filter(|i| parsed.lessons.iter().any(|l| l.id == format!("req-{}", i)))
                .count() as u64;
            prop_assert_eq!(lines_with_lessons + parsed.failure_count, lines.len() as u64);
            Ok(())
        })
        .unwrap();
}
