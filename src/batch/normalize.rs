//! Lesson normalization.
//!
//! Every field of a generated lesson is untrusted. Missing or mistyped fields
//! are replaced with safe, non-empty defaults so that a parsed payload always
//! yields a deliverable lesson. A lesson that needed defaults still counts as
//! a success.

use crate::types::{Lesson, PoolType};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const MIN_QUIZ_OPTIONS: usize = 4;
pub const MAX_QUIZ_OPTIONS: usize = 10;
pub const DEFAULT_THEME: &str = "UI/UX Design";

const FALLBACK_OPTIONS: [&str; 4] = [
    "Simplifying the designer's workflow",
    "Enhancing user experience and driving engagement metrics",
    "Reducing overall development resource requirements",
    "Improving technical performance metrics",
];

/// Where a lesson came from
#[derive(Debug, Clone)]
pub struct LessonContext<'a> {
    pub id: String,
    pub pool: PoolType,
    pub theme: &'a str,
    pub batch_id: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Split a parsed payload into per-lesson values.
///
/// Accepts a single lesson object, a wrapper object holding a `lessons` (or
/// `items`) array, or a bare array.
pub fn lesson_values(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(values) => values,
        Value::Object(mut map) => {
            for key in ["lessons", "items"] {
                if let Some(Value::Array(values)) = map.remove(key) {
                    return values;
                }
            }
            vec![Value::Object(map)]
        }
        _ => Vec::new(),
    }
}

/// Lowercase, dash-separated form of a theme for use in request ids
pub fn theme_slug(theme: &str) -> String {
    let mut slug = String::with_capacity(theme.len());
    for c in theme.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Recover the theme a request id was built for; longest slug wins
pub fn theme_from_custom_id<'a>(custom_id: &str, themes: &'a [String]) -> Option<&'a str> {
    themes
        .iter()
        .filter(|theme| {
            let slug = theme_slug(theme);
            !slug.is_empty() && custom_id.ends_with(&format!("-{}", slug))
        })
        .max_by_key(|theme| theme.len())
        .map(String::as_str)
}

fn text_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a field into a list of non-empty strings.
///
/// Strings that hold a JSON array are decoded; other strings are split on
/// `separator`.
fn list_field(raw: &Value, key: &str, separator: &str) -> Vec<String> {
    let items = match raw.get(key) {
        Some(Value::Array(values)) => string_items(values),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(values)) => string_items(&values),
            _ => s.split(separator).map(|part| part.trim().to_string()).collect(),
        },
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

fn string_items(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(obj) => obj
                .get("text")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .collect()
}

fn index_field(raw: &Value, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn fallback_content(theme: &str) -> Vec<String> {
    vec![
        format!("Today we're examining {theme} as a critical element in modern UI/UX design practice."),
        format!(
            "This fundamental concept enables designers to create more effective, intuitive interfaces \
             that meet both user and business objectives. When implementing {theme} in your projects, \
             consider contextual user needs, accessibility requirements, and overall product strategy."
        ),
        "Industry best practices include conducting thorough user testing, implementing evidence-based \
         iterations, and maintaining alignment with current design standards while balancing innovation \
         and familiarity."
            .to_string(),
    ]
}

fn normalize_options(raw: &Value) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    for option in list_field(raw, "quiz_options", "\n") {
        if !options.contains(&option) {
            options.push(option);
        }
    }
    options.truncate(MAX_QUIZ_OPTIONS);
    for filler in FALLBACK_OPTIONS {
        if options.len() >= MIN_QUIZ_OPTIONS {
            break;
        }
        if !options.iter().any(|o| o == filler) {
            options.push(filler.to_string());
        }
    }
    options
}

fn normalize_hashtags(raw: &Value, theme: &str) -> Vec<String> {
    let mut tags: Vec<String> = list_field(raw, "hashtags", " ")
        .into_iter()
        .flat_map(|tag| {
            tag.split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .map(|tag| tag.trim_start_matches('#').to_string())
        .filter(|tag| !tag.is_empty())
        .map(|tag| format!("#{}", tag))
        .collect();
    tags.dedup();
    if tags.is_empty() {
        let theme_tag: String = theme.chars().filter(|c| c.is_alphanumeric()).collect();
        tags.push("#UIUX".to_string());
        if !theme_tag.is_empty() {
            tags.push(format!("#{}", theme_tag));
        }
    }
    tags
}

/// Build a complete lesson from an untrusted JSON value
pub fn normalize_lesson(raw: &Value, ctx: &LessonContext<'_>) -> Lesson {
    let theme = text_field(raw, "theme").unwrap_or_else(|| ctx.theme.to_string());

    let title = text_field(raw, "title")
        .unwrap_or_else(|| format!("Professional Guide to {} in UI/UX Design", theme));

    let mut content = list_field(raw, "content", "\n\n");
    if content.is_empty() {
        content = fallback_content(&theme);
    }

    let quiz_question = text_field(raw, "quiz_question").unwrap_or_else(|| {
        format!(
            "What is the primary strategic benefit of proper {} implementation?",
            theme
        )
    });

    let quiz_options = normalize_options(raw);
    let last_index = quiz_options.len().saturating_sub(1) as i64;
    let correct_option_index = index_field(raw, "correct_option_index")
        .unwrap_or(0)
        .clamp(0, last_index) as usize;

    let explanation = text_field(raw, "explanation").unwrap_or_else(|| {
        format!(
            "The correct answer is \"{}\".",
            quiz_options[correct_option_index]
        )
    });

    let mut option_explanations = list_field(raw, "option_explanations", "\n");
    option_explanations.truncate(quiz_options.len());
    for index in option_explanations.len()..quiz_options.len() {
        option_explanations.push(if index == correct_option_index {
            format!("Correct. {}", explanation)
        } else {
            format!("This option is not the best answer for {}.", theme)
        });
    }

    let hashtags = normalize_hashtags(raw, &theme);

    Lesson {
        id: ctx.id.clone(),
        pool: ctx.pool,
        theme,
        title,
        content,
        quiz_question,
        quiz_options,
        correct_option_index,
        explanation,
        option_explanations,
        hashtags,
        batch_id: ctx.batch_id.to_string(),
        created_at: ctx.created_at,
        used: false,
        used_at: None,
    }
}
