//! Prompt construction seam.
//!
//! Prompt wording lives outside the engine; the default builder only asks for
//! the JSON shape the result processor knows how to read.

use super::ChatMessage;
use crate::types::PoolType;

/// Builds the chat messages for one generation request
pub trait PromptBuilder: Send + Sync {
    fn build(&self, pool: PoolType, theme: &str, lessons_per_request: u32) -> Vec<ChatMessage>;
}

/// Minimal prompt that requests a `{"lessons": [...]}` wrapper
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, pool: PoolType, theme: &str, lessons_per_request: u32) -> Vec<ChatMessage> {
        let tone = match pool {
            PoolType::Scheduled => "suited to a daily broadcast",
            PoolType::OnDemand => "self-contained for a learner who asked for it",
        };
        vec![
            ChatMessage::system("You are a UI/UX design instructor creating educational content."),
            ChatMessage::user(format!(
                "Create {count} concise UI/UX design lessons about {theme}, {tone}. \
                 Respond with a JSON object {{\"lessons\": [...]}} where each lesson has: \
                 title, content (array of 3-4 short paragraphs), quiz_question, \
                 quiz_options (array of 4), correct_option_index (0-based), explanation, \
                 option_explanations (one per option) and hashtags (array).",
                count = lessons_per_request,
                theme = theme,
                tone = tone,
            )),
        ]
    }
}
