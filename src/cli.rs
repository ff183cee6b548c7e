//! CLI domain: parse, route, output and presentation only.
//! No batch logic here; the route table dispatches to `LessonEngine`.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_lesson_json, format_refill_outcomes, format_section_heading, format_status_json,
    format_status_text,
};
pub use route::RunContext;
