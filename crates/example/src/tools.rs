//! Tool definitions.

use meridian_tools::error::ToolError;
use meridian_tools::render::RenderConfig;
use meridian_tools::tool::{FnTool, ToolCallContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// App id owning the note tools.
pub const NOTES_APP: &str = "notes";

/// Parameters for the `word_count` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WordCountParams {
    /// Text to count.
    pub text: String,
}

/// Result of the `word_count` tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WordCount {
    /// Number of whitespace-separated words.
    pub words: usize,
    /// Number of characters.
    pub chars: usize,
}

/// Parameters for the `create_note` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateNoteParams {
    /// Note title.
    pub title: String,
    /// Note body.
    #[serde(default)]
    pub body: String,
}

/// Result of the `create_note` tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Note {
    /// Id derived from the call.
    pub id: String,
    /// Note title.
    pub title: String,
    /// Note body.
    pub body: String,
}

fn word_count() -> FnTool {
    FnTool::typed(
        "word_count",
        "Counts words and characters in a text.",
        |params: WordCountParams, _ctx| async move {
            Ok(WordCount {
                words: params.text.split_whitespace().count(),
                chars: params.text.chars().count(),
            })
        },
    )
}

fn create_note() -> FnTool {
    FnTool::typed(
        "create_note",
        "Creates a note in the notes app.",
        |params: CreateNoteParams, ctx: ToolCallContext| async move {
            if params.title.trim().is_empty() {
                return Err(ToolError::parameter_error("title must not be blank"));
            }
            Ok(Note {
                id: format!("note-{}", ctx.call_id),
                title: params.title,
                body: params.body,
            })
        },
    )
    .with_definition(|definition| {
        definition
            .owned_by(NOTES_APP)
            .with_render(RenderConfig::html("<h1>{{title}}</h1><p>{{body}}</p>"))
    })
}

/// Returns every tool the demo server registers.
#[must_use]
pub fn all() -> Vec<FnTool> {
    vec![word_count(), create_note()]
}
