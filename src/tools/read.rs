//! `read_tiddler`: return every field of one tiddler.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::protocol::ToolResult;
use crate::tools::{schema_for, ToolDef};
use crate::wiki::Wiki;

/// Tool name.
pub const NAME: &str = "read_tiddler";

/// Arguments of `read_tiddler`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadTiddlerInput {
    /// Title of the tiddler to read
    pub title: String,
}

fn output_schema() -> Result<JsonValue> {
    Ok(json!({
        "type": "object",
        "description": "All fields of the tiddler. Tags are arrays, dates are ISO 8601 strings.",
        "properties": {
            "title": { "type": "string" },
            "text": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "type": { "type": "string" },
            "created": { "type": "string" },
            "modified": { "type": "string" }
        },
        "required": ["title"],
        "additionalProperties": true
    }))
}

/// Tool definition.
pub fn definition() -> ToolDef {
    ToolDef {
        name: NAME,
        description: "Read a tiddler by title. Returns all of its fields (title, text, tags, \
                      type, created, modified and any custom fields) as JSON.",
        input_schema: schema_for::<ReadTiddlerInput>,
        output_schema: Some(output_schema),
        mutating: false,
    }
}

/// Every field of the tiddler as structured content.
pub async fn handle(input: ReadTiddlerInput, wiki: &dyn Wiki) -> ToolResult {
    tracing::debug!(title = %input.title, "read_tiddler");

    match wiki.get(&input.title) {
        Some(tiddler) => ToolResult::structured(tiddler.to_json()),
        None => ToolResult::error(format!("Tiddler \"{}\" not found", input.title)),
    }
}
