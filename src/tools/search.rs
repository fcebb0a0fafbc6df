//! `search_tiddlers`: substring search across tiddler fields.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::protocol::ToolResult;
use crate::tools::{schema_for, structured_output, ToolDef};
use crate::wiki::{SearchOptions, Wiki};

/// Tool name.
pub const NAME: &str = "search_tiddlers";

/// Arguments of `search_tiddlers`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchTiddlersInput {
    /// Text to search for
    pub query: String,
    /// Only search this field (e.g. "text", "title", "tags")
    #[serde(default)]
    pub field: Option<String>,
    /// Match case exactly
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Result of `search_tiddlers`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchOutput {
    /// The query searched for
    pub query: String,
    /// Number of matches
    pub count: usize,
    /// Titles of matching tiddlers
    pub results: Vec<String>,
}

/// Tool definition.
pub fn definition() -> ToolDef {
    ToolDef {
        name: NAME,
        description: "Search tiddlers for text. Matches anywhere in any field unless a field is \
                      given. Case-insensitive by default. Returns the matching titles.",
        input_schema: schema_for::<SearchTiddlersInput>,
        output_schema: Some(schema_for::<SearchOutput>),
        mutating: false,
    }
}

/// Titles of tiddlers containing the query.
pub async fn handle(input: SearchTiddlersInput, wiki: &dyn Wiki) -> ToolResult {
    tracing::debug!(query = %input.query, field = ?input.field, "search_tiddlers");

    let options = SearchOptions {
        field: input.field,
        case_sensitive: input.case_sensitive,
    };
    let results = wiki.search(&input.query, &options);

    structured_output(&SearchOutput {
        query: input.query,
        count: results.len(),
        results,
    })
}
