//! `list_tiddlers`: list titles, optionally through a filter expression.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::config::DEFAULT_CONTENT_TYPE;
use crate::convert::field_to_json;
use crate::protocol::ToolResult;
use crate::tools::{schema_for, ToolDef};
use crate::wiki::{Tiddler, Wiki, SYSTEM_PREFIX};

/// Tool name.
pub const NAME: &str = "list_tiddlers";

/// Arguments of `list_tiddlers`.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTiddlersInput {
    /// TiddlyWiki filter expression, e.g. "[tag[Journal]]". Lists every
    /// tiddler when omitted.
    #[serde(default)]
    pub filter: Option<String>,
    /// Maximum number of tiddlers to return
    #[serde(default)]
    pub limit: Option<i64>,
    /// Include system tiddlers ("$:/...") when no filter is given
    #[serde(default)]
    pub include_system: bool,
    /// Return title, text, tags, type, created and modified for each tiddler
    /// instead of bare titles
    #[serde(default)]
    pub include_details: bool,
}

/// Tool definition.
pub fn definition() -> ToolDef {
    ToolDef {
        name: NAME,
        description: "List tiddlers in the wiki, sorted by title. Pass a TiddlyWiki filter \
                      expression to narrow the set (e.g. \"[tag[Journal]!is[system]]\"). System \
                      tiddlers are hidden unless includeSystem is set. Use includeDetails to get \
                      text, tags and dates along with each title.",
        input_schema: schema_for::<ListTiddlersInput>,
        output_schema: None,
        mutating: false,
    }
}

fn details(tiddler: &Tiddler) -> JsonValue {
    let date = |name: &str| tiddler.field(name).map(field_to_json).unwrap_or(JsonValue::Null);
    let content_type = match tiddler.field_string("type") {
        t if t.is_empty() => DEFAULT_CONTENT_TYPE.to_string(),
        t => t,
    };

    json!({
        "title": tiddler.title(),
        "text": tiddler.field_string("text"),
        "tags": tiddler.field_list("tags"),
        "type": content_type,
        "created": date("created"),
        "modified": date("modified"),
    })
}

/// Titles (or details) of the matching tiddlers, as a JSON text block.
pub async fn handle(input: ListTiddlersInput, wiki: &dyn Wiki) -> ToolResult {
    tracing::debug!(filter = ?input.filter, limit = ?input.limit, "list_tiddlers");

    let mut titles = match input.filter.as_deref().map(str::trim) {
        Some(expr) if !expr.is_empty() => match wiki.filter(expr) {
            Ok(titles) => titles,
            Err(e) => return ToolResult::error(format!("Error listing tiddlers: {}", e)),
        },
        _ => {
            let mut titles = wiki.list_titles();
            if !input.include_system {
                titles.retain(|t| !t.starts_with(SYSTEM_PREFIX));
            }
            titles
        }
    };

    // The limit takes the first titles in filter order; only those are sorted.
    if let Some(limit) = input.limit.filter(|l| *l > 0) {
        titles.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    titles.sort();

    let tiddlers: Vec<JsonValue> = if input.include_details {
        titles
            .iter()
            .filter_map(|title| wiki.get(title))
            .map(|t| details(&t))
            .collect()
    } else {
        titles.into_iter().map(JsonValue::String).collect()
    };

    ToolResult::json(&json!({
        "count": tiddlers.len(),
        "tiddlers": tiddlers,
    }))
}
