//! `write_tiddler`: create or replace a tiddler.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CONTENT_TYPE_TITLE;
use crate::protocol::ToolResult;
use crate::tools::{schema_for, structured_output, ToolDef};
use crate::wiki::{FieldValue, Tiddler, Wiki};

/// Tool name.
pub const NAME: &str = "write_tiddler";

/// Recorded as creator/modifier when the caller does not give a name.
pub const DEFAULT_USERNAME: &str = "tiddly-mcp";

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

/// Arguments of `write_tiddler`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteTiddlerInput {
    /// Title of the tiddler to create or update
    pub title: String,
    /// Full text of the tiddler
    pub text: String,
    /// Tags to set; existing tags are dropped when omitted
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Content type, e.g. "text/vnd.tiddlywiki" or "text/markdown"
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    /// Name recorded as the creator/modifier
    #[serde(default = "default_username")]
    pub username: String,
}

/// What `write_tiddler` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    /// No tiddler had the title before
    Created,
    /// An existing tiddler was replaced
    Updated,
}

/// Result of `write_tiddler`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WriteOutput {
    /// Always true; failures are reported as error results
    pub success: bool,
    /// Whether the tiddler was new
    pub operation: WriteOperation,
    /// Title that was written
    pub title: String,
    /// Human-readable summary
    pub message: String,
}

/// Tool definition.
pub fn definition() -> ToolDef {
    ToolDef {
        name: NAME,
        description: "Create a tiddler, or replace an existing one with the same title. The \
                      text, tags and type given replace the previous ones; the original creator \
                      and creation date are kept.",
        input_schema: schema_for::<WriteTiddlerInput>,
        output_schema: Some(schema_for::<WriteOutput>),
        mutating: true,
    }
}

/// Create or replace the tiddler, keeping the original creator fields.
pub async fn handle(input: WriteTiddlerInput, wiki: &dyn Wiki, default_type: &str) -> ToolResult {
    tracing::info!(title = %input.title, username = %input.username, "write_tiddler");

    let existing = wiki.get(&input.title);
    let now = FieldValue::Date(Utc::now());

    let content_type = match input.content_type.filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => wiki.get_text(DEFAULT_CONTENT_TYPE_TITLE, default_type),
    };

    let mut tiddler = Tiddler::new(input.title.as_str())
        .with_field("text", input.text)
        .with_field("type", content_type)
        .with_field("modifier", input.username.as_str())
        .with_field("modified", now.clone());

    if let Some(tags) = input.tags.filter(|tags| !tags.is_empty()) {
        tiddler.set_field("tags", FieldValue::List(tags));
    }

    let operation = match &existing {
        Some(previous) => {
            for name in ["creator", "created"] {
                if let Some(value) = previous.field(name) {
                    tiddler.set_field(name, value.clone());
                }
            }
            WriteOperation::Updated
        }
        None => {
            tiddler.set_field("creator", input.username.as_str());
            tiddler.set_field("created", now);
            WriteOperation::Created
        }
    };

    if let Err(e) = wiki.put(tiddler) {
        tracing::error!(title = %input.title, error = %e, "Failed to write tiddler");
        return ToolResult::error(format!("Error writing tiddler \"{}\": {}", input.title, e));
    }

    let verb = match operation {
        WriteOperation::Created => "created",
        WriteOperation::Updated => "updated",
    };
    structured_output(&WriteOutput {
        success: true,
        operation,
        message: format!("Tiddler \"{}\" {} successfully", input.title, verb),
        title: input.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTENT_TYPE;
    use crate::wiki::MemoryWiki;

    fn input(title: &str, text: &str) -> WriteTiddlerInput {
        serde_json::from_value(serde_json::json!({"title": title, "text": text})).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let wiki = MemoryWiki::new();

        let created = handle(input("Note", "v1"), &wiki, DEFAULT_CONTENT_TYPE).await;
        let out = created.structured_content.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["operation"], "created");
        assert_eq!(out["title"], "Note");

        let first = wiki.get("Note").unwrap();
        assert_eq!(first.field_string("creator"), DEFAULT_USERNAME);
        assert_eq!(first.field_string("type"), DEFAULT_CONTENT_TYPE);
        assert!(first.field("tags").is_none());

        let mut update = input("Note", "v2");
        update.username = "alice".to_string();
        update.tags = Some(vec!["Work".to_string()]);
        let updated = handle(update, &wiki, DEFAULT_CONTENT_TYPE).await;
        assert_eq!(updated.structured_content.unwrap()["operation"], "updated");

        let second = wiki.get("Note").unwrap();
        assert_eq!(second.field_string("text"), "v2");
        assert_eq!(second.field_string("creator"), DEFAULT_USERNAME);
        assert_eq!(second.field("created"), first.field("created"));
        assert_eq!(second.field_string("modifier"), "alice");
        assert_eq!(second.field_list("tags"), vec!["Work"]);
    }

    #[tokio::test]
    async fn test_type_from_config_tiddler() {
        let wiki = MemoryWiki::with_tiddlers([
            Tiddler::new(DEFAULT_CONTENT_TYPE_TITLE).with_field("text", "text/markdown")
        ]);

        handle(input("Md", "# hi"), &wiki, DEFAULT_CONTENT_TYPE).await;
        assert_eq!(wiki.get("Md").unwrap().field_string("type"), "text/markdown");

        let mut explicit = input("Plain", "hi");
        explicit.content_type = Some("text/plain".to_string());
        handle(explicit, &wiki, DEFAULT_CONTENT_TYPE).await;
        assert_eq!(wiki.get("Plain").unwrap().field_string("type"), "text/plain");
    }

    #[tokio::test]
    async fn test_configured_default_type_used_without_config_tiddler() {
        let wiki = MemoryWiki::new();
        handle(input("X", "x"), &wiki, "text/x-custom").await;
        assert_eq!(wiki.get("X").unwrap().field_string("type"), "text/x-custom");
    }

    #[tokio::test]
    async fn test_store_failure_is_error_result() {
        let wiki = MemoryWiki::new();
        let result = handle(input("", "no title"), &wiki, DEFAULT_CONTENT_TYPE).await;
        assert!(result.is_error());
        assert!(wiki.is_empty());
    }
}
