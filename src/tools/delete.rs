//! `delete_tiddler`: remove a tiddler.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::protocol::ToolResult;
use crate::tools::{schema_for, structured_output, ToolDef};
use crate::wiki::Wiki;

/// Tool name.
pub const NAME: &str = "delete_tiddler";

/// Arguments of `delete_tiddler`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteTiddlerInput {
    /// Title of the tiddler to delete
    pub title: String,
}

/// Result of `delete_tiddler`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DeleteOutput {
    /// Always true; failures are reported as error results
    pub success: bool,
    /// Always "deleted"
    pub operation: String,
    /// Title that was deleted
    pub title: String,
    /// Human-readable summary
    pub message: String,
}

/// Tool definition.
pub fn definition() -> ToolDef {
    ToolDef {
        name: NAME,
        description: "Delete a tiddler by title. Fails if the tiddler does not exist.",
        input_schema: schema_for::<DeleteTiddlerInput>,
        output_schema: Some(schema_for::<DeleteOutput>),
        mutating: true,
    }
}

/// Delete the tiddler, or report that it does not exist.
pub async fn handle(input: DeleteTiddlerInput, wiki: &dyn Wiki) -> ToolResult {
    tracing::info!(title = %input.title, "delete_tiddler");

    if wiki.get(&input.title).is_none() {
        return ToolResult::error(format!("Tiddler \"{}\" not found", input.title));
    }

    if let Err(e) = wiki.delete(&input.title) {
        tracing::error!(title = %input.title, error = %e, "Failed to delete tiddler");
        return ToolResult::error(format!("Error deleting tiddler \"{}\": {}", input.title, e));
    }

    structured_output(&DeleteOutput {
        success: true,
        operation: "deleted".to_string(),
        message: format!("Tiddler \"{}\" deleted successfully", input.title),
        title: input.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{MemoryWiki, Tiddler};

    #[tokio::test]
    async fn test_delete_existing() {
        let wiki = MemoryWiki::with_tiddlers([Tiddler::new("Old")]);
        let result = handle(
            DeleteTiddlerInput {
                title: "Old".to_string(),
            },
            &wiki,
        )
        .await;

        let out = result.structured_content.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["operation"], "deleted");
        assert!(wiki.get("Old").is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_error_result() {
        let wiki = MemoryWiki::new();
        let result = handle(
            DeleteTiddlerInput {
                title: "Ghost".to_string(),
            },
            &wiki,
        )
        .await;
        assert!(result.is_error());
        assert_eq!(result.first_text(), "Tiddler \"Ghost\" not found");
    }
}
