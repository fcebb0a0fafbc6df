//! Tool registry and dispatch.
//!
//! Exposes five tiddler tools to agents. The set is fixed when the registry
//! is built: read-only registries leave out the mutating tools entirely, so
//! calling one of them is indistinguishable from calling an unknown name.
//!
//! - `read_tiddler`: fields of one tiddler
//! - `list_tiddlers`: titles (or details), optionally through a filter
//! - `search_tiddlers`: substring search
//! - `delete_tiddler`: remove a tiddler (mutating)
//! - `write_tiddler`: create or update a tiddler (mutating)

pub mod delete;
pub mod list;
pub mod read;
pub mod search;
pub mod write;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::DEFAULT_CONTENT_TYPE;
use crate::engine::ToolHandlers;
use crate::error::{McpError, Result};
use crate::protocol::{ToolAnnotations, ToolDefinition, ToolResult};
use crate::wiki::Wiki;

/// Produces a tool's JSON Schema in the protocol's interchange format.
pub type SchemaFn = fn() -> Result<JsonValue>;

/// A tool definition: name, description and schemas.
///
/// Handlers are not stored here; dispatch goes through the closed
/// [`ToolInput`] variant so every handler receives already-validated,
/// typed input.
#[derive(Debug, Clone, Copy)]
pub struct ToolDef {
    /// Tool name (e.g., "read_tiddler")
    pub name: &'static str,
    /// Tool description
    pub description: &'static str,
    /// JSON Schema for the input parameters
    pub input_schema: SchemaFn,
    /// JSON Schema for `structuredContent`, if the tool returns it
    pub output_schema: Option<SchemaFn>,
    /// Mutating tools are excluded in read-only mode
    pub mutating: bool,
}

impl ToolDef {
    /// Build the `tools/list` entry for this tool.
    ///
    /// A schema that cannot be translated is logged and replaced with an
    /// empty object schema so the other tools still get listed.
    pub fn to_definition(&self) -> ToolDefinition {
        let input_schema = (self.input_schema)().unwrap_or_else(|e| {
            tracing::error!(tool = self.name, error = %e, "Error converting input schema");
            fallback_schema()
        });

        let output_schema = self.output_schema.and_then(|schema| match schema() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(tool = self.name, error = %e, "Error converting output schema");
                None
            }
        });

        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema,
            output_schema,
            annotations: Some(ToolAnnotations {
                read_only_hint: !self.mutating,
                destructive_hint: self.mutating,
            }),
        }
    }
}

/// Schema used when a tool's real schema cannot be produced.
pub fn fallback_schema() -> JsonValue {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Translate a Rust input/output type into a JSON Schema object.
pub fn schema_for<T: JsonSchema>() -> Result<JsonValue> {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&schema)?;

    let obj = value.as_object_mut().ok_or_else(|| {
        McpError::Internal(format!("schema for {} is not an object", T::schema_name()))
    })?;
    obj.remove("$schema");
    obj.remove("title");

    if obj.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err(McpError::Internal(format!(
            "schema for {} does not describe an object",
            T::schema_name()
        )));
    }
    Ok(value)
}

/// Wrap a serializable tool output as a structured result.
pub(crate) fn structured_output<T: Serialize>(output: &T) -> ToolResult {
    match serde_json::to_value(output) {
        Ok(value) => ToolResult::structured(value),
        Err(e) => ToolResult::error(format!("Error serializing tool output: {}", e)),
    }
}

/// Validated input for one tool call.
#[derive(Debug, Clone)]
pub enum ToolInput {
    /// `read_tiddler`
    ReadTiddler(read::ReadTiddlerInput),
    /// `list_tiddlers`
    ListTiddlers(list::ListTiddlersInput),
    /// `search_tiddlers`
    SearchTiddlers(search::SearchTiddlersInput),
    /// `delete_tiddler`
    DeleteTiddler(delete::DeleteTiddlerInput),
    /// `write_tiddler`
    WriteTiddler(write::WriteTiddlerInput),
}

impl ToolInput {
    /// Validate raw arguments against the named tool's input type.
    ///
    /// A missing or `null` arguments value is treated as an empty object.
    pub fn parse(name: &str, arguments: JsonValue) -> Result<Self> {
        fn typed<T: DeserializeOwned>(tool: &str, arguments: JsonValue) -> Result<T> {
            let arguments = match arguments {
                JsonValue::Null => JsonValue::Object(Default::default()),
                other => other,
            };
            serde_json::from_value(arguments).map_err(|e| McpError::InvalidArg {
                tool: tool.to_string(),
                reason: e.to_string(),
            })
        }

        match name {
            read::NAME => Ok(ToolInput::ReadTiddler(typed(name, arguments)?)),
            list::NAME => Ok(ToolInput::ListTiddlers(typed(name, arguments)?)),
            search::NAME => Ok(ToolInput::SearchTiddlers(typed(name, arguments)?)),
            delete::NAME => Ok(ToolInput::DeleteTiddler(typed(name, arguments)?)),
            write::NAME => Ok(ToolInput::WriteTiddler(typed(name, arguments)?)),
            _ => Err(McpError::UnknownTool(name.to_string())),
        }
    }
}

/// All tool definitions, read-only tools first.
pub fn all_tools() -> Vec<ToolDef> {
    vec![
        read::definition(),
        list::definition(),
        search::definition(),
        delete::definition(),
        write::definition(),
    ]
}

/// Registry of the tools active for one gateway.
pub struct ToolRegistry {
    wiki: Arc<dyn Wiki>,
    tools: Vec<ToolDef>,
    default_content_type: String,
}

impl ToolRegistry {
    /// Create the registry; `read_only` drops the mutating tools.
    pub fn new(wiki: Arc<dyn Wiki>, read_only: bool) -> Self {
        let tools = all_tools()
            .into_iter()
            .filter(|tool| !(read_only && tool.mutating))
            .collect();
        Self::from_tools(wiki, tools)
    }

    /// Create a registry from an explicit tool list.
    ///
    /// Duplicate names keep the first definition.
    pub fn from_tools(wiki: Arc<dyn Wiki>, tools: Vec<ToolDef>) -> Self {
        let mut seen = HashSet::new();
        let tools = tools
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name);
                if !fresh {
                    tracing::warn!(tool = tool.name, "Ignoring duplicate tool definition");
                }
                fresh
            })
            .collect();

        Self {
            wiki,
            tools,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Content type used by `write_tiddler` when neither the call nor the
    /// default-content-type config tiddler names one.
    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Active tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Active tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// `tools/list` payload.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        tracing::debug!(count = self.tools.len(), "tools/list");
        self.tools.iter().map(ToolDef::to_definition).collect()
    }

    /// Validate arguments and run the named tool.
    ///
    /// Only an unknown name is an error; validation failures come back as a
    /// result with `isError` set.
    pub async fn call_tool(&self, name: &str, arguments: JsonValue) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        let input = match ToolInput::parse(tool.name, arguments) {
            Ok(input) => input,
            Err(McpError::UnknownTool(name)) => return Err(McpError::UnknownTool(name)),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool arguments failed validation");
                return Ok(ToolResult::error(format!(
                    "Error executing tool {}: {}",
                    name, e
                )));
            }
        };

        Ok(self.dispatch(input).await)
    }

    async fn dispatch(&self, input: ToolInput) -> ToolResult {
        let wiki = self.wiki.as_ref();
        match input {
            ToolInput::ReadTiddler(input) => read::handle(input, wiki).await,
            ToolInput::ListTiddlers(input) => list::handle(input, wiki).await,
            ToolInput::SearchTiddlers(input) => search::handle(input, wiki).await,
            ToolInput::DeleteTiddler(input) => delete::handle(input, wiki).await,
            ToolInput::WriteTiddler(input) => {
                write::handle(input, wiki, &self.default_content_type).await
            }
        }
    }
}

#[async_trait]
impl ToolHandlers for ToolRegistry {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        ToolRegistry::list_tools(self)
    }

    async fn call_tool(&self, name: &str, arguments: JsonValue) -> Result<ToolResult> {
        ToolRegistry::call_tool(self, name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{MemoryWiki, Tiddler};
    use serde_json::json;

    fn wiki() -> Arc<dyn Wiki> {
        Arc::new(MemoryWiki::with_tiddlers([
            Tiddler::new("Existing").with_field("text", "hello")
        ]))
    }

    fn names(registry: &ToolRegistry) -> Vec<String> {
        registry.list_tools().into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_full_registry_lists_all_tools_in_order() {
        let registry = ToolRegistry::new(wiki(), false);
        assert_eq!(
            names(&registry),
            vec![
                "read_tiddler",
                "list_tiddlers",
                "search_tiddlers",
                "delete_tiddler",
                "write_tiddler"
            ]
        );
    }

    #[test]
    fn test_read_only_registry_excludes_mutating_tools() {
        let registry = ToolRegistry::new(wiki(), true);
        let listed = names(&registry);
        assert_eq!(listed, vec!["read_tiddler", "list_tiddlers", "search_tiddlers"]);
        assert!(registry.get("write_tiddler").is_none());
        assert!(registry.get("delete_tiddler").is_none());
    }

    #[tokio::test]
    async fn test_excluded_tool_error_matches_unknown_tool() {
        let registry = ToolRegistry::new(wiki(), true);

        let excluded = registry
            .call_tool("delete_tiddler", json!({"title": "Existing"}))
            .await
            .unwrap_err();
        let unknown = registry
            .call_tool("delete_everything", json!({"title": "Existing"}))
            .await
            .unwrap_err();

        assert!(matches!(excluded, McpError::UnknownTool(_)));
        assert!(matches!(unknown, McpError::UnknownTool(_)));
        assert_eq!(
            excluded.to_string().replace("delete_tiddler", "NAME"),
            unknown.to_string().replace("delete_everything", "NAME")
        );
        // The store was not touched
        assert!(registry.wiki.get("Existing").is_some());
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_error_result() {
        let registry = ToolRegistry::new(wiki(), false);

        let missing = registry.call_tool("read_tiddler", json!({})).await.unwrap();
        assert!(missing.is_error());
        assert!(missing.first_text().contains("Error executing tool read_tiddler"));
        assert!(missing.first_text().contains("title"));

        let wrong_type = registry
            .call_tool("write_tiddler", json!({"title": "X", "text": 42}))
            .await
            .unwrap();
        assert!(wrong_type.is_error());
        assert!(registry.wiki.get("X").is_none());
    }

    #[tokio::test]
    async fn test_null_arguments_treated_as_empty_object() {
        let registry = ToolRegistry::new(wiki(), true);
        let result = registry
            .call_tool("list_tiddlers", JsonValue::Null)
            .await
            .unwrap();
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_handler_error_flag_passes_through() {
        let registry = ToolRegistry::new(wiki(), true);
        let result = registry
            .call_tool("read_tiddler", json!({"title": "Missing"}))
            .await
            .unwrap();
        assert!(result.is_error());
        assert_eq!(result.first_text(), "Tiddler \"Missing\" not found");
    }

    #[test]
    fn test_broken_schema_falls_back_without_hiding_other_tools() {
        fn broken() -> Result<JsonValue> {
            Err(McpError::Internal("unsupported schema construct".to_string()))
        }

        let mut broken_read = read::definition();
        broken_read.input_schema = broken;
        broken_read.output_schema = Some(broken);

        let registry = ToolRegistry::from_tools(wiki(), vec![broken_read, list::definition()]);
        let listed = registry.list_tools();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].input_schema, fallback_schema());
        assert!(listed[0].output_schema.is_none());
        assert_eq!(listed[1].name, "list_tiddlers");
        assert_eq!(listed[1].input_schema["type"], "object");
    }

    #[test]
    fn test_duplicate_tool_names_keep_first() {
        let registry = ToolRegistry::from_tools(
            wiki(),
            vec![read::definition(), read::definition(), list::definition()],
        );
        assert_eq!(registry.tools().len(), 2);
    }

    #[test]
    fn test_input_schemas_describe_arguments() {
        let registry = ToolRegistry::new(wiki(), false);
        let listed = registry.list_tools();

        let write = listed.iter().find(|t| t.name == "write_tiddler").unwrap();
        let props = write.input_schema["properties"].as_object().unwrap();
        for key in ["title", "text", "tags", "type", "username"] {
            assert!(props.contains_key(key), "missing property {key}");
        }
        let required: Vec<&str> = write.input_schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"title"));
        assert!(required.contains(&"text"));
        assert!(!required.contains(&"username"));

        let list = listed.iter().find(|t| t.name == "list_tiddlers").unwrap();
        assert!(list.input_schema["properties"]["includeSystem"].is_object());
        assert!(list.output_schema.is_none());
        assert!(write.output_schema.is_some());
    }
}
