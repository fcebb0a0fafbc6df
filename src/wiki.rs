//! Tiddler store.
//!
//! The gateway only talks to the store through the [`Wiki`] trait. The
//! crate ships [`MemoryWiki`], an in-memory store that can be backed by a
//! TiddlyWiki JSON export file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::convert::{
    parse_string_array, stringify_list, stringify_tw_date, tiddler_from_export_json,
    tiddler_to_export_json, tiddler_to_json,
};
use crate::error::{McpError, Result};
use crate::filter;

/// Titles starting with this prefix are system tiddlers.
pub const SYSTEM_PREFIX: &str = "$:/";

/// A single tiddler field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain string
    Text(String),
    /// Title list such as `tags`
    List(Vec<String>),
    /// Timestamp such as `created`
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// String form of the value, as TiddlyWiki would store it.
    pub fn to_field_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => stringify_list(items),
            FieldValue::Date(date) => stringify_tw_date(date),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// A uniquely-titled record with a field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiddler {
    fields: BTreeMap<String, FieldValue>,
}

impl Tiddler {
    /// Create a tiddler with only a title field.
    pub fn new(title: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), FieldValue::Text(title.into()));
        Self { fields }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Set a field. Setting `title` renames the tiddler.
    /// Set or replace a field.
    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// The `title` field.
    pub fn title(&self) -> &str {
        match self.fields.get("title") {
            Some(FieldValue::Text(title)) => title,
            _ => "",
        }
    }

    /// Raw field value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field as a string, empty when absent.
    pub fn field_string(&self, name: &str) -> String {
        self.fields
            .get(name)
            .map(FieldValue::to_field_string)
            .unwrap_or_default()
    }

    /// Field as a title list; text fields are parsed as title lists.
    pub fn field_list(&self, name: &str) -> Vec<String> {
        match self.fields.get(name) {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Text(s)) => parse_string_array(s),
            _ => Vec::new(),
        }
    }

    /// Iterate over `(name, value)` pairs in field-name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the title starts with [`SYSTEM_PREFIX`].
    pub fn is_system(&self) -> bool {
        self.title().starts_with(SYSTEM_PREFIX)
    }

    /// Tool-facing JSON form (lists as arrays, dates as RFC 3339).
    pub fn to_json(&self) -> JsonValue {
        tiddler_to_json(self)
    }
}

/// Options for [`Wiki::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict matching to one field; all fields when `None`.
    pub field: Option<String>,
    /// Match case exactly
    pub case_sensitive: bool,
}

/// The record store the tools operate on.
pub trait Wiki: Send + Sync {
    /// Tiddler by exact title.
    fn get(&self, title: &str) -> Option<Tiddler>;

    /// Create or replace the tiddler with the same title.
    fn put(&self, tiddler: Tiddler) -> Result<()>;

    /// Remove a tiddler. Removing a missing title is not an error.
    fn delete(&self, title: &str) -> Result<()>;

    /// All titles, in title order.
    fn list_titles(&self) -> Vec<String>;

    /// Evaluate a filter expression and return the matching titles.
    fn filter(&self, expr: &str) -> Result<Vec<String>>;

    /// Titles of tiddlers containing `query`.
    fn search(&self, query: &str, options: &SearchOptions) -> Vec<String>;

    /// Text field of a tiddler, or `default` when the tiddler is missing or
    /// has no text.
    fn get_text(&self, title: &str, default: &str) -> String {
        match self.get(title).and_then(|t| t.field("text").cloned()) {
            Some(FieldValue::Text(text)) => text,
            _ => default.to_string(),
        }
    }
}

/// Substring match used by [`Wiki::search`] and the `search` filter operator.
pub(crate) fn matches_search(tiddler: &Tiddler, query: &str, options: &SearchOptions) -> bool {
    let haystack = match &options.field {
        Some(field) => tiddler.field_string(field),
        None => tiddler
            .fields()
            .map(|(_, value)| value.to_field_string())
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if options.case_sensitive {
        haystack.contains(query)
    } else {
        haystack.to_lowercase().contains(&query.to_lowercase())
    }
}

/// In-memory tiddler store, optionally persisted to a JSON export file.
#[derive(Debug, Default)]
pub struct MemoryWiki {
    tiddlers: RwLock<BTreeMap<String, Tiddler>>,
    backing: Option<PathBuf>,
}

impl MemoryWiki {
    /// Create an empty, unpersisted store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unpersisted store seeded with tiddlers.
    pub fn with_tiddlers(tiddlers: impl IntoIterator<Item = Tiddler>) -> Self {
        let map = tiddlers
            .into_iter()
            .map(|t| (t.title().to_string(), t))
            .collect();
        Self {
            tiddlers: RwLock::new(map),
            backing: None,
        }
    }

    /// Open a store backed by a JSON export file.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let entries: Vec<JsonValue> = serde_json::from_str(&raw)?;
            entries
                .iter()
                .map(tiddler_from_export_json)
                .map(|t| t.map(|t| (t.title().to_string(), t)))
                .collect::<Result<BTreeMap<_, _>>>()?
        } else {
            BTreeMap::new()
        };

        tracing::info!(path = %path.display(), tiddlers = map.len(), "Loaded wiki");
        Ok(Self {
            tiddlers: RwLock::new(map),
            backing: Some(path),
        })
    }

    /// Number of tiddlers in the store.
    /// Number of tiddlers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no tiddlers.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Tiddler>> {
        self.tiddlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Tiddler>> {
        self.tiddlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrite the backing file (write to a sibling temp file, then rename).
    fn persist(&self, tiddlers: &BTreeMap<String, Tiddler>) -> Result<()> {
        let Some(path) = &self.backing else {
            return Ok(());
        };

        let entries: Vec<JsonValue> = tiddlers.values().map(tiddler_to_export_json).collect();
        let body = serde_json::to_string_pretty(&entries)?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| McpError::Store(format!("failed to save {}: {}", path.display(), e)))
    }
}

impl Wiki for MemoryWiki {
    fn get(&self, title: &str) -> Option<Tiddler> {
        self.read().get(title).cloned()
    }

    fn put(&self, tiddler: Tiddler) -> Result<()> {
        if tiddler.title().is_empty() {
            return Err(McpError::Store("tiddler title must not be empty".to_string()));
        }
        let mut tiddlers = self.write();
        tiddlers.insert(tiddler.title().to_string(), tiddler);
        self.persist(&tiddlers)
    }

    fn delete(&self, title: &str) -> Result<()> {
        let mut tiddlers = self.write();
        if tiddlers.remove(title).is_some() {
            self.persist(&tiddlers)?;
        }
        Ok(())
    }

    fn list_titles(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn filter(&self, expr: &str) -> Result<Vec<String>> {
        filter::evaluate(expr, &self.read())
    }

    fn search(&self, query: &str, options: &SearchOptions) -> Vec<String> {
        self.read()
            .values()
            .filter(|t| matches_search(t, query, options))
            .map(|t| t.title().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryWiki {
        MemoryWiki::with_tiddlers([
            Tiddler::new("Alpha")
                .with_field("text", "The quick brown fox")
                .with_field("tags", FieldValue::List(vec!["Animals".to_string()])),
            Tiddler::new("Beta").with_field("text", "Lazy DOG"),
            Tiddler::new("$:/config/x").with_field("text", "yes"),
        ])
    }

    #[test]
    fn test_put_get_delete() {
        let wiki = MemoryWiki::new();
        wiki.put(Tiddler::new("A").with_field("text", "one")).unwrap();
        assert_eq!(wiki.get_text("A", "none"), "one");

        wiki.put(Tiddler::new("A").with_field("text", "two")).unwrap();
        assert_eq!(wiki.len(), 1);
        assert_eq!(wiki.get_text("A", "none"), "two");

        wiki.delete("A").unwrap();
        assert!(wiki.get("A").is_none());
        assert_eq!(wiki.get_text("A", "none"), "none");

        // Deleting a missing tiddler is not an error
        wiki.delete("A").unwrap();
    }

    #[test]
    fn test_put_rejects_empty_title() {
        let wiki = MemoryWiki::new();
        assert!(matches!(wiki.put(Tiddler::new("")), Err(McpError::Store(_))));
    }

    #[test]
    fn test_list_titles_sorted() {
        assert_eq!(sample().list_titles(), vec!["$:/config/x", "Alpha", "Beta"]);
    }

    #[test]
    fn test_search_case_sensitivity() {
        let wiki = sample();
        let insensitive = SearchOptions::default();
        assert_eq!(wiki.search("dog", &insensitive), vec!["Beta"]);

        let sensitive = SearchOptions {
            field: None,
            case_sensitive: true,
        };
        assert!(wiki.search("dog", &sensitive).is_empty());
        assert_eq!(wiki.search("DOG", &sensitive), vec!["Beta"]);
    }

    #[test]
    fn test_search_single_field() {
        let wiki = sample();
        let by_tags = SearchOptions {
            field: Some("tags".to_string()),
            case_sensitive: false,
        };
        assert_eq!(wiki.search("animals", &by_tags), vec!["Alpha"]);
        // "fox" is in text, not in tags
        assert!(wiki.search("fox", &by_tags).is_empty());
    }

    #[test]
    fn test_backing_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiki.json");

        let wiki = MemoryWiki::open(&path).unwrap();
        assert!(wiki.is_empty());
        wiki.put(
            Tiddler::new("Saved")
                .with_field("text", "persisted")
                .with_field("tags", FieldValue::List(vec!["two words".to_string()])),
        )
        .unwrap();
        assert!(path.exists());

        let reopened = MemoryWiki::open(&path).unwrap();
        let tiddler = reopened.get("Saved").unwrap();
        assert_eq!(tiddler.field_string("text"), "persisted");
        assert_eq!(tiddler.field_list("tags"), vec!["two words"]);

        reopened.delete("Saved").unwrap();
        assert!(MemoryWiki::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiki.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            MemoryWiki::open(&path),
            Err(McpError::Serialization(_))
        ));
    }
}
