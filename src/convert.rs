//! Conversion utilities between tiddler fields and JSON.
//!
//! Two JSON shapes are handled here:
//!
//! - the tool-facing shape, where list fields are arrays and dates are
//!   RFC 3339 strings (what `read_tiddler` returns to agents);
//! - the TiddlyWiki JSON export shape, where every field is a string, dates
//!   use the `YYYYMMDDHHmmssSSS` format and lists use the `[[a b]] c`
//!   title-list syntax (what the backing file stores).

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::wiki::{FieldValue, Tiddler};

/// Fields stored as title lists.
pub const LIST_FIELDS: &[&str] = &["tags", "list"];

/// Fields stored as dates.
pub const DATE_FIELDS: &[&str] = &["created", "modified"];

/// Format a date in TiddlyWiki's compact UTC form.
pub fn stringify_tw_date(date: &DateTime<Utc>) -> String {
    date.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Parse a TiddlyWiki compact date.
///
/// Trailing components may be omitted (`20240102` is midnight on that day).
pub fn parse_tw_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.len() < 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let part = |start: usize, len: usize, default: u32| -> Option<u32> {
        match s.get(start..start + len) {
            Some(digits) => digits.parse().ok(),
            None if s.len() <= start => Some(default),
            None => None,
        }
    };

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month = part(4, 2, 1)?;
    let day = part(6, 2, 1)?;
    let hour = part(8, 2, 0)?;
    let minute = part(10, 2, 0)?;
    let second = part(12, 2, 0)?;
    let milli = part(14, 3, 0)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(
        hour, minute, second, milli,
    )?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parse a TiddlyWiki title list (`one [[two words]] three`).
pub fn parse_string_array(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("[[") {
            match after.find("]]") {
                Some(end) => {
                    items.push(after[..end].to_string());
                    rest = after[end + 2..].trim_start();
                }
                None => {
                    items.push(after.to_string());
                    break;
                }
            }
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            items.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }

    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    items
}

/// Inverse of [`parse_string_array`].
pub fn stringify_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_empty() || item.contains(char::is_whitespace) {
                format!("[[{}]]", item)
            } else {
                item.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a field to its tool-facing JSON representation.
pub fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::Text(s) => JsonValue::String(s.clone()),
        FieldValue::List(items) => {
            JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
        }
        FieldValue::Date(date) => {
            JsonValue::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    }
}

/// Convert a tiddler to its tool-facing JSON object.
pub fn tiddler_to_json(tiddler: &Tiddler) -> JsonValue {
    let obj: Map<String, JsonValue> = tiddler
        .fields()
        .map(|(name, value)| (name.to_string(), field_to_json(value)))
        .collect();
    JsonValue::Object(obj)
}

/// Convert a tiddler to the string-valued TiddlyWiki export shape.
pub fn tiddler_to_export_json(tiddler: &Tiddler) -> JsonValue {
    let obj: Map<String, JsonValue> = tiddler
        .fields()
        .map(|(name, value)| (name.to_string(), JsonValue::String(value.to_field_string())))
        .collect();
    JsonValue::Object(obj)
}

/// Read a tiddler from the TiddlyWiki export shape.
///
/// List fields may be given either as title-list strings or JSON arrays.
/// Date fields that do not parse are kept as plain text.
pub fn tiddler_from_export_json(json: &JsonValue) -> Result<Tiddler> {
    let obj = json.as_object().ok_or_else(|| {
        McpError::Store("tiddler entry must be a JSON object".to_string())
    })?;

    let title = obj
        .get("title")
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::Store("tiddler entry is missing a title".to_string()))?;

    let mut tiddler = Tiddler::new(title);
    for (name, value) in obj {
        if name == "title" {
            continue;
        }
        let field = match value {
            JsonValue::Array(items) if LIST_FIELDS.contains(&name.as_str()) => FieldValue::List(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            JsonValue::String(s) if LIST_FIELDS.contains(&name.as_str()) => {
                FieldValue::List(parse_string_array(s))
            }
            JsonValue::String(s) if DATE_FIELDS.contains(&name.as_str()) => match parse_tw_date(s)
            {
                Some(date) => FieldValue::Date(date),
                None => FieldValue::Text(s.clone()),
            },
            JsonValue::String(s) => FieldValue::Text(s.clone()),
            JsonValue::Null => continue,
            other => FieldValue::Text(other.to_string()),
        };
        tiddler.set_field(name, field);
    }
    Ok(tiddler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_tw_date_round_trip() {
        let date = parse_tw_date("20240315123045678").unwrap();
        assert_eq!(stringify_tw_date(&date), "20240315123045678");
        assert_eq!(date.nanosecond() / 1_000_000, 678);
    }

    #[test]
    fn test_tw_date_short_forms() {
        let date = parse_tw_date("20240315").unwrap();
        assert_eq!(stringify_tw_date(&date), "20240315000000000");
        assert!(parse_tw_date("2024131").is_none());
        assert!(parse_tw_date("not a date").is_none());
        assert!(parse_tw_date("").is_none());
    }

    #[test]
    fn test_parse_string_array() {
        assert_eq!(
            parse_string_array("one [[two words]] three"),
            vec!["one", "two words", "three"]
        );
        assert_eq!(parse_string_array("  a  a b "), vec!["a", "b"]);
        assert!(parse_string_array("").is_empty());
    }

    #[test]
    fn test_stringify_list_brackets_spaces() {
        let items = vec!["Journal".to_string(), "To Do".to_string()];
        assert_eq!(stringify_list(&items), "Journal [[To Do]]");
        assert_eq!(parse_string_array(&stringify_list(&items)), items);
    }

    #[test]
    fn test_export_json_accepts_array_tags() {
        let json = serde_json::json!({
            "title": "Note",
            "text": "hello",
            "tags": ["a b", "c"],
            "created": "20240101000000000",
            "revision": 3
        });
        let tiddler = tiddler_from_export_json(&json).unwrap();
        assert_eq!(tiddler.field_list("tags"), vec!["a b", "c"]);
        assert!(matches!(tiddler.field("created"), Some(FieldValue::Date(_))));
        assert_eq!(tiddler.field_string("revision"), "3");

        let exported = tiddler_to_export_json(&tiddler);
        assert_eq!(exported["tags"], "[[a b]] c");
        assert_eq!(exported["created"], "20240101000000000");
    }

    #[test]
    fn test_export_json_requires_title() {
        let err = tiddler_from_export_json(&serde_json::json!({"text": "x"})).unwrap_err();
        assert!(matches!(err, McpError::Store(_)));
    }

    #[test]
    fn test_tool_json_uses_arrays_and_rfc3339() {
        let date = parse_tw_date("20240102030405006").unwrap();
        let tiddler = Tiddler::new("T")
            .with_field("tags", FieldValue::List(vec!["x".to_string()]))
            .with_field("modified", FieldValue::Date(date));
        let json = tiddler_to_json(&tiddler);
        assert_eq!(json["tags"], serde_json::json!(["x"]));
        assert_eq!(json["modified"], "2024-01-02T03:04:05.006Z");
        assert_eq!(json["title"], "T");
    }
}
