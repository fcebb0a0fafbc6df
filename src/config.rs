//! Gateway configuration.
//!
//! Settings come from built-in defaults, then config tiddlers stored in the
//! wiki itself, then command-line/environment overrides.

use std::fmt;
use std::str::FromStr;

use crate::error::{McpError, Result};
use crate::wiki::Wiki;

/// `yes` to start the gateway
pub const ENABLED_TITLE: &str = "$:/plugins/rryan/tiddly-mcp/configs/enabled";
/// `yes` to register only the non-mutating tools
pub const READ_ONLY_TITLE: &str = "$:/plugins/rryan/tiddly-mcp/configs/read-only";
/// Listen port
pub const PORT_TITLE: &str = "$:/plugins/rryan/tiddly-mcp/configs/port";
/// Comma-separated allowed origins
pub const CORS_ORIGINS_TITLE: &str = "$:/plugins/rryan/tiddly-mcp/configs/cors-origins";
/// Content type for tiddlers written without one
pub const DEFAULT_CONTENT_TYPE_TITLE: &str =
    "$:/plugins/rryan/tiddly-mcp/configs/default-content-type";
/// One of `debug`, `info`, `warn`, `error`
pub const LOG_LEVEL_TITLE: &str = "$:/plugins/rryan/tiddly-mcp/configs/log-level";

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 3100;
/// Loopback only unless overridden.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// TiddlyWiki wikitext.
pub const DEFAULT_CONTENT_TYPE: &str = "text/vnd.tiddlywiki";

/// Allow-list entry that matches every origin.
pub const WILDCARD_ORIGIN: &str = "*";

/// Verbosity of the gateway's own logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    /// Every request and tool call
    Debug,
    /// Startup, sessions and requests
    #[default]
    Info,
    /// Problems the gateway recovered from
    Warn,
    /// Failures only
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(McpError::Config {
                key: "log-level".to_string(),
                reason: format!("unknown log level '{}'", other),
            }),
        }
    }
}

/// Split a comma-separated origin list. Blank means wildcard.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        vec![WILDCARD_ORIGIN.to_string()]
    } else {
        origins
    }
}

/// Config tiddlers store flags as `yes`/`no`.
fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("yes")
}

/// Immutable gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Start the listener at all
    pub enabled: bool,
    /// Leave out `write_tiddler` and `delete_tiddler`
    pub read_only: bool,
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allowed origins in order; [`WILDCARD_ORIGIN`] allows any
    pub cors_origins: Vec<String>,
    /// Content type for tiddlers written without one
    pub default_content_type: String,
    /// Log verbosity
    pub log_level: LogLevel,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_only: true,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec![WILDCARD_ORIGIN.to_string()],
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            log_level: LogLevel::Info,
        }
    }
}

/// Values given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces [`GatewayConfig::enabled`]
    pub enabled: Option<bool>,
    /// Replaces [`GatewayConfig::read_only`]
    pub read_only: Option<bool>,
    /// Replaces [`GatewayConfig::host`]
    pub host: Option<String>,
    /// Replaces [`GatewayConfig::port`]
    pub port: Option<u16>,
    /// Comma-separated; parsed like the config tiddler
    pub cors_origins: Option<String>,
    /// Replaces [`GatewayConfig::default_content_type`]
    pub default_content_type: Option<String>,
    /// Replaces [`GatewayConfig::log_level`]
    pub log_level: Option<LogLevel>,
}

impl GatewayConfig {
    /// Read settings from the config tiddlers, falling back to defaults.
    ///
    /// Invalid values keep their default; the problems are returned so the
    /// caller can report them once logging is up.
    pub fn from_wiki(wiki: &dyn Wiki) -> (Self, Vec<McpError>) {
        let defaults = Self::default();
        let mut problems = Vec::new();
        let text = |title: &str| wiki.get(title).map(|t| t.field_string("text"));

        let enabled = text(ENABLED_TITLE).map_or(defaults.enabled, |v| parse_flag(&v));
        let read_only = text(READ_ONLY_TITLE).map_or(defaults.read_only, |v| parse_flag(&v));

        let port = match text(PORT_TITLE) {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    problems.push(McpError::Config {
                        key: "port".to_string(),
                        reason: format!("'{}' is not a valid port", raw.trim()),
                    });
                    defaults.port
                }
            },
            None => defaults.port,
        };

        let cors_origins = text(CORS_ORIGINS_TITLE)
            .map_or(defaults.cors_origins.clone(), |v| parse_cors_origins(&v));

        let default_content_type = text(DEFAULT_CONTENT_TYPE_TITLE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_content_type.clone());

        let log_level = match text(LOG_LEVEL_TITLE) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                problems.push(e);
                defaults.log_level
            }),
            None => defaults.log_level,
        };

        let config = Self {
            enabled,
            read_only,
            host: defaults.host,
            port,
            cors_origins,
            default_content_type,
            log_level,
        };
        (config, problems)
    }

    /// Apply command-line/environment values over the current settings.
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(enabled) = overrides.enabled {
            self.enabled = enabled;
        }
        if let Some(read_only) = overrides.read_only {
            self.read_only = read_only;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(origins) = overrides.cors_origins {
            self.cors_origins = parse_cors_origins(&origins);
        }
        if let Some(content_type) = overrides.default_content_type {
            self.default_content_type = content_type;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        self
    }

    /// Whether CORS headers should be sent for this request origin.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty()
            || self
                .cors_origins
                .iter()
                .any(|allowed| allowed == WILDCARD_ORIGIN || allowed == origin)
    }

    /// `host:port` to bind the listener to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{MemoryWiki, Tiddler};

    fn config_tiddler(title: &str, text: &str) -> Tiddler {
        Tiddler::new(title).with_field("text", text)
    }

    #[test]
    fn test_defaults_without_config_tiddlers() {
        let (config, problems) = GatewayConfig::from_wiki(&MemoryWiki::new());
        assert_eq!(config, GatewayConfig::default());
        assert!(problems.is_empty());
        assert!(config.enabled);
        assert!(config.read_only);
        assert_eq!(config.port, 3100);
        assert_eq!(config.bind_address(), "127.0.0.1:3100");
    }

    #[test]
    fn test_reads_config_tiddlers() {
        let wiki = MemoryWiki::with_tiddlers([
            config_tiddler(READ_ONLY_TITLE, "no"),
            config_tiddler(PORT_TITLE, "8080"),
            config_tiddler(CORS_ORIGINS_TITLE, "http://a.test, http://b.test"),
            config_tiddler(DEFAULT_CONTENT_TYPE_TITLE, "text/markdown"),
            config_tiddler(LOG_LEVEL_TITLE, "debug"),
        ]);

        let (config, problems) = GatewayConfig::from_wiki(&wiki);
        assert!(problems.is_empty());
        assert!(!config.read_only);
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.default_content_type, "text/markdown");
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_invalid_values_reported_and_defaulted() {
        let wiki = MemoryWiki::with_tiddlers([
            config_tiddler(PORT_TITLE, "eighty"),
            config_tiddler(LOG_LEVEL_TITLE, "loud"),
        ]);
        let (config, problems) = GatewayConfig::from_wiki(&wiki);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(problems.len(), 2);
        assert!(problems
            .iter()
            .all(|p| matches!(p, McpError::Config { .. })));
    }

    #[test]
    fn test_overrides_win() {
        let wiki = MemoryWiki::with_tiddlers([config_tiddler(PORT_TITLE, "8080")]);
        let (config, _) = GatewayConfig::from_wiki(&wiki);
        let config = config.apply_overrides(ConfigOverrides {
            port: Some(9000),
            read_only: Some(false),
            cors_origins: Some("http://x.test".to_string()),
            ..Default::default()
        });
        assert_eq!(config.port, 9000);
        assert!(!config.read_only);
        assert!(config.origin_allowed("http://x.test"));
        assert!(!config.origin_allowed("http://y.test"));
    }

    #[test]
    fn test_parse_cors_origins() {
        assert_eq!(parse_cors_origins("*"), vec!["*"]);
        assert_eq!(parse_cors_origins("  "), vec!["*"]);
        assert_eq!(parse_cors_origins("a, ,b"), vec!["a", "b"]);
    }

    #[test]
    fn test_wildcard_allows_any_origin() {
        let config = GatewayConfig::default();
        assert!(config.origin_allowed("http://anything.example"));
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("yes"));
        assert!(parse_flag(" YES "));
        assert!(!parse_flag("no"));
        assert!(!parse_flag("true"));
    }
}
