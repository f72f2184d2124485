//! TOML-based configuration for upsync.
//!
//! One file carries both tools: the `[triage]` section drives upstream triage
//! and the `[schema]` section drives the schema sanitizer. Either section may
//! be left out when only the other tool is used. Everything in `[triage]`
//! except `base_ref` has a default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream triage settings. Only `upsync triage` requires them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageConfig>,

    /// Schema sanitizer settings.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Triage
// ---------------------------------------------------------------------------

/// Settings for reconciling a working tree against an upstream reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Repository whose working tree is reconciled.
    #[serde(default = "default_repo")]
    pub worktree: PathBuf,

    /// Repository holding the user's own history. Usually the same as
    /// `worktree`.
    #[serde(default = "default_repo")]
    pub history_repo: PathBuf,

    /// Subdirectory of `history_repo` that maps onto the root of `worktree`.
    /// Empty means the whole repository.
    #[serde(default)]
    pub prefix: String,

    /// Fixed historical commit the user's history is measured from.
    pub base_ref: String,

    /// End of the user's history. Default `HEAD`.
    #[serde(default = "default_head_ref")]
    pub head_ref: String,

    /// Upstream reference the working tree is compared against.
    #[serde(default = "default_target_ref")]
    pub target_ref: String,

    /// Number of paths checked out per call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Glob patterns for paths that are never restored or overwritten.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_repo() -> PathBuf {
    PathBuf::from(".")
}
fn default_head_ref() -> String {
    "HEAD".into()
}
fn default_target_ref() -> String {
    "origin/main".into()
}
fn default_batch_size() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Settings for turning a schema dump into an embedded template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Path of the `pg_dump --schema-only` output.
    #[serde(default = "default_schema_input")]
    pub input: PathBuf,

    /// Path of the generated JavaScript module.
    #[serde(default = "default_schema_output")]
    pub output: PathBuf,

    /// Name of the exported JavaScript constant.
    #[serde(default = "default_schema_variable")]
    pub variable: String,

    /// First line of the generated file's doc comment.
    #[serde(default = "default_schema_header")]
    pub header: String,

    /// Schema qualifier stripped from object names. Empty disables stripping.
    #[serde(default = "default_strip_schema")]
    pub strip_schema: String,
}

fn default_schema_input() -> PathBuf {
    PathBuf::from("schema.sql")
}
fn default_schema_output() -> PathBuf {
    PathBuf::from("server/config/tenantSchema.js")
}
fn default_schema_variable() -> String {
    "tenantSchemaSQL".into()
}
fn default_schema_header() -> String {
    "Complete Tenant Schema Template".into()
}
fn default_strip_schema() -> String {
    "public".into()
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            input: default_schema_input(),
            output: default_schema_output(),
            variable: default_schema_variable(),
            header: default_schema_header(),
            strip_schema: default_strip_schema(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Parse an [`AppConfig`] from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// The `[triage]` section, or an error naming it when it is absent.
    pub fn triage(&self) -> Result<&TriageConfig, ConfigError> {
        self.triage
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection("triage".into()))
    }

    /// Validate that all present sections are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = &self.triage {
            Self::validate_triage(t)?;
        }
        if !crate::schema::is_js_identifier(&self.schema.variable) {
            return Err(ConfigError::InvalidValue {
                field: "schema.variable".into(),
                detail: format!("'{}' is not a JavaScript identifier", self.schema.variable),
            });
        }

        Ok(())
    }

    fn validate_triage(t: &TriageConfig) -> Result<(), ConfigError> {
        for (field, value) in [
            ("triage.base_ref", &t.base_ref),
            ("triage.head_ref", &t.head_ref),
            ("triage.target_ref", &t.target_ref),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "reference must not be empty".into(),
                });
            }
        }
        if t.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "triage.batch_size".into(),
                detail: "batch size must be > 0".into(),
            });
        }
        if t.prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "triage.prefix".into(),
                detail: "prefix must be relative to the history repository root".into(),
            });
        }
        if t.ignore_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "triage.ignore_patterns".into(),
                detail: "patterns must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Commented default configuration written by `upsync init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# upsync configuration

[triage]
# Repository whose working tree is reconciled.
worktree = "."
# Repository holding your own history (often the same repository).
history_repo = "."
# Subdirectory of history_repo that corresponds to the worktree root.
prefix = ""
# Commit your history is measured from. Required.
base_ref = "REPLACE_WITH_COMMIT_SHA"
head_ref = "HEAD"
# Upstream reference the working tree is compared against.
target_ref = "origin/main"
batch_size = 50
# Paths matching these globs are never restored or overwritten.
ignore_patterns = []

[schema]
input = "schema.sql"
output = "server/config/tenantSchema.js"
variable = "tenantSchemaSQL"
header = "Complete Tenant Schema Template"
strip_schema = "public"

[logging]
level = "warn"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[triage]
worktree = "/work/app"
history_repo = "/work/monorepo"
prefix = "apps/clinic"
base_ref = "4f2a9c1"
head_ref = "main"
target_ref = "upstream/main"
batch_size = 10
ignore_patterns = ["**/*.lock", ".env*"]

[schema]
input = "dump.sql"
output = "out/schema.js"
variable = "schemaSQL"
header = "Schema"
strip_schema = ""

[logging]
level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml_str(sample_toml()).expect("failed to parse toml");
        let t = config.triage().unwrap();
        assert_eq!(t.prefix, "apps/clinic");
        assert_eq!(t.history_repo, PathBuf::from("/work/monorepo"));
        assert_eq!(t.batch_size, 10);
        assert_eq!(t.ignore_patterns.len(), 2);
        assert_eq!(config.schema.variable, "schemaSQL");
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upsync.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.triage().unwrap().target_ref, "upstream/main");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/upsync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_base_ref_is_parse_error() {
        let result = AppConfig::from_toml_str("[triage]\nprefix = \"app\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("[triage]\nbase_ref = \"abc123\"\n").unwrap();
        let t = config.triage().unwrap();
        assert_eq!(t.worktree, PathBuf::from("."));
        assert_eq!(t.history_repo, PathBuf::from("."));
        assert_eq!(t.prefix, "");
        assert_eq!(t.head_ref, "HEAD");
        assert_eq!(t.target_ref, "origin/main");
        assert_eq!(t.batch_size, 50);
        assert_eq!(config.schema.variable, "tenantSchemaSQL");
        assert_eq!(config.schema.strip_schema, "public");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_schema_only_config() {
        let config =
            AppConfig::from_toml_str("[schema]\ninput = \"dump.sql\"\nvariable = \"schemaSQL\"\n")
                .unwrap();
        config.validate().unwrap();
        assert_eq!(config.schema.input, PathBuf::from("dump.sql"));
        assert!(config.triage.is_none());
        assert!(matches!(
            config.triage(),
            Err(ConfigError::MissingSection(ref name)) if name == "triage"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.triage.as_mut().unwrap().batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "triage.batch_size"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_ref() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.triage.as_mut().unwrap().target_ref = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "triage.target_ref"
        ));
    }

    #[test]
    fn test_validate_rejects_absolute_prefix() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.triage.as_mut().unwrap().prefix = "/apps".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_variable() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.schema.variable = "tenant-schema".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "schema.variable"
        ));
    }

    #[test]
    fn test_default_config_template_parses() {
        let config = AppConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.triage().unwrap().base_ref, "REPLACE_WITH_COMMIT_SHA");
    }
}
