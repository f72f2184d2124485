//! `upsync schema sanitize`

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use upsync_core::config::{AppConfig, SchemaConfig};
use upsync_core::schema::SanitizeReport;
use upsync_core::SchemaSanitizer;

use crate::{expand_tilde, style};

/// Command-line overrides for the `[schema]` section.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub input: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub variable: Option<&'a str>,
}

/// The `[schema]` section from the config file, or defaults when there is
/// no config file yet.
pub fn schema_config(config_path: &Path) -> Result<SchemaConfig> {
    if !config_path.exists() {
        return Ok(SchemaConfig::default());
    }
    let config = AppConfig::load_from_file(config_path).context("failed to load configuration file")?;
    Ok(config.schema)
}

pub fn apply_overrides(mut schema: SchemaConfig, overrides: &Overrides<'_>) -> SchemaConfig {
    if let Some(input) = overrides.input {
        schema.input = input.to_path_buf();
    }
    if let Some(output) = overrides.output {
        schema.output = output.to_path_buf();
    }
    if let Some(variable) = overrides.variable {
        schema.variable = variable.to_string();
    }
    schema
}

pub fn run_sanitize(config_path: &Path, overrides: &Overrides<'_>, json: bool) -> Result<()> {
    let schema = apply_overrides(schema_config(config_path)?, overrides);
    let input = expand_tilde(&schema.input);
    let output = expand_tilde(&schema.output);

    let sanitizer = SchemaSanitizer::from_config(&schema).context("invalid schema settings")?;
    let report = sanitizer
        .run(&input, &output, &schema.variable, &schema.header)
        .context("schema sanitize failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}",
        style::success(&format!(
            "Wrote {} ({} of {} statements kept)",
            output.display(),
            report.statements_out,
            report.statements_in
        ))
    );
    println!(
        "{}",
        style::dim(&format!(
            "{} comment(s) and {} psql meta-command(s) removed",
            report.comments_removed, report.meta_commands_removed
        ))
    );
    if !report.dropped.is_empty() || !report.rewritten.is_empty() {
        println!();
        println!("{}", rule_table(&report));
    }
    println!();
    Ok(())
}

fn rule_table(report: &SanitizeReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Rule", "Effect", "Statements"]);

    for (rule, count) in &report.dropped {
        table.add_row(vec![Cell::new(rule), Cell::new("dropped"), Cell::new(count)]);
    }
    for (rule, count) in &report.rewritten {
        table.add_row(vec![Cell::new(rule), Cell::new("rewritten"), Cell::new(count)]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let schema = schema_config(Path::new("/nonexistent/upsync.toml")).unwrap();
        assert_eq!(schema.variable, "tenantSchemaSQL");
    }

    #[test]
    fn test_schema_only_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upsync.toml");
        std::fs::write(&path, "[schema]\ninput = \"dump.sql\"\nvariable = \"schemaSQL\"\n").unwrap();

        let schema = schema_config(&path).unwrap();
        assert_eq!(schema.input, Path::new("dump.sql"));
        assert_eq!(schema.variable, "schemaSQL");
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let overrides = Overrides {
            input: Some(Path::new("dump.sql")),
            variable: Some("schemaSQL"),
            ..Default::default()
        };
        let schema = apply_overrides(SchemaConfig::default(), &overrides);
        assert_eq!(schema.input, Path::new("dump.sql"));
        assert_eq!(schema.variable, "schemaSQL");
        assert_eq!(schema.output, SchemaConfig::default().output);
    }

    #[test]
    fn test_sanitize_writes_module() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("schema.sql");
        let output = dir.path().join("out/tenantSchema.js");
        std::fs::write(
            &input,
            "SET statement_timeout = 0;\nCREATE TABLE public.users (id integer);\nALTER TABLE public.users OWNER TO admin;\n",
        )
        .unwrap();

        let overrides = Overrides {
            input: Some(&input),
            output: Some(&output),
            variable: None,
        };
        run_sanitize(&dir.path().join("missing.toml"), &overrides, true).unwrap();

        let module = std::fs::read_to_string(&output).unwrap();
        assert!(module.contains("CREATE TABLE IF NOT EXISTS users"));
        assert!(!module.contains("OWNER TO"));
        assert!(module.contains("module.exports = tenantSchemaSQL;"));
    }

    #[test]
    fn test_rule_table_lists_counts() {
        let mut report = SanitizeReport::default();
        report.dropped.insert("owner".into(), 3);
        report.rewritten.insert("if_not_exists".into(), 2);
        let rendered = rule_table(&report).to_string();
        assert!(rendered.contains("owner"));
        assert!(rendered.contains("if_not_exists"));
    }
}
