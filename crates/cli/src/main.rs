//! upsync command-line tool.
//!
//! Reconciles a local working tree against an upstream reference, runs the
//! change classifier on plain path lists, turns schema dumps into embedded
//! templates, and generates / validates configuration files.

mod classify;
mod schema;
mod style;
mod triage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use upsync_core::config::{AppConfig, TriageConfig, DEFAULT_CONFIG_TOML};
use upsync_core::path_policy::PathPolicy;
use upsync_core::GitClient;

/// Exit status of `triage apply` when conflicts are left for review.
pub const EXIT_CONFLICTS: u8 = 2;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// upsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "upsync",
    version,
    about = "Reconcile a local working tree with upstream and sanitize schema dumps"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./upsync.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the working tree against the upstream reference.
    Triage {
        #[command(subcommand)]
        action: TriageAction,
    },

    /// Classify newline-delimited path lists without touching git.
    Classify {
        /// Paths changed in your own history.
        #[arg(long)]
        user: Option<PathBuf>,

        /// Paths modified relative to upstream.
        #[arg(long)]
        modified: Option<PathBuf>,

        /// Paths deleted relative to upstream.
        #[arg(long)]
        deleted: Option<PathBuf>,
    },

    /// Schema dump tools.
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./upsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Subcommand, Debug)]
enum TriageAction {
    /// Show what apply would do.
    Plan,
    /// Restore missing files and overwrite safe updates.
    Apply {
        /// Report what would be written without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaAction {
    /// Sanitize a schema dump and embed it in a JavaScript module.
    Sanitize {
        /// Schema dump to read (overrides `schema.input`).
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Module to write (overrides `schema.output`).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exported constant name (overrides `schema.variable`).
        #[arg(long)]
        variable: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &cli.config))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = expand_tilde(&cli.config);
    match cli.command {
        Commands::Init { output } => cmd_init(&expand_tilde(&output)).map(|_| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(&config_path).map(|_| ExitCode::SUCCESS),
        Commands::Classify {
            user,
            modified,
            deleted,
        } => classify::run(
            user.as_deref(),
            modified.as_deref(),
            deleted.as_deref(),
            cli.json,
        )
        .map(|_| ExitCode::SUCCESS),
        Commands::Schema {
            action:
                SchemaAction::Sanitize {
                    input,
                    output,
                    variable,
                },
        } => {
            let overrides = schema::Overrides {
                input: input.as_deref(),
                output: output.as_deref(),
                variable: variable.as_deref(),
            };
            schema::run_sanitize(&config_path, &overrides, cli.json).map(|_| ExitCode::SUCCESS)
        }
        Commands::Triage { action } => {
            let config = load_config(&config_path)?;
            match action {
                TriageAction::Plan => triage::run_plan(&config, cli.json),
                TriageAction::Apply { dry_run, yes } => {
                    triage::run_apply(&config, dry_run, yes, cli.json)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Logging & config helpers
// ---------------------------------------------------------------------------

/// `UPSYNC_LOG`, then `RUST_LOG`, then `-v`, then `[logging] level`.
fn log_filter(verbose: u8, config_path: &Path) -> EnvFilter {
    for var in ["UPSYNC_LOG", "RUST_LOG"] {
        if let Ok(filter) = EnvFilter::try_from_env(var) {
            return filter;
        }
    }
    let level = match verbose {
        0 => AppConfig::load_from_file(expand_tilde(config_path))
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "warn".to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG_TOML).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set triage.base_ref to the commit your own history starts from");
    println!("  2. Point triage.target_ref at the upstream branch (fetch it first)");
    println!("  3. Validate with: upsync validate --config {}", output.display());
    println!("  4. Preview with: upsync triage plan --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    match &config.triage {
        Some(t) => print_triage_summary(t),
        None => println!("  Triage         : not configured"),
    }
    println!("  Schema input   : {}", config.schema.input.display());
    println!("  Schema output  : {}", config.schema.output.display());
    println!("  Log level      : {}", config.logging.level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

/// Check both repositories open, then print the `[triage]` settings.
fn print_triage_summary(t: &TriageConfig) {
    let history_path = expand_tilde(&t.history_repo);
    let worktree_path = expand_tilde(&t.worktree);
    match GitClient::new(&history_path) {
        Ok(history) => {
            println!("  [OK] History repository opens");
            for reference in [&t.base_ref, &t.head_ref] {
                match history.resolve_sha(reference) {
                    Ok(sha) => println!("  [OK] {} -> {}", reference, sha),
                    Err(e) => println!("  [WARN] {}", e),
                }
            }
        }
        Err(e) => println!("  [WARN] {}", e),
    }
    match GitClient::new(&worktree_path) {
        Ok(worktree) => {
            println!("  [OK] Working tree opens");
            if let Err(e) = worktree.resolve_sha(&t.target_ref) {
                println!("  [WARN] {} (fetch the upstream first)", e);
            }
        }
        Err(e) => println!("  [WARN] {}", e),
    }

    println!("  Working tree   : {}", worktree_path.display());
    println!("  History repo   : {}", history_path.display());
    println!(
        "  Prefix         : {}",
        if t.prefix.is_empty() { "(repository root)" } else { t.prefix.as_str() }
    );
    println!("  Base ref       : {}", t.base_ref);
    println!("  Head ref       : {}", t.head_ref);
    println!("  Target ref     : {}", t.target_ref);
    println!("  Batch size     : {}", t.batch_size);
    let policy = PathPolicy::from(t);
    println!(
        "  Ignore patterns: {}",
        if policy.has_constraints() {
            t.ignore_patterns.join(", ")
        } else {
            "none".to_string()
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_triage_apply_flags() {
        let cli = Cli::try_parse_from(["upsync", "-vv", "triage", "apply", "--dry-run", "--yes"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Triage {
                action: TriageAction::Apply {
                    dry_run: true,
                    yes: true
                }
            }
        ));
    }

    #[test]
    fn test_json_flag_is_global() {
        let cli = Cli::try_parse_from(["upsync", "triage", "plan", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, PathBuf::from("./upsync.toml"));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde(Path::new("rel")), PathBuf::from("rel"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/x.toml")), home.join("x.toml"));
        }
    }

    #[test]
    fn test_init_writes_then_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upsync.toml");
        cmd_init(&path).unwrap();
        assert!(AppConfig::load_from_file(&path).is_ok());
        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upsync.toml");
        std::fs::write(&path, "[triage]\nbase_ref = \"abc\"\nbatch_size = 0\n").unwrap();
        assert!(cmd_validate(&path).is_err());
    }

    #[test]
    fn test_validate_accepts_schema_only_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upsync.toml");
        std::fs::write(&path, "[schema]\ninput = \"dump.sql\"\n").unwrap();
        cmd_validate(&path).unwrap();
    }
}
