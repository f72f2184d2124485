//! `upsync triage` commands.

use std::process::ExitCode;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use upsync_core::config::AppConfig;
use upsync_core::triage::{TriagePlan, TriageProgress, TriageReport, TriageSettings};
use upsync_core::{GitClient, PathSet, TriageEngine};

use crate::style::{self, Bucket};
use crate::{expand_tilde, EXIT_CONFLICTS};

/// Open both repositories named in the config and build an engine.
fn open_engine(config: &AppConfig) -> Result<TriageEngine<GitClient, GitClient>> {
    let t = config.triage()?;
    let history_path = expand_tilde(&t.history_repo);
    let worktree_path = expand_tilde(&t.worktree);

    let history = GitClient::new(&history_path)
        .with_context(|| format!("failed to open history repository {}", history_path.display()))?;
    let worktree = GitClient::new(&worktree_path)
        .with_context(|| format!("failed to open working tree {}", worktree_path.display()))?;

    TriageEngine::new(history, worktree, TriageSettings::from(t))
        .context("failed to initialize triage engine")
}

/// `upsync triage plan`
pub fn run_plan(config: &AppConfig, json: bool) -> Result<ExitCode> {
    let engine = open_engine(config)?;
    let plan = engine.plan().context("failed to build triage plan")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }

    print_plan(&plan);
    Ok(ExitCode::SUCCESS)
}

/// `upsync triage apply`
pub fn run_apply(config: &AppConfig, dry_run: bool, yes: bool, json: bool) -> Result<ExitCode> {
    let engine = open_engine(config)?;
    let plan = engine.plan().context("failed to build triage plan")?;

    if !json {
        print_plan(&plan);
    }

    let writes = plan.to_restore.len() + plan.to_overwrite.len();
    if !dry_run && writes > 0 && !yes {
        if json {
            anyhow::bail!("refusing to write without confirmation: pass --yes with --json");
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Restore {} and overwrite {} file(s) from {}?",
                plan.to_restore.len(),
                plan.to_overwrite.len(),
                plan.target_ref
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            info!("triage apply declined at prompt");
            println!("{}", style::dim("Aborted. Nothing was written."));
            return Ok(ExitCode::SUCCESS);
        }
    }

    let bar = if json || writes == 0 {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(writes as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg:>9} [{bar:30}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        bar
    };

    info!(writes, dry_run, "applying triage plan");
    let report = engine
        .apply(&plan, dry_run, &mut |p: TriageProgress| {
            bar.set_message(p.action.to_string());
            bar.set_position(p.done as u64);
        })
        .context("triage apply failed")?;
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.has_conflicts() {
        ExitCode::from(EXIT_CONFLICTS)
    } else {
        ExitCode::SUCCESS
    })
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_plan(plan: &TriagePlan) {
    println!();
    println!(
        "{}",
        style::header(&format!(
            "Triage plan: {}..{} against {}",
            short(&plan.base_ref),
            plan.head_ref,
            plan.target_ref
        ))
    );
    if !plan.prefix.is_empty() {
        println!("{}", style::dim(&format!("History prefix: {}", plan.prefix)));
    }
    println!(
        "{}",
        style::dim(&format!("{} path(s) changed in your history", plan.user_change_count))
    );
    println!();

    if plan.is_noop() && plan.left_deleted().is_empty() {
        println!("{}", style::success("Working tree matches upstream. Nothing to do."));
        println!();
        return;
    }

    let table = bucket_table(&[
        (Bucket::MissingFromRemote, &plan.to_restore),
        (Bucket::SafeUpdate, &plan.to_overwrite),
        (Bucket::Conflict, plan.to_review()),
        (Bucket::DeletedByUser, plan.left_deleted()),
        (Bucket::Ignored, &plan.skipped_by_policy),
    ]);
    println!("{}", table);
    println!();
}

fn print_report(report: &TriageReport) {
    let verb = if report.dry_run { "Would restore" } else { "Restored" };
    println!("{}", style::success(&format!("{} {} file(s)", verb, report.restored.len())));
    let verb = if report.dry_run { "Would overwrite" } else { "Overwrote" };
    println!("{}", style::success(&format!("{} {} file(s)", verb, report.overwritten.len())));

    if !report.skipped_by_policy.is_empty() {
        println!(
            "{}",
            style::dim(&format!(
                "{} file(s) held back by ignore patterns",
                report.skipped_by_policy.len()
            ))
        );
    }
    if !report.left_deleted.is_empty() {
        println!(
            "{}",
            style::dim(&format!("{} file(s) you deleted were left deleted", report.left_deleted.len()))
        );
    }

    if report.has_conflicts() {
        println!();
        println!(
            "{}",
            style::warn(&format!("{} conflict(s) need manual review:", report.to_review.len()))
        );
        for path in &report.to_review {
            println!("  {}", path);
        }
    }
    println!();
}

/// One row per path, grouped by bucket.
pub fn bucket_table(groups: &[(Bucket, &PathSet)]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Bucket", "Action", "Path"]);

    for (bucket, paths) in groups {
        for path in paths.iter() {
            table.add_row(vec![
                Cell::new(bucket.label()),
                Cell::new(bucket.action()),
                Cell::new(path),
            ]);
        }
    }
    table
}

fn short(reference: &str) -> &str {
    let is_sha = reference.len() >= 12 && reference.chars().all(|c| c.is_ascii_hexdigit());
    if is_sha {
        &reference[..10]
    } else {
        reference
    }
}
