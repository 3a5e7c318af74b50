//! qmops CLI - automation for the quality-management application
//!
//! Usage:
//!   qmops monitor [continuous] [--update-only]     Health checks and status document
//!   qmops tracker [init|status|continuous]          Planner/document role sync
//!   qmops plan <work-order.json> | --example        Decompose a work order
//!   qmops hierarchy [show-progress|create-hierarchy|launch <id>|recover|audit-security]
//!   qmops hygiene [cleanup|list|restore <name>|continuous]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use qmops_core::document::CoordinationDocument;
use qmops_core::fsutil::write_json;
use qmops_core::runner::{RunSummary, Runner};
use qmops_core::{HealthStatus, NodeStatus, QmopsConfig, QmopsError, RoleStatus, RunContext, SystemStatusSnapshot};
use qmops_hygiene::{CleanupOptions, CleanupReport, HygieneEngine};
use qmops_monitor::Reconciler;
use qmops_orchestrator::{
    children_from_roles, children_from_tasks, HierarchyManager, LaunchOutcome, SecurityAudit, Severity,
};
use qmops_planning::{example_work_order, Decomposer, RoleRegistry, StateSync, SyncReport, WorkOrder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "qmops")]
#[command(author, version, about = "Automation layer for the quality-management application")]
struct Cli {
    /// Repository root (defaults to current directory)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Configuration file (defaults to <root>/.qmops/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check application health and update the coordination document
    Monitor {
        #[command(subcommand)]
        mode: Option<MonitorCommands>,

        /// Rewrite the document from the last snapshot without checking
        #[arg(long)]
        update_only: bool,
    },

    /// Synchronize role progress between the planner and the document
    Tracker {
        #[command(subcommand)]
        action: Option<TrackerCommands>,
    },

    /// Decompose a work order into role-assigned tasks
    Plan {
        /// Work order JSON file
        file: Option<PathBuf>,

        /// Use the built-in example work order
        #[arg(long)]
        example: bool,
    },

    /// Manage the coordinator hierarchy
    Hierarchy {
        #[command(subcommand)]
        action: Option<HierarchyCommands>,
    },

    /// Repository cleanup with verified backups
    Hygiene {
        #[command(subcommand)]
        action: Option<HygieneCommands>,
    },
}

#[derive(Subcommand)]
enum MonitorCommands {
    /// Run a cycle every `monitor.interval_secs`
    Continuous,
}

#[derive(Subcommand)]
enum TrackerCommands {
    /// Write default config, planner skeleton and coordination document
    Init,
    /// Sync once and print per-role status
    Status,
    /// Sync every `sync.interval_secs`
    Continuous,
}

#[derive(Subcommand)]
enum HierarchyCommands {
    /// Print the tree with progress bars
    ShowProgress,

    /// Replace the root coordinator
    CreateHierarchy {
        /// Work order JSON whose tasks become the children
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,

        /// Coordinator id (defaults to `hierarchy.coordinator_id`)
        #[arg(long)]
        id: Option<String>,
    },

    /// Run every unfinished child of a coordinator
    Launch {
        /// Coordinator id
        id: Option<String>,
    },

    /// Resume a coordinator left running by an interrupted process
    Recover,

    /// Report insecure endpoints and files (read-only)
    AuditSecurity,
}

#[derive(Subcommand)]
enum HygieneCommands {
    /// Scan, back up and remove duplicates and obsolete files
    Cleanup {
        /// Report candidates without touching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List backup runs
    List,

    /// Copy the files of a backup run back into the repository
    Restore {
        /// Backup name, e.g. backup-20240101-120000
        name: Option<String>,

        /// Overwrite files that already exist
        #[arg(long)]
        force: bool,
    },

    /// Run cleanup every `hygiene.interval_secs`
    Continuous,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let ctx = load_context(cli.root, cli.config)?;

    match cli.command {
        Commands::Monitor { mode, update_only } => cmd_monitor(&ctx, mode, update_only).await,
        Commands::Tracker { action } => cmd_tracker(&ctx, action).await,
        Commands::Plan { file, example } => cmd_plan(&ctx, file, example).await,
        Commands::Hierarchy { action } => cmd_hierarchy(&ctx, action).await,
        Commands::Hygiene { action } => cmd_hygiene(&ctx, action).await,
    }
}

fn load_context(root: Option<PathBuf>, config: Option<PathBuf>) -> Result<RunContext> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let ctx = match config {
        Some(path) => {
            let config = QmopsConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            RunContext::new(root, config)
        }
        None => RunContext::load(&root)
            .with_context(|| format!("Failed to load config under {}", root.display()))?,
    };
    Ok(ctx)
}

fn runner(name: &str, interval_secs: u64, ctx: &RunContext) -> Runner {
    Runner::new(name, Duration::from_secs(interval_secs))
        .with_max_cycles(ctx.config().runner.restart_after_cycles)
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "Stopped after {} cycles ({} failed): {:?}",
        summary.cycles, summary.failed_cycles, summary.stop_reason
    );
}

// ============================================================================
// Monitor
// ============================================================================

async fn cmd_monitor(ctx: &RunContext, mode: Option<MonitorCommands>, update_only: bool) -> Result<()> {
    let reconciler = Reconciler::new(ctx).context("Failed to build health monitor")?;

    match mode {
        None if update_only => {
            let snapshot = reconciler.update_only().await;
            println!("Updated {}", reconciler.document_path().display());
            print_snapshot(&snapshot);
        }
        None => {
            let snapshot = reconciler.run_cycle().await;
            print_snapshot(&snapshot);
        }
        Some(MonitorCommands::Continuous) => {
            let reconciler = &reconciler;
            let summary = runner("monitor", ctx.config().monitor.interval_secs, ctx)
                .run(|_| async move {
                    let snapshot = reconciler.run_cycle().await;
                    info!("Monitor cycle: overall {}", snapshot.overall());
                    Ok::<_, QmopsError>(())
                })
                .await;
            print_run_summary(&summary);
        }
    }
    Ok(())
}

fn health_label(status: HealthStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        HealthStatus::Healthy => text.green(),
        HealthStatus::Degraded => text.yellow(),
        HealthStatus::Critical => text.red().bold(),
        HealthStatus::Unknown => text.dimmed(),
    }
}

fn print_snapshot(snapshot: &SystemStatusSnapshot) {
    println!("{}", "System Status".bold());
    println!("  Checked:  {}", snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Backend:  {}", health_label(snapshot.backend_health));
    println!("  Frontend: {}", health_label(snapshot.frontend_health));
    println!("  Overall:  {}", health_label(snapshot.overall()));

    if !snapshot.critical_errors.is_empty() {
        println!("  {}", "Critical errors:".red());
        for error in &snapshot.critical_errors {
            println!("    - {}", error);
        }
    }
    if !snapshot.agent_progress.is_empty() {
        println!("  Agent progress:");
        for (role, progress) in &snapshot.agent_progress {
            println!("    {:<10} {:>3}%", role, progress);
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

async fn cmd_tracker(ctx: &RunContext, action: Option<TrackerCommands>) -> Result<()> {
    let sync = StateSync::new(ctx);

    match action.unwrap_or(TrackerCommands::Status) {
        TrackerCommands::Init => {
            let config_path = ctx.state_dir().join("config.toml");
            if config_path.exists() {
                println!("  Config:   {} (kept)", config_path.display());
            } else {
                QmopsConfig::write_default(ctx.root()).context("Failed to write default config")?;
                println!("  Config:   {}", config_path.display());
            }

            let written = sync.init_planner().await.context("Failed to write planner config")?;
            println!(
                "  Planner:  {}{}",
                sync.planner_path().display(),
                if written { "" } else { " (kept)" }
            );

            let document_path = ctx.resolve(&ctx.config().monitor.document_path);
            let document = CoordinationDocument::load_or_seed(&document_path)
                .await
                .context("Failed to read coordination document")?;
            document.write().await.context("Failed to write coordination document")?;
            println!("  Document: {}", document_path.display());

            println!("{}", "✓ Initialized qmops".green().bold());
        }
        TrackerCommands::Status => {
            let report = sync.run().await;
            print_sync_report(&report);
        }
        TrackerCommands::Continuous => {
            let sync = &sync;
            let summary = runner("tracker", ctx.config().sync.interval_secs, ctx)
                .run(|_| async move {
                    sync.run().await;
                    Ok::<_, QmopsError>(())
                })
                .await;
            print_run_summary(&summary);
        }
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "{} (planner {}, document from {:?}, precedence {:?})",
        "Role Sync".bold(),
        if report.planner_loaded { "loaded" } else { "missing" },
        report.document_source,
        report.precedence
    );
    for role in &report.roles {
        let status = role.status.to_string();
        let status = match role.status {
            RoleStatus::Completed => status.green(),
            RoleStatus::InProgress => status.cyan(),
            RoleStatus::Blocked => status.red(),
            RoleStatus::Pending => status.dimmed(),
        };
        let tasks = match (role.completed_tasks, role.total_tasks) {
            (Some(done), Some(total)) => format!(" ({}/{} tasks)", done, total),
            _ => String::new(),
        };
        println!("  {:<10} {:>3}%  {}{}", role.key, role.progress, status, tasks);
    }
    let a = &report.aggregate;
    println!(
        "  {} roles: {} pending, {} in progress, {} blocked, {} completed, average {:.1}%",
        a.total_roles, a.pending, a.in_progress, a.blocked, a.completed, a.average_progress
    );
}

// ============================================================================
// Plan
// ============================================================================

fn load_work_order(path: &Path) -> Result<WorkOrder> {
    WorkOrder::load(path).with_context(|| format!("Failed to load work order {}", path.display()))
}

async fn cmd_plan(ctx: &RunContext, file: Option<PathBuf>, example: bool) -> Result<()> {
    let order = match (file, example) {
        (Some(path), _) => load_work_order(&path)?,
        (None, true) => example_work_order(),
        (None, false) => bail!("Missing work order: pass a JSON file or --example"),
    };

    let assignment = Decomposer::new(ctx.config().decomposition.clone()).decompose(&order);
    let output = ctx.state_dir().join("assignments.json");
    write_json(&output, &assignment)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{} {} ({})", "Work order".bold(), order.id, order.title);
    println!(
        "  Modules: {}",
        assignment
            .analysis
            .modules
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for task in &assignment.tasks {
        println!(
            "  {:<24} {:<10} {:>7.2}h  {}",
            task.id, task.assigned_role, task.estimated_hours, task.priority
        );
    }
    let d = &assignment.duration;
    println!(
        "  Total {:.2}h of {:.2}h budget ({:.2}h unallocated), ~{} days{}",
        d.total_hours,
        d.budget_hours,
        d.unallocated_hours,
        d.estimated_days,
        if d.parallel_execution { ", parallel" } else { "" }
    );
    println!("  Written to {}", output.display());
    Ok(())
}

// ============================================================================
// Hierarchy
// ============================================================================

async fn cmd_hierarchy(ctx: &RunContext, action: Option<HierarchyCommands>) -> Result<()> {
    let mut manager = HierarchyManager::open(ctx)
        .await
        .context("Failed to open hierarchy")?;

    match action.unwrap_or(HierarchyCommands::ShowProgress) {
        HierarchyCommands::ShowProgress => {
            print!("{}", manager.show_progress());
        }
        HierarchyCommands::CreateHierarchy { from, id } => {
            let id = id.unwrap_or_else(|| ctx.config().hierarchy.coordinator_id.clone());
            let (name, children) = match from {
                Some(path) => {
                    let order = load_work_order(&path)?;
                    let assignment = Decomposer::new(ctx.config().decomposition.clone()).decompose(&order);
                    (order.title, children_from_tasks(&assignment.tasks))
                }
                None => (
                    "QM Coordinator".to_string(),
                    children_from_roles(&RoleRegistry::new()),
                ),
            };
            let root = manager
                .create_hierarchy(&id, &name, children)
                .await
                .context("Failed to create hierarchy")?;
            println!(
                "{} {} with {} children",
                "✓ Created coordinator".green().bold(),
                root.id,
                root.children.len()
            );
        }
        HierarchyCommands::Launch { id } => {
            let Some(id) = id else {
                bail!("Missing coordinator id: qmops hierarchy launch <id>");
            };
            let executor = manager.default_executor();
            let outcome = manager.launch_coordinator(&id, &executor).await;
            report_launch(&id, outcome)?;
            print!("{}", manager.show_progress());
        }
        HierarchyCommands::Recover => {
            let executor = manager.default_executor();
            match manager.recover(&executor).await {
                Some(outcome) => {
                    let id = manager.root().map(|r| r.id.clone()).unwrap_or_default();
                    report_launch(&id, outcome)?;
                    print!("{}", manager.show_progress());
                }
                None => println!("Nothing to recover"),
            }
        }
        HierarchyCommands::AuditSecurity => {
            let report = SecurityAudit::new(ctx)
                .run(manager.state())
                .context("Security audit failed")?;
            if report.is_clean() {
                println!("{} ({} files scanned)", "✓ No findings".green().bold(), report.files_scanned);
            }
            for finding in &report.findings {
                let severity = finding.severity.to_string();
                let severity = match finding.severity {
                    Severity::High => severity.red().bold(),
                    Severity::Medium => severity.yellow(),
                    Severity::Low => severity.normal(),
                };
                println!("  [{}] {}: {}", severity, finding.subject, finding.detail);
            }
        }
    }

    manager.flush().await.context("Failed to persist hierarchy")?;
    Ok(())
}

fn report_launch(id: &str, outcome: LaunchOutcome) -> Result<()> {
    match outcome {
        LaunchOutcome::Completed => {
            println!("{} {}", "✓ Completed".green().bold(), id);
            Ok(())
        }
        LaunchOutcome::AlreadyFinished(status) => {
            let label = match status {
                NodeStatus::Failed => status.to_string().red(),
                _ => status.to_string().green(),
            };
            println!("Coordinator {} is already {}", id, label);
            Ok(())
        }
        LaunchOutcome::NotFound => {
            error!("Coordinator {} not found", id);
            println!("{} {}", "Coordinator not found:".red(), id);
            Ok(())
        }
        LaunchOutcome::Failed { child_id, reason } => {
            bail!("Coordinator {} failed at child {}: {}", id, child_id, reason)
        }
    }
}

// ============================================================================
// Hygiene
// ============================================================================

async fn run_cleanup(engine: &HygieneEngine, options: CleanupOptions) -> Result<CleanupReport> {
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || engine.run(options))
        .await
        .context("Cleanup task panicked")
}

async fn cmd_hygiene(ctx: &RunContext, action: Option<HygieneCommands>) -> Result<()> {
    let engine = HygieneEngine::new(ctx).context("Failed to set up hygiene engine")?;

    match action.unwrap_or(HygieneCommands::Cleanup { dry_run: false }) {
        HygieneCommands::Cleanup { dry_run } => {
            let report = run_cleanup(&engine, CleanupOptions { dry_run }).await?;
            print_cleanup_report(&report);
        }
        HygieneCommands::List => {
            let engine = engine.clone();
            let backups = tokio::task::spawn_blocking(move || engine.list_backups())
                .await
                .context("Backup listing panicked")?
                .context("Failed to list backups")?;
            if backups.is_empty() {
                println!("No backups");
            }
            for backup in backups {
                println!(
                    "  {:<24} {:>5} files {:>10} bytes  {}",
                    backup.name,
                    backup.files,
                    backup.bytes,
                    backup.path.display()
                );
            }
        }
        HygieneCommands::Restore { name, force } => {
            let Some(name) = name else {
                bail!("Missing backup name: qmops hygiene restore <name>");
            };
            let engine = engine.clone();
            let target = name.clone();
            let summary = tokio::task::spawn_blocking(move || engine.restore_backup(&target, force))
                .await
                .context("Restore panicked")?
                .with_context(|| format!("Failed to restore {}", name))?;

            println!(
                "{} {}: {} restored, {} skipped, {} errors",
                "✓ Restored".green().bold(),
                name,
                summary.restored.len(),
                summary.skipped.len(),
                summary.errors.len()
            );
            for path in &summary.skipped {
                println!("  skipped {} (exists, use --force)", path.display());
            }
            for error in &summary.errors {
                println!("  {} {}", "error".red(), error);
            }
        }
        HygieneCommands::Continuous => {
            let engine = &engine;
            let summary = runner("hygiene", ctx.config().hygiene.interval_secs, ctx)
                .run(|_| async move {
                    let report = run_cleanup(engine, CleanupOptions { dry_run: false })
                        .await
                        .map_err(|e| QmopsError::Hygiene(e.to_string()))?;
                    info!(
                        "Hygiene cycle: removed {} files, freed {} bytes",
                        report.files_removed, report.space_freed_bytes
                    );
                    Ok::<_, QmopsError>(())
                })
                .await;
            print_run_summary(&summary);
        }
    }
    Ok(())
}

fn print_cleanup_report(report: &CleanupReport) {
    let title = if report.dry_run { "Cleanup (dry run)" } else { "Cleanup" };
    println!("{}", title.bold());
    println!("  Scanned:    {}", report.files_scanned);
    println!("  Duplicates: {}", report.duplicates_found);
    println!("  Obsolete:   {}", report.obsolete_found);
    println!("  Removed:    {}", report.files_removed);
    println!("  Freed:      {} bytes", report.space_freed_bytes);
    if let Some(dir) = &report.backup_dir {
        println!("  Backup:     {}", dir.display());
    }
    if report.dry_run {
        for candidate in &report.candidates {
            println!("    would remove {}", candidate.path.display());
        }
    }
    for warning in &report.cache_warnings {
        println!(
            "  {} {} is {} bytes (threshold {})",
            "warning".yellow(),
            warning.path.display(),
            warning.size_bytes,
            warning.threshold_bytes
        );
    }
    for error in &report.errors {
        println!("  {} {}", "error".red(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_coordinator_is_not_fatal() {
        assert!(report_launch("missing", LaunchOutcome::NotFound).is_ok());
        assert!(report_launch("qm-root", LaunchOutcome::Completed).is_ok());
        assert!(report_launch("qm-root", LaunchOutcome::AlreadyFinished(NodeStatus::Failed)).is_ok());
    }

    #[test]
    fn failed_launch_is_fatal() {
        let outcome = LaunchOutcome::Failed {
            child_id: "qa-agent".to_string(),
            reason: "worker crashed".to_string(),
        };
        let err = report_launch("qm-root", outcome).unwrap_err();
        assert!(err.to_string().contains("qa-agent"));
    }

    #[test]
    fn invalid_work_order_is_reported_with_its_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("order.json");
        std::fs::write(
            &path,
            r#"{"id": "wo-1", "title": "t", "requirements": [], "budgetHours": -3}"#,
        )
        .unwrap();

        let err = load_work_order(&path).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("Failed to load work order"));
        assert!(message.contains("invalid budget"));
    }

    #[test]
    fn launch_without_id_is_rejected() {
        let cli = Cli::parse_from(["qmops", "hierarchy", "launch"]);
        assert!(matches!(
            cli.command,
            Commands::Hierarchy {
                action: Some(HierarchyCommands::Launch { id: None })
            }
        ));
    }
}
