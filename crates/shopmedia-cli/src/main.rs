//! Shopmedia operator CLI — integrity scanning and reconciliation.
//!
//! Set DATABASE_URL and SHOPMEDIA_MEDIA_ROOT (see `shopmedia_core::Config`).
//! `reconcile` is a dry run unless `--apply` is given; deletions are backed
//! up unless `--no-backup` explicitly confirms unrecoverable removal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use shopmedia_cli::init_tracing;
use shopmedia_core::Config;
use shopmedia_db::PgImageStore;
use shopmedia_services::{
    DanglingPolicy, IntegrityDiff, IntegrityScanner, ReconcileOptions, ReconcilePolicy,
    ReconcileReport, Reconciler,
};
use shopmedia_storage::ImageVault;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "shopmedia", about = "Image storage integrity tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the media tree and the image table for drift
    Scan {
        /// Emit the full diff as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Repair drift found by a fresh scan
    Reconcile {
        /// Execute the actions; without this flag the run is a dry run
        #[arg(long)]
        apply: bool,
        /// Delete orphans without a backup copy (explicit confirmation of
        /// unrecoverable deletion)
        #[arg(long)]
        no_backup: bool,
        /// Delete records whose physical file is gone
        #[arg(long, conflicts_with = "restore_dangling")]
        delete_dangling: bool,
        /// Restore missing files from the newest backup instead
        #[arg(long, conflicts_with = "delete_dangling")]
        restore_dangling: bool,
        /// Emit the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgImageStore::new(pool));
    let vault = ImageVault::new(&config.media_root)
        .await
        .context("Failed to open media root")?;
    let scanner = IntegrityScanner::new(store.clone(), vault.clone());

    match cli.command {
        Commands::Scan { json } => {
            let diff = scanner.scan().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print_diff_summary(&diff);
            }
        }
        Commands::Reconcile {
            apply,
            no_backup,
            delete_dangling,
            restore_dangling,
            json,
        } => {
            let reconciler = Reconciler::new(
                store.clone(),
                vault.clone(),
                &config.backup_root,
                config.thumbnail_max_dim,
            );

            let policy = if apply {
                ReconcilePolicy::Apply
            } else {
                ReconcilePolicy::DryRun
            };
            let options = ReconcileOptions {
                backup: !no_backup,
                dangling: if delete_dangling {
                    DanglingPolicy::DeleteRecord
                } else if restore_dangling {
                    DanglingPolicy::RestoreFromBackup
                } else {
                    DanglingPolicy::Report
                },
            };

            // abort-after-current-item on Ctrl-C
            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; finishing current item");
                    signal_cancel.cancel();
                }
            });

            // the scan feeding an apply run is always fresh
            let diff = scanner.scan().await?;
            let report = reconciler.reconcile(&diff, policy, options, &cancel).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report_summary(&diff, &report);
            }

            if report.failed() > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_diff_summary(diff: &IntegrityDiff) {
    println!("valid system images:     {}", diff.valid_system_images);
    println!("foreign files (ignored): {}", diff.foreign_files.len());
    println!("potential orphans:       {}", diff.potential_orphans.len());
    println!("dangling records:        {}", diff.dangling_records.len());
    println!("missing thumbnails:      {}", diff.missing_thumbnails.len());
    println!(
        "cross-tenant mismatches: {}",
        diff.cross_tenant_mismatches.len()
    );
    for mismatch in &diff.cross_tenant_mismatches {
        println!(
            "  image {} ({}): {} -> {}",
            mismatch.image_id, mismatch.declared_owner, mismatch.actual_path, mismatch.target_path
        );
    }
    if diff.is_clean() {
        println!("tree and table are in agreement");
    }
}

fn print_report_summary(diff: &IntegrityDiff, report: &ReconcileReport) {
    if report.dry_run {
        println!("dry run: {} action(s) planned", report.planned());
    } else {
        println!(
            "applied: {} succeeded, {} skipped, {} failed{}",
            report.succeeded(),
            report.skipped(),
            report.failed(),
            if report.aborted { " (aborted)" } else { "" }
        );
    }
    for action in &report.actions {
        println!("  {}", serde_json::to_string(action).unwrap_or_default());
    }
    if diff.is_clean() {
        println!("nothing to reconcile");
    }
}
