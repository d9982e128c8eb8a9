use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use enrollment_readiness::cache::DepartmentCache;
use enrollment_readiness::config::Config;
use enrollment_readiness::db::{self, PgSnapshotStore};
use enrollment_readiness::format::{format_progress, format_time_spent};
use enrollment_readiness::identity::{HashedPseudonyms, IdentityIndex, PlainIdentity, Pseudonymizer};
use enrollment_readiness::lms::{LmsClient, LmsSource};
use enrollment_readiness::report;
use enrollment_readiness::roster::load_roster;
use enrollment_readiness::snapshot::{compute_snapshot, SnapshotSink};
use enrollment_readiness::sync::EnrollmentSync;

#[derive(Parser)]
#[command(name = "enrollment-readiness")]
#[command(about = "Enrollment progress and exam readiness tracker for pre-licensing students", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the snapshot schema
    InitDb,
    /// List a department's students by engagement status
    Students {
        #[arg(long)]
        department: String,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Generate a markdown readiness report for a department
    Report {
        #[arg(long)]
        department: String,
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Replace names and emails with salted pseudonyms
        #[arg(long)]
        pseudonymize: Option<String>,
    },
    /// Snapshot study metrics for every roster student
    Sync {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long, default_value_t = 90)]
        keep_days: i64,
    },
    /// Show snapshot history for one student
    History {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for snapshot commands")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn lms_client(config: &Config) -> anyhow::Result<LmsClient> {
    LmsClient::new(config.client_settings()).context("failed to build LMS client")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Students { department, limit } => {
            let sync = EnrollmentSync::new(lms_client(&config)?, config.lms_max_concurrency);
            let cache = DepartmentCache::new(sync, config.cache_ttl());
            let entry = cache.get(&department).await?;

            if entry.aggregated.is_empty() {
                println!("No students found in department {department}.");
                return Ok(());
            }

            println!("Students in {department} ({} total):", entry.aggregated.len());
            for summary in entry.aggregated.iter().take(limit) {
                println!(
                    "- {} ({}) {} {} in {}, {} logged",
                    summary.full_name,
                    summary.email,
                    summary.engagement.as_str(),
                    format_progress(summary.progress.overall_progress_pct).display,
                    summary.progress.display_course_name,
                    format_time_spent(summary.progress.total_time_minutes)
                );
            }
        }
        Commands::Report {
            department,
            roster,
            out,
            pseudonymize,
        } => {
            let sync = EnrollmentSync::new(lms_client(&config)?, config.lms_max_concurrency);
            let department_name = match sync.source().department_name(&department).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(department_id = %department, error = %e, "Department name unavailable");
                    "Unknown".to_string()
                }
            };
            let cache = DepartmentCache::new(sync, config.cache_ttl());
            let entry = cache.get(&department).await?;

            let pseudonyms: Box<dyn Pseudonymizer> = match pseudonymize.as_deref() {
                Some(salt) => Box::new(HashedPseudonyms::new(salt)),
                None => Box::new(PlainIdentity),
            };

            let reconciled = match roster {
                Some(path) => {
                    let entries = load_roster(&path)?;
                    let index = IdentityIndex::from_records(entry.raw_records.iter().cloned());
                    Some(index.reconcile(&entries, pseudonyms.as_ref()))
                }
                None => None,
            };

            let report = report::build_report(
                &entry,
                &department_name,
                reconciled.as_deref(),
                Utc::now().date_naive(),
                pseudonyms.as_ref(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Sync { roster, keep_days } => {
            let pool = connect(&config).await?;
            let store = PgSnapshotStore::new(pool);
            let entries = load_roster(&roster)?;

            let sync = Arc::new(EnrollmentSync::new(lms_client(&config)?, config.lms_max_concurrency));
            let interrupt = sync.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling sync");
                    interrupt.shutdown();
                }
            });

            let emails: Vec<String> = entries.iter().map(|e| e.email.clone()).collect();
            let students = sync.load_by_emails(&emails).await?;
            let index = IdentityIndex::from_records(students);

            let today = Utc::now().date_naive();
            let taken_at = Utc::now();
            let snapshots: Vec<_> = entries
                .iter()
                .filter_map(|roster_entry| {
                    let student = index.get(&roster_entry.email)?;
                    Some(compute_snapshot(
                        &roster_entry.email,
                        &student.enrollments,
                        roster_entry.course_type(),
                        roster_entry.days_until_exam(today),
                        taken_at,
                    ))
                })
                .collect();

            let written = store.write_snapshots(&snapshots).await?;
            let pruned = store.prune_older_than(keep_days).await?;
            println!(
                "Saved {written} snapshots for {} roster students ({} unmatched), pruned {pruned}.",
                entries.len(),
                entries.len() - snapshots.len()
            );
        }
        Commands::History { email, limit } => {
            let pool = connect(&config).await?;
            let store = PgSnapshotStore::new(pool);
            let history = store.read_history(&email, limit).await?;

            if history.is_empty() {
                println!("No snapshots recorded for {email}.");
                return Ok(());
            }

            println!("Snapshot history for {email}:");
            for snapshot in history.iter() {
                println!(
                    "- {} {} ({}/4) {} logged, pre-license {:.1}%, {} gaps (largest {} days)",
                    snapshot.taken_at.format("%Y-%m-%d %H:%M"),
                    snapshot.readiness.as_str(),
                    snapshot.criteria_met,
                    format_time_spent(snapshot.total_time_min),
                    snapshot.prelicense_progress,
                    snapshot.study_gap_count,
                    snapshot.largest_gap_days
                );
            }
        }
    }

    Ok(())
}
