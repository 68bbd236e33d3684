//! # CLI Commands
//!
//! `init`, `serve`, `status` and `export`. Every global option can also be
//! set through its `ACCEPTANCE_*` environment variable.
//!
//! `status` and `export` are read-only: they evaluate the stored records
//! without persisting stage markers.

use crate::api;
use crate::config::{AppConfig, DEFAULT_BIND, DEFAULT_DB_PATH, DEFAULT_LOG_FILTER};
use crate::error::{AppError, AppResult};
use acceptance_core::stage::evaluate;
use acceptance_core::{
    AcceptanceError, AcceptanceStage, AcceptanceStore, CertificationGate, EngagementId, RedbStore,
    StageReport, WorkflowSnapshot,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// ARGUMENTS
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "acceptance", version, about = "Engagement acceptance workflow")]
pub struct Cli {
    /// Database file.
    #[arg(long, global = true, env = "ACCEPTANCE_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Address the HTTP server binds to.
    #[arg(long, global = true, env = "ACCEPTANCE_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, env = "ACCEPTANCE_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log: String,

    /// Which declarations may be certified: `raw-flags` or `derived`.
    #[arg(
        long,
        global = true,
        env = "ACCEPTANCE_CERTIFICATION_GATE",
        default_value = "raw-flags"
    )]
    pub certification_gate: CertificationGate,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty database.
    Init {
        /// Replace an existing database.
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP server.
    Serve,
    /// Print the stage report of an engagement.
    Status {
        engagement: String,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Write every record of an engagement, plus its report, to a JSON file.
    Export { engagement: String, output: PathBuf },
}

impl Cli {
    #[must_use]
    pub fn config(&self) -> AppConfig {
        AppConfig {
            db_path: self.db.clone(),
            bind: self.bind,
            log_filter: self.log.clone(),
            certification_gate: self.certification_gate,
        }
    }
}

/// Contents of an export file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub engagement_id: EngagementId,
    pub report: StageReport,
    pub records: WorkflowSnapshot,
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create the database. Refuses to overwrite without `force`.
pub fn cmd_init(db_path: &Path, force: bool) -> AppResult<()> {
    if db_path.exists() {
        if !force {
            return Err(AppError::Config(format!(
                "database already exists at {} (use --force to replace it)",
                db_path.display()
            )));
        }
        std::fs::remove_file(db_path)?;
    }

    RedbStore::open(db_path)?;
    info!(db = %db_path.display(), "database initialised");
    println!("Initialised acceptance database at {}", db_path.display());
    Ok(())
}

/// Open an existing database without creating one.
pub fn open_existing(db_path: &Path) -> AppResult<RedbStore> {
    if !db_path.exists() {
        return Err(AppError::Config(format!(
            "no database at {} (run `acceptance init` first)",
            db_path.display()
        )));
    }
    Ok(RedbStore::open(db_path)?)
}

fn load_known(store: &RedbStore, engagement: &EngagementId) -> AppResult<WorkflowSnapshot> {
    engagement.validate()?;
    if !store.list_engagements()?.contains(engagement) {
        return Err(AcceptanceError::NotFound {
            kind: "engagement",
            id: engagement.to_string(),
        }
        .into());
    }
    Ok(WorkflowSnapshot::load(store, engagement)?)
}

/// Evaluate and print the stage report.
pub fn cmd_status(db_path: &Path, engagement: &str, json: bool) -> AppResult<StageReport> {
    let store = open_existing(db_path)?;
    let engagement = EngagementId::new(engagement);
    let report = evaluate(&load_known(&store, &engagement)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report)
}

/// Write the engagement's records and report as pretty JSON.
pub fn cmd_export(db_path: &Path, engagement: &str, output: &Path) -> AppResult<ExportDocument> {
    let store = open_existing(db_path)?;
    let engagement = EngagementId::new(engagement);
    let records = load_known(&store, &engagement)?;

    let document = ExportDocument {
        engagement_id: engagement,
        report: evaluate(&records),
        records,
    };
    std::fs::write(output, serde_json::to_vec_pretty(&document)?)?;

    info!(
        engagement = %document.engagement_id,
        output = %output.display(),
        "engagement exported"
    );
    println!("Exported {} to {}", document.engagement_id, output.display());
    Ok(document)
}

/// Plain-text rendering of a report.
#[must_use]
pub fn render_report(report: &StageReport) -> String {
    let mut out = format!(
        "Engagement {}  {}% complete\n",
        report.engagement_id, report.progress_percent
    );
    for stage in AcceptanceStage::ALL {
        let status = report.status(stage);
        let mark = if status.complete {
            "done"
        } else if status.current {
            "current"
        } else if !status.required {
            "not required"
        } else {
            "locked"
        };
        out.push_str(&format!("  {}. {:<22} {}\n", stage.index() + 1, stage.label(), mark));
    }
    match report.completed_at {
        Some(at) => out.push_str(&format!("Accepted at {}\n", at)),
        None if report.blockers.is_empty() => out.push_str("Ready to complete\n"),
        None => {
            out.push_str("Blockers:\n");
            for blocker in &report.blockers {
                out.push_str(&format!("  - {}\n", blocker));
            }
        }
    }
    out
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> AppResult<()> {
    let config = cli.config();
    match cli.command {
        Command::Init { force } => cmd_init(&config.db_path, force),
        Command::Serve => api::serve(&config).await,
        Command::Status { engagement, json } => {
            cmd_status(&config.db_path, &engagement, json).map(|_| ())
        }
        Command::Export { engagement, output } => {
            cmd_export(&config.db_path, &engagement, &output).map(|_| ())
        }
    }
}
