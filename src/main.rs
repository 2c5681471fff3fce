use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod archive;
mod auth;
mod batch;
mod chart;
mod config;
mod db;
mod delivery;
mod document;
mod error;
mod export;
mod logging;
mod models;
mod report;
mod risk;
mod server;
mod source;
mod staging;

use crate::config::{DatabaseArgs, ReportArgs, ServeArgs};
use crate::models::QuestionData;
use crate::report::ReportService;
use crate::staging::StagingRoot;

#[derive(Parser)]
#[command(name = "idcra-reports")]
#[command(about = "Dental caries risk reports for IDCRA school surveys", long_about = None)]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    reports: ReportArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the report endpoints over HTTP
    Serve(ServeArgs),
    /// Write one student's report document
    StudentReport {
        #[arg(long)]
        survey_id: Uuid,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate every student document of a school into one archive
    SchoolBundle {
        #[arg(long)]
        school_id: Uuid,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export a school's survey answers as CSV and XLSX
    Export {
        #[arg(long)]
        school_id: Uuid,
        /// JSON file of the form `{"questions": [...]}` with the 16 question labels
        #[arg(long)]
        questions: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List a report archive, or extract it when a destination is given
    Unpack {
        #[arg(long)]
        archive: PathBuf,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Summarize treatment costs for a school
    Costs {
        #[arg(long)]
        school_id: Uuid,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("idcra_reports=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // archives are local files, no database needed
    if let Commands::Unpack { archive, dest } = &cli.command {
        return unpack(archive, dest.as_deref());
    }

    let database_url = cli
        .database
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let pool = db::connect(database_url, cli.database.max_connections).await?;
    let reports = ReportService::new(
        Arc::new(db::PgSurveySource::new(pool)),
        StagingRoot::new(&cli.reports.staging_dir),
        cli.reports.workers(),
        &risk::INDONESIAN,
    );

    match cli.command {
        Commands::Serve(args) => {
            let app = server::build_app(server::AppState {
                reports,
                jwt: auth::JwtSecret::new(args.jwt_secret),
            });
            let listener = tokio::net::TcpListener::bind(args.listen)
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?;
            tracing::info!(
                addr = %args.listen,
                workers = cli.reports.workers(),
                "report server listening"
            );
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    signal::ctrl_c().await.ok();
                })
                .await
                .context("report server failed")?;
        }
        Commands::StudentReport { survey_id, out } => {
            let artifact = reports
                .student_document(survey_id)
                .await
                .with_context(|| format!("failed to build report for survey {survey_id}"))?;
            let out = out.unwrap_or_else(|| PathBuf::from(&artifact.file_name));
            std::fs::write(&out, &artifact.bytes)?;
            println!(
                "Report ({} risk) written to {}.",
                artifact.tier,
                out.display()
            );
        }
        Commands::SchoolBundle { school_id, out } => {
            let bundle = reports
                .school_bundle(school_id)
                .await
                .with_context(|| format!("failed to build bundle for school {school_id}"))?;
            for result in &bundle.outcome.results {
                if let batch::ArtifactStatus::Failed { error } = &result.status {
                    println!("- skipped {}: {}", result.plan.entry.student_name, error);
                }
            }
            let succeeded = bundle.outcome.succeeded();
            let total = bundle.outcome.results.len();
            let out = out.unwrap_or_else(|| PathBuf::from(&bundle.archive.file_name));
            delivery::save_archive(bundle.archive, &out).await?;
            println!(
                "Bundle with {succeeded} of {total} documents written to {}.",
                out.display()
            );
        }
        Commands::Export {
            school_id,
            questions,
            out,
        } => {
            let raw = std::fs::read(&questions)
                .with_context(|| format!("failed to read {}", questions.display()))?;
            let data: QuestionData = serde_json::from_slice(&raw).with_context(|| {
                format!("{} must hold {{\"questions\": [...]}}", questions.display())
            })?;
            let receipt = reports.export_school(school_id, data.questions).await?;
            let archive = reports.open_export(school_id).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(&archive.file_name));
            delivery::save_archive(archive, &out).await?;
            println!(
                "Exported {} survey rows for {} to {}.",
                receipt.rows,
                receipt.school.name,
                out.display()
            );
        }
        // handled before connecting
        Commands::Unpack { .. } => {}
        Commands::Costs {
            school_id,
            start,
            end,
            out,
        } => {
            let school = reports.school(school_id).await?;
            let lines = reports.cost_breakdown(school_id, start, end).await?;
            let summary = report::build_cost_report(&school.name, start, end, &lines);
            match out {
                Some(out) => {
                    std::fs::write(&out, summary)?;
                    println!("Cost report written to {}.", out.display());
                }
                None => print!("{summary}"),
            }
        }
    }

    Ok(())
}

fn unpack(archive: &Path, dest: Option<&Path>) -> anyhow::Result<()> {
    match dest {
        Some(dest) => {
            let written = archive::unpack(archive, dest)
                .with_context(|| format!("failed to extract {}", archive.display()))?;
            println!("Extracted {} files to {}.", written.len(), dest.display());
        }
        None => {
            let names = archive::entry_names(archive)
                .with_context(|| format!("failed to read {}", archive.display()))?;
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(())
}
