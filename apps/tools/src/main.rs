use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::protocol::ReorderRequest;
use storage::{normalize_database_url, DataSnapshot, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod seed;

#[derive(Parser, Debug)]
#[command(about = "Admin tasks against the hiring database")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/hiring.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill an empty database with demo jobs, candidates and assessments.
    Seed {
        #[arg(long, default_value_t = 1000)]
        candidates: usize,
    },
    ListJobs,
    /// Move the job at position FROM to position TO.
    Reorder { from: i64, to: i64 },
    /// Write every table as one JSON document.
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    Import {
        file: PathBuf,
        /// Wipe the database before importing.
        #[arg(long)]
        replace: bool,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&normalize_database_url(&cli.database_url)).await?;

    match cli.command {
        Command::Seed { candidates } => {
            let summary = seed::seed(&storage, candidates).await?;
            println!(
                "seeded jobs={} candidates={} assessments={}",
                summary.jobs, summary.candidates, summary.assessments
            );
        }
        Command::ListJobs => {
            for job in storage.list_jobs().await? {
                let tags: Vec<_> = job.tags.iter().map(String::as_str).collect();
                println!(
                    "{:>3}  {:<8}  {:<32}  {}  [{}]",
                    job.order,
                    job.status.as_str(),
                    job.slug,
                    job.id,
                    tags.join(", ")
                );
            }
        }
        Command::Reorder { from, to } => {
            storage.reorder_jobs(ReorderRequest::new(from, to)).await?;
            println!("moved position {from} to {to}");
        }
        Command::Export { output } => {
            let snapshot = storage.export_snapshot().await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), jobs = snapshot.jobs.len(), "exported snapshot");
                }
                None => println!("{json}"),
            }
        }
        Command::Import { file, replace } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let snapshot: DataSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a valid snapshot", file.display()))?;
            if snapshot.is_empty() {
                bail!("{} holds no records", file.display());
            }
            if replace {
                storage.clear_all().await?;
            }
            storage.import_snapshot(&snapshot).await?;
            println!(
                "imported jobs={} candidates={} assessments={}",
                snapshot.jobs.len(),
                snapshot.candidates.len(),
                snapshot.assessments.len()
            );
        }
        Command::Clear => {
            storage.clear_all().await?;
            println!("cleared all tables");
        }
    }

    Ok(())
}
