use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AssessmentRunner, ClientError, DraftScope, HttpClient, ReorderCoordinator, ReorderOutcome,
    RemoteSubmission,
};
use shared::{
    domain::{Answers, CandidateId, Job, JobId},
    protocol::{JobsQuery, Page, ReorderRequest, StatusFilter},
};
use storage::{normalize_database_url, Storage};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Work with the hiring API from a terminal")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    /// Where in-progress assessment answers are kept between runs.
    #[arg(long, default_value = "sqlite://./data/console-drafts.db")]
    drafts: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of the jobs board.
    Jobs {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "all")]
        status: String,
        /// Comma separated; a job must carry all of them.
        #[arg(long)]
        tags: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Move a job from one board position to another.
    Reorder { job_id: String, from: i64, to: i64 },
    /// Answer a job's assessment from a JSON file and submit it.
    TakeAssessment {
        job_id: String,
        candidate_id: String,
        answers: PathBuf,
        /// Validate and save the draft without submitting.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let client = HttpClient::new(&args.server_url)?;

    match args.command {
        Command::Jobs {
            search,
            status,
            tags,
            page,
            page_size,
        } => {
            let query = JobsQuery {
                search,
                status: parse_status(&status)?,
                tags,
                page: Some(page),
                page_size,
                ..JobsQuery::default()
            };
            print_board(&client.list_jobs(&query).await?);
        }
        Command::Reorder { job_id, from, to } => {
            let board = JobsQuery::default();
            let coordinator = ReorderCoordinator::new(Arc::new(client), board.clone());
            coordinator.load(board.clone()).await?;
            match coordinator
                .reorder(&JobId(job_id), ReorderRequest::new(from, to))
                .await?
            {
                ReorderOutcome::Unchanged => println!("job already at position {to}"),
                ReorderOutcome::Applied => println!("moved position {from} to {to}"),
            }
            if coordinator.is_stale(&board).await {
                warn!("board could not be refreshed; showing last known order");
            }
            if let Some(page) = coordinator.view(&board).await {
                print_board(&page);
            }
        }
        Command::TakeAssessment {
            job_id,
            candidate_id,
            answers,
            dry_run,
        } => {
            let raw = fs::read_to_string(&answers)
                .with_context(|| format!("failed to read {}", answers.display()))?;
            let sheet: Answers = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not an answer map", answers.display()))?;

            let assessment = client.get_assessment(&JobId(job_id)).await?;
            let candidate_id = CandidateId(candidate_id);
            let scope = DraftScope::Response {
                assessment_id: assessment.id.clone(),
                candidate_id: candidate_id.clone(),
            };
            let drafts = Storage::new(&normalize_database_url(&args.drafts)).await?;
            let mut runner = AssessmentRunner::open(assessment, scope, Arc::new(drafts)).await?;
            for (question_id, value) in sheet {
                runner.set_answer(question_id, value).await?;
            }

            println!("{}", runner.assessment().title);
            for question in runner.visible_questions() {
                let answered = if runner.answer(&question.id).is_some() { "x" } else { " " };
                let required = if question.required { "*" } else { "" };
                println!("  [{answered}] {}{required} {}", question.id, question.title);
            }

            if dry_run {
                return Ok(report(
                    runner.validate().map_err(ClientError::Validation),
                    "answers are valid; draft saved",
                ));
            }
            let handler = RemoteSubmission::new(client, candidate_id);
            return Ok(report(runner.submit(&handler).await, "assessment submitted"));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_status(raw: &str) -> Result<StatusFilter> {
    Ok(match raw {
        "all" => StatusFilter::All,
        "active" => StatusFilter::Active,
        "archived" => StatusFilter::Archived,
        other => bail!("unknown status `{other}`; expected all, active or archived"),
    })
}

fn report(result: Result<(), ClientError>, success: &str) -> ExitCode {
    match result {
        Ok(()) => {
            println!("{success}");
            ExitCode::SUCCESS
        }
        Err(ClientError::Validation(errors)) => {
            for (question_id, message) in errors.messages() {
                eprintln!("{question_id}: {message}");
            }
            ExitCode::FAILURE
        }
        Err(ClientError::Api { error, .. }) if !error.fields.is_empty() => {
            for (question_id, message) in &error.fields {
                eprintln!("{question_id}: {message}");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_board(page: &Page<Job>) {
    for job in &page.items {
        println!("{:>3}  {:<8}  {:<32}  {}", job.order, job.status.as_str(), job.title, job.id);
    }
    println!(
        "page {}/{} ({} jobs)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}
