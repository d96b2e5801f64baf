//! Magpie CLI entrypoint for pull request extraction.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use magpie::classify::{BotClassifier, ModuleClassifier};
use magpie::config::MagpieConfig;
use magpie::extract::{
    CancelFlag, Extractor, Normalizer, RunMode, RunOptions, RunOutcome, RunSummary,
};
use magpie::github::rate_limit::RateLimitTracker;
use magpie::github::{ExtractError, OctocrabForge, PersonalAccessToken, RepositoryLocator};
use magpie::local::discover_origin;
use magpie::persistence::{CheckpointStore, TableStore, migrate_database};
use magpie::telemetry::StderrJsonlTelemetrySink;
use ortho_config::OrthoConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(outcome) => outcome,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<ExitCode, ExtractError> {
    let config = load_config()?;
    let telemetry = StderrJsonlTelemetrySink;

    let locator = resolve_repository(&config)?;
    let database_path = config.database_path(
        locator.owner().as_str(),
        locator.repository().as_str(),
    );
    ensure_parent_directory(&database_path)?;

    migrate_database(database_path.as_str(), &telemetry)
        .map_err(ExtractError::Storage)?;
    if config.migrate_db {
        write_stdout(&format!("Database ready at {database_path}"))?;
        return Ok(ExitCode::SUCCESS);
    }

    let token = PersonalAccessToken::new(config.resolve_token()?)?;
    let rate_limits = RateLimitTracker::new();
    let gateway = OctocrabForge::for_token(&token, locator.clone(), rate_limits.clone())?;

    let classify = config.load_classify_config()?;
    let normalizer = Normalizer::new(
        ModuleClassifier::new(&classify.modules),
        BotClassifier::new(&classify.bots),
    );

    let store = TableStore::new(database_path.as_str()).map_err(ExtractError::Storage)?;
    let checkpoints =
        CheckpointStore::new(database_path.as_str()).map_err(ExtractError::Storage)?;

    let options = run_options(&config)?;
    let cancel = CancelFlag::new();
    spawn_interrupt_watcher(cancel.clone());

    let extractor = Extractor::new(
        Arc::new(gateway),
        store,
        checkpoints,
        normalizer,
        rate_limits,
        options,
        cancel,
        locator.full_name(),
    );

    let summary = extractor.run(&telemetry).await?;
    write_summary(&summary, &database_path)?;

    Ok(match summary.outcome {
        RunOutcome::Completed | RunOutcome::Cancelled => ExitCode::SUCCESS,
        RunOutcome::Failed(_) => ExitCode::FAILURE,
    })
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`ExtractError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<MagpieConfig, ExtractError> {
    MagpieConfig::load().map_err(|error| ExtractError::Configuration {
        message: error.to_string(),
    })
}

/// Resolves the target repository from configuration, falling back to the
/// `origin` remote of the enclosing git repository.
fn resolve_repository(config: &MagpieConfig) -> Result<RepositoryLocator, ExtractError> {
    if let Some((owner, repo)) = config.repository_override() {
        return RepositoryLocator::from_owner_repo(owner, repo);
    }

    let current_dir = std::env::current_dir().map_err(|error| ExtractError::Io {
        message: error.to_string(),
    })?;
    let origin = discover_origin(&current_dir).map_err(|error| ExtractError::Configuration {
        message: format!(
            "{error}; set --owner and --repo, or run inside a repository with a GitHub origin"
        ),
    })?;
    tracing::info!(
        owner = origin.owner(),
        repository = origin.repository(),
        "discovered repository from git origin"
    );
    RepositoryLocator::from_github_origin(&origin)
}

fn run_options(config: &MagpieConfig) -> Result<RunOptions, ExtractError> {
    let start_date = config.resolve_start_date()?;
    let mode = if config.full || config.since.is_some() {
        RunMode::Full
    } else {
        RunMode::Incremental
    };

    Ok(RunOptions {
        mode,
        start_date,
        limit: config.limit,
        refresh_days: config.refresh_days,
        batch_size: config.effective_batch_size(),
        concurrency: config.effective_concurrency(),
    })
}

fn spawn_interrupt_watcher(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping at the next pull request boundary");
            cancel.cancel();
        }
    });
}

fn ensure_parent_directory(path: &camino::Utf8Path) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| ExtractError::Io {
            message: format!("could not create {parent}: {error}"),
        })?;
    }
    Ok(())
}

fn write_summary(summary: &RunSummary, database_path: &camino::Utf8Path) -> Result<(), ExtractError> {
    let status = match &summary.outcome {
        RunOutcome::Completed => "complete".to_owned(),
        RunOutcome::Cancelled => "stopped - progress saved".to_owned(),
        RunOutcome::Failed(message) => format!("failed: {message}"),
    };
    let rows = &summary.rows_written;
    let message = format!(
        "Extraction {status}\n\
         Repository: {repository}\n\
         Processed: {processed} PRs ({skipped} skipped, {failed} failed)\n\
         Rows: {prs} pull_requests, {reviews} reviews, {review_comments} review_comments, \
         {pr_comments} pr_comments, {files} files, {checks} check_runs, \
         {timeline} timeline_events, {users} users\n\
         API requests: {requests} (rate-limit wait: {wait}s)\n\
         Database: {database_path}",
        repository = summary.repository,
        processed = summary.prs_processed,
        skipped = summary.prs_skipped,
        failed = summary.prs_failed,
        prs = rows.pull_requests,
        reviews = rows.reviews,
        review_comments = rows.review_comments,
        pr_comments = rows.pr_comments,
        files = rows.files,
        checks = rows.check_runs,
        timeline = rows.timeline_events,
        users = rows.users,
        requests = summary.api_requests,
        wait = summary.rate_limit_wait.as_secs(),
    );
    if matches!(summary.outcome, RunOutcome::Failed(_)) {
        write_stdout(&format!(
            "{message}\nThe next invocation will resume safely from the last durable checkpoint."
        ))
    } else {
        write_stdout(&message)
    }
}

fn write_stdout(message: &str) -> Result<(), ExtractError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{message}").map_err(|error| ExtractError::Io {
        message: error.to_string(),
    })
}
