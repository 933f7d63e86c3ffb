//! Archivist CLI - archive closed tracker issues into the changelog

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use archivist_lib::config::{Config, Environment};
use archivist_lib::document::ChangelogDocument;
use archivist_lib::error::ArchiveError;
use archivist_lib::issue::IssueRecord;
use archivist_lib::platform::{
    self, GitService, GithubClient, GitlabClient, Platform, gitlab,
};
use archivist_lib::processor::IssueProcessor;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Archive closed tracker issues into the changelog document", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    ///
    /// Pipelines that conditionally skip the archiving step simply omit
    /// this flag; the run then exits successfully without doing anything.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override platform detection: "github" or "gitlab"
    #[arg(short = 'p', long = "platform-type", value_name = "PLATFORM")]
    platform_type: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

fn init_tracing(verbose: u8, json: bool) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "info".to_string(),
            1 => "info,archivist_lib=debug".to_string(),
            _ => "debug,archivist_lib=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(verbose >= 1)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.json);

    let started = Instant::now();
    let code = match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "archiving run failed");
            ExitCode::FAILURE
        }
    };
    info!(elapsed = ?started.elapsed(), "run finished");
    code
}

async fn run(cli: &Cli) -> Result<(), ArchiveError> {
    let Some(config_path) = &cli.config else {
        info!("no configuration path supplied, skipping the archiving step");
        return Ok(());
    };

    if Environment::capture().is_local() {
        info!("no CI environment detected, loading .env");
        dotenvy::dotenv().ok();
    }
    let env = Environment::capture();

    // Non-issue webhooks (e.g. push events on GitLab) trigger the same
    // pipeline; there is nothing for them to archive.
    if !gitlab::is_issue_event_webhook(&env)? {
        return Ok(());
    }

    let platform = Platform::resolve(cli.platform_type.as_deref(), &env)?;
    info!(platform = platform.as_str(), "platform resolved");
    let config = Config::load(config_path, &env)?;

    match platform {
        Platform::Github => {
            run_pipeline(GithubClient::new(&config.token)?, &config, &env).await
        }
        Platform::Gitlab => {
            run_pipeline(GitlabClient::new(&config.token)?, &config, &env).await
        }
    }
}

async fn run_pipeline<S: GitService>(
    service: S,
    config: &Config,
    env: &Environment,
) -> Result<(), ArchiveError> {
    let mut issue = initial_issue(&service, config, env)?;
    let mut document = ChangelogDocument::load(&config.document_path)?;

    let processor = IssueProcessor::new(&service, config);
    let result = processor.run_with_recovery(&mut issue, &mut document).await;

    // The document is written on every exit path; a failure here must not
    // mask the primary error.
    if let Err(save_err) = document.save() {
        warn!(error = %save_err, "failed to write the changelog document");
    }

    let outcome = result?;
    info!(?outcome, issue_id = issue.issue_id, "archiving run complete");
    Ok(())
}

fn initial_issue<S: GitService>(
    service: &S,
    config: &Config,
    env: &Environment,
) -> Result<IssueRecord, ArchiveError> {
    if service.platform() == Platform::Gitlab
        && let Some(payload) = &env.webhook_payload
    {
        return gitlab::issue_from_webhook(payload, &config.repository);
    }
    platform::issue_from_environment(env)
}
