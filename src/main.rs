mod branch;
mod config;
mod github;
mod manifest;
mod publish;
mod registry;
mod run;
mod sync;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use config::Inputs;
use github::GitHubClient;

/// mod-publisher — submits a mod release to a shared community mod
/// registry: syncs the caller's fork, updates the registry document on a
/// per-mod branch, and opens or updates the pull request.
#[derive(Parser, Debug)]
#[command(name = "mod-publisher", version, about)]
struct Cli {
    /// Path to the mod manifest JSON
    #[arg(long, default_value = "mod.json")]
    manifest: PathBuf,

    /// Tag of the release that triggered this run
    #[arg(long)]
    release_tag: String,

    /// File name of the released artifact the download link points at
    #[arg(long)]
    artifact: String,

    /// Display name for the packaged artifact, shown in the pull request
    #[arg(long)]
    display_name: Option<String>,

    /// Explicit cover image URL (otherwise a local cover.png is required)
    #[arg(long)]
    cover_url: Option<String>,

    /// Explicit author icon URL (otherwise the submitter's avatar is used)
    #[arg(long)]
    author_icon_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(message) = execute().await {
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(1);
    }
}

/// Assemble the run context and drive the submission; every failure comes
/// back as the single message reported to the caller.
async fn execute() -> Result<(), String> {
    let cli = Cli::parse();

    info!(manifest = %cli.manifest.display(), "loading configuration");
    let config = config::Config::load().map_err(|e| e.to_string())?;
    let repo_ctx = config::RepoContext::from_env().map_err(|e| e.to_string())?;
    let caller_token = config.caller_token().map_err(|e| e.to_string())?;
    let registry_token = config.registry_token().map_err(|e| e.to_string())?;

    info!("loading manifest");
    let manifest = manifest::Manifest::load(&cli.manifest).map_err(|e| e.to_string())?;
    let _span = info_span!("mod_publish", id = %manifest.id, version = %manifest.version).entered();

    let ctx = run::RunContext {
        config,
        inputs: Inputs {
            manifest_path: cli.manifest,
            release_tag: cli.release_tag,
            artifact: cli.artifact,
            display_name: cli.display_name,
            cover_url: cli.cover_url,
            author_icon_url: cli.author_icon_url,
        },
        repo_ctx,
        manifest,
        reader: Box::new(GitHubClient::new(caller_token)),
        writer: Box::new(GitHubClient::new(registry_token)),
        notices: Vec::new(),
    };

    let report = run::run(ctx).await.map_err(|e| e.to_string())?;

    let verb = if report.commented {
        "updated pull request"
    } else {
        "opened pull request"
    };
    println!(
        "{} {} {}",
        "ok:".green().bold(),
        verb,
        report.pull_request.html_url
    );
    Ok(())
}
