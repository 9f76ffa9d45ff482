//! Compost - keep one status comment up to date on a pull request or commit.
//!
//! ## Commands
//!
//! - `github`: act on a GitHub pull request or commit
//! - `gitlab`: act on a GitLab merge request or commit
//! - `autodetect`: detect the CI environment and act on its target
//!
//! Each command takes one of the actions `update`, `new`, `hide-and-new`,
//! `delete-and-new` or `latest`.

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use compost_core::{
    parse_platform, CommentHandler, CompostError, DetectOptions, DetectorRegistry, HandlerRequest,
    PlatformCredentials, PlatformRegistry, ProcessEnv, TargetType, UpdateOutcome, GITHUB, GITLAB,
};
use compost_platforms::register_platforms;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "compost")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Post and maintain tagged status comments on pull requests and commits", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "COMPOST_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Abort the whole operation after this many seconds
    #[arg(long, global = true, env = "COMPOST_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Act on a GitHub pull request or commit
    Github {
        /// Tag identifying this tool's comments
        #[arg(long, env = "COMPOST_TAG")]
        tag: Option<String>,

        /// GitHub REST API URL (default: https://api.github.com)
        #[arg(long, env = "GITHUB_API_URL")]
        github_api_url: Option<String>,

        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        #[command(subcommand)]
        action: TargetAction,
    },

    /// Act on a GitLab merge request or commit
    Gitlab {
        /// Tag identifying this tool's comments
        #[arg(long, env = "COMPOST_TAG")]
        tag: Option<String>,

        /// GitLab server URL (default: https://gitlab.com)
        #[arg(long, env = "CI_SERVER_URL")]
        gitlab_server_url: Option<String>,

        /// GitLab token
        #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
        gitlab_token: Option<String>,

        #[command(subcommand)]
        action: TargetAction,
    },

    /// Detect the CI environment and act on its pull request or commit
    Autodetect {
        /// Tag identifying this tool's comments
        #[arg(long, env = "COMPOST_TAG")]
        tag: Option<String>,

        /// Only consider detectors for this platform (github or gitlab)
        #[arg(long, value_parser = platform_arg)]
        platform: Option<String>,

        /// Only accept this target type (pr or commit)
        #[arg(long)]
        target_type: Option<TargetType>,

        #[command(subcommand)]
        action: DetectedAction,
    },
}

fn platform_arg(s: &str) -> Result<String, CompostError> {
    parse_platform(s).map(str::to_string)
}

/// Where the comment goes.
#[derive(Args, Debug)]
struct TargetArgs {
    /// Repository (owner/repo) or project path (group/project)
    project: String,

    /// pr, mr or commit
    target_type: TargetType,

    /// Pull/merge request number or commit SHA
    target_ref: String,
}

/// The comment body, inline or from a file.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct BodyArgs {
    /// Comment body
    #[arg(long)]
    body: Option<String>,

    /// Read the comment body from a file
    #[arg(long)]
    body_file: Option<PathBuf>,
}

impl BodyArgs {
    fn resolve(self) -> Result<String> {
        match (self.body, self.body_file) {
            (Some(body), _) => Ok(body),
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read body file {}", path.display())),
            (None, None) => bail!("either --body or --body-file is required"),
        }
    }
}

#[derive(Subcommand, Debug)]
enum TargetAction {
    /// Update the latest tagged comment, or post one if none exists
    Update {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Post a new comment without touching existing ones
    New {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Hide all tagged comments, then post a new one
    HideAndNew {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Delete all tagged comments, then post a new one
    DeleteAndNew {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Print the body of the latest tagged comment
    Latest {
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl TargetAction {
    fn into_parts(self) -> Result<(TargetArgs, Operation)> {
        Ok(match self {
            TargetAction::Update { target, body } => (target, Operation::Update(body.resolve()?)),
            TargetAction::New { target, body } => (target, Operation::New(body.resolve()?)),
            TargetAction::HideAndNew { target, body } => {
                (target, Operation::HideAndNew(body.resolve()?))
            }
            TargetAction::DeleteAndNew { target, body } => {
                (target, Operation::DeleteAndNew(body.resolve()?))
            }
            TargetAction::Latest { target } => (target, Operation::Latest),
        })
    }
}

#[derive(Subcommand, Debug)]
enum DetectedAction {
    /// Update the latest tagged comment, or post one if none exists
    Update {
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Post a new comment without touching existing ones
    New {
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Hide all tagged comments, then post a new one
    HideAndNew {
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Delete all tagged comments, then post a new one
    DeleteAndNew {
        #[command(flatten)]
        body: BodyArgs,
    },
    /// Print the body of the latest tagged comment
    Latest,
}

impl DetectedAction {
    fn into_operation(self) -> Result<Operation> {
        Ok(match self {
            DetectedAction::Update { body } => Operation::Update(body.resolve()?),
            DetectedAction::New { body } => Operation::New(body.resolve()?),
            DetectedAction::HideAndNew { body } => Operation::HideAndNew(body.resolve()?),
            DetectedAction::DeleteAndNew { body } => Operation::DeleteAndNew(body.resolve()?),
            DetectedAction::Latest => Operation::Latest,
        })
    }
}

/// A resolved action, body already loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Update(String),
    New(String),
    HideAndNew(String),
    DeleteAndNew(String),
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json, cli.log_level);

    let timeout_secs = cli.timeout_secs;
    tokio::select! {
        result = tokio::time::timeout(Duration::from_secs(timeout_secs), run(cli)) => {
            result.map_err(|_| anyhow!("Timed out after {timeout_secs}s"))?
        }
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut platforms = PlatformRegistry::new();
    register_platforms(&mut platforms);

    let (handler, operation) = build_handler(&platforms, cli.command)?;
    execute(&handler, operation).await
}

fn build_handler(
    platforms: &PlatformRegistry,
    command: Commands,
) -> Result<(CommentHandler, Operation)> {
    match command {
        Commands::Github {
            tag,
            github_api_url,
            github_token,
            action,
        } => {
            let (target, operation) = action.into_parts()?;
            let credentials = PlatformCredentials::new(github_token, github_api_url);
            let handler = explicit_handler(platforms, GITHUB, target, credentials, tag)?;
            Ok((handler, operation))
        }
        Commands::Gitlab {
            tag,
            gitlab_server_url,
            gitlab_token,
            action,
        } => {
            let (target, operation) = action.into_parts()?;
            let credentials = PlatformCredentials::new(gitlab_token, gitlab_server_url);
            let handler = explicit_handler(platforms, GITLAB, target, credentials, tag)?;
            Ok((handler, operation))
        }
        Commands::Autodetect {
            tag,
            platform,
            target_type,
            action,
        } => {
            let operation = action.into_operation()?;
            let detectors = DetectorRegistry::with_defaults(ProcessEnv);
            let detected = detectors
                .detect(&DetectOptions {
                    platform,
                    target_type,
                })
                .context("Failed to detect CI environment")?;
            info!(
                "Detected {} {} {} in {}",
                detected.platform, detected.target_type, detected.target_ref, detected.project
            );

            let platform = platforms
                .create_handler(
                    &detected.platform,
                    detected.target_type,
                    &detected.handler_request(),
                )
                .context("Failed to create platform handler")?;
            Ok((CommentHandler::new(platform, tag.as_deref()), operation))
        }
    }
}

fn explicit_handler(
    platforms: &PlatformRegistry,
    platform: &str,
    target: TargetArgs,
    credentials: PlatformCredentials,
    tag: Option<String>,
) -> Result<CommentHandler> {
    let request = HandlerRequest {
        project: target.project,
        target_ref: target.target_ref,
        credentials,
    };
    let handler = platforms
        .create_handler(platform, target.target_type, &request)
        .context("Failed to create platform handler")?;
    Ok(CommentHandler::new(handler, tag.as_deref()))
}

async fn execute(handler: &CommentHandler, operation: Operation) -> Result<()> {
    match operation {
        Operation::Update(body) => {
            let outcome = handler
                .update_comment(&body)
                .await
                .context("Failed to update comment")?;
            match &outcome {
                UpdateOutcome::Created { reference } => info!("Created {reference}"),
                UpdateOutcome::Updated { reference } => info!("Updated {reference}"),
                UpdateOutcome::Unchanged { reference } => info!("Unchanged {reference}"),
            }
        }
        Operation::New(body) => {
            handler
                .new_comment(&body)
                .await
                .context("Failed to create comment")?;
        }
        Operation::HideAndNew(body) => {
            let outcome = handler
                .hide_and_new_comment(&body)
                .await
                .context("Failed to hide and create comments")?;
            info!(
                "Hid {} comment(s), created {}",
                outcome.hidden, outcome.created
            );
        }
        Operation::DeleteAndNew(body) => {
            let outcome = handler
                .delete_and_new_comment(&body)
                .await
                .context("Failed to delete and create comments")?;
            info!(
                "Deleted {} comment(s), created {}",
                outcome.deleted, outcome.created
            );
        }
        Operation::Latest => {
            let latest = handler
                .latest_matching_comment()
                .await
                .context("Failed to find latest comment")?;
            match latest {
                Some(comment) => println!("{}", comment.body()),
                None => info!("No comment tagged '{}' found", handler.tag()),
            }
        }
    }
    Ok(())
}
