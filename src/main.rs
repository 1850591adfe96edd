// Entrypoint for the CLI application.
// - Keeps `main` small: resolve configuration, wire the collaborators,
//   hand them to the workflow.
// - All fallible steps report through `anyhow::Result`; this is the
//   single place that decides the process exit code.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use hostup::detect::InferDetector;
use hostup::git::{CredentialProvider, GitCredentialProvider};
use hostup::registry::{RegistryClient, UploadRequest, DEFAULT_API_BASE};
use hostup::storage::HttpStorage;
use hostup::{ConflictPolicy, Phase, UploadWorkflow};

#[derive(Debug, Parser)]
#[command(name = "hostup", version, about = "Upload a file to the hosting service")]
struct Cli {
    /// File to upload
    file: PathBuf,

    /// Repository to upload to, e.g. "tekkub/sandbox". If omitted, the
    /// repo is derived from `git remote origin`.
    repo: Option<String>,

    /// What to do when a file of the same name already exists
    #[arg(long, value_enum, default_value_t = OnConflict::Replace)]
    on_conflict: OnConflict,

    /// Description stored alongside the file entry
    #[arg(long)]
    description: Option<String>,

    /// Base URL of the registry API
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Timeout in seconds for the binary transfer step
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnConflict {
    /// Delete the existing entry, announcing it first
    Replace,
    /// Delete the existing entry silently
    Overwrite,
    /// Abort without touching the remote
    Fail,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Replace => ConflictPolicy::Replace,
            OnConflict::Overwrite => ConflictPolicy::OverwriteSilently,
            OnConflict::Fail => ConflictPolicy::FailOnConflict,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(url) => println!("{}", url),
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    let credentials = GitCredentialProvider;
    let token = credentials
        .token()
        .context("no upload token configured (set `git config hostup.token`)")?;
    let repo = match cli.repo {
        Some(repo) => repo,
        None => credentials
            .default_repo()
            .context("no repo given and none could be derived from the git origin")?,
    };

    let request = UploadRequest::from_path(&cli.file, &InferDetector, cli.description)
        .with_context(|| format!("cannot prepare {} for upload", cli.file.display()))?;

    let registry = RegistryClient::new(&cli.api_base, &token)?;
    let storage = HttpStorage::new(cli.timeout.map(Duration::from_secs))?;

    // A steady-tick spinner renders progress while each step blocks on
    // the network; it never affects the outcome.
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").context("bad spinner template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    let on_phase = |phase: Phase| {
        if phase == Phase::Done {
            spinner.finish_and_clear();
        } else {
            spinner.set_message(phase.message());
        }
    };

    let workflow = UploadWorkflow::new(&registry, &storage, cli.on_conflict.into())
        .with_progress(&on_phase);
    let result = workflow.run(&repo, &request);
    spinner.finish_and_clear();
    Ok(result?)
}
