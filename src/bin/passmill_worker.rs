//! Remote worker entry point, started on each host by the dispatcher's
//! bootstrap script. The shared secret arrives in `BULLPEN_AUTHKEY`; the
//! positional arguments mirror the script exactly.

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use passmill::bullpen::AUTHKEY_ENV;
use passmill::challenge::ChallengeSpec;
use passmill::model::Glossary;
use passmill::worker::run_worker;
use passmill::Error;

#[derive(Parser)]
#[command(
    name = "passmill-worker",
    about = "Queue-fed cracking worker for a passmill run",
    version
)]
struct Cli {
    /// Challenge spec describing the hash target and mangling rules.
    challenge: PathBuf,
    /// Queue server host.
    host: String,
    /// Queue server port.
    port: u16,
    /// Queue id of this run.
    queue_id: String,
    /// Label used in status messages, typically this host's name.
    #[arg(long, default_value = "worker")]
    label: String,
    /// Glossary artifact used to fill letter slots.
    #[arg(long, default_value = "glossary.txt")]
    glossary: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Ok(authkey) = std::env::var(AUTHKEY_ENV) else {
        error!("{AUTHKEY_ENV} is not set");
        std::process::exit(1);
    };

    if let Err(e) = run(cli, &authkey).await {
        // A dropped queue connection is an orderly end from the worker's
        // side; the coordinator's join timeout covers the missing TERM.
        debug!("worker exiting: {e}");
    }
}

async fn run(cli: Cli, authkey: &str) -> Result<(), Error> {
    let spec = ChallengeSpec::from_file(&cli.challenge)?;
    let glossary = Glossary::from_file(&cli.glossary)?;
    let engine = spec.engine()?;
    let check = spec.checker()?;
    run_worker(
        (cli.host.as_str(), cli.port),
        authkey,
        &cli.queue_id,
        &cli.label,
        &glossary,
        &engine,
        &check,
    )
    .await
}
