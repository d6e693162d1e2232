//! Coordinator CLI: train the model from a wordlist, or run a distributed
//! cracking run against a challenge.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use passmill::bullpen::{Bullpen, DispatcherContext, LaunchOptions};
use passmill::classifier::Classifier;
use passmill::enumerator::PreterminalHeap;
use passmill::model::{BaseStructures, Grammar};
use passmill::Error;

#[derive(Parser)]
#[command(
    name = "passmill",
    about = "PCFG password-guess generator and distributed cracker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a wordlist into the three model artifacts.
    Train {
        /// Plaintext corpus, one password per line.
        corpus: PathBuf,
        #[arg(long, default_value = "base_structs.txt")]
        bases: PathBuf,
        #[arg(long, default_value = "prob_grammar.txt")]
        grammar: PathBuf,
        #[arg(long, default_value = "glossary.txt")]
        glossary: PathBuf,
    },
    /// Launch remote workers and crack a challenge.
    Crack {
        /// Worker hosts; repeat a host to start several workers on it.
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Host name remote workers dial back to.
        #[arg(long)]
        advertise: String,
        /// Challenge spec shipped to every worker.
        #[arg(long, default_value = "challenge.json")]
        challenge: PathBuf,
        #[arg(long, default_value = "base_structs.txt")]
        bases: PathBuf,
        #[arg(long, default_value = "prob_grammar.txt")]
        grammar: PathBuf,
        /// Queue server bind address.
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
        /// ssh login user.
        #[arg(long)]
        user: Option<String>,
        /// ssh identity file.
        #[arg(long)]
        identity: Option<String>,
        /// Working directory on the remote hosts.
        #[arg(long)]
        remote_cwd: Option<String>,
        /// Environment file to source before starting the worker.
        #[arg(long)]
        activate: Option<String>,
        /// Worker executable on the remote hosts.
        #[arg(long, default_value = "passmill-worker")]
        worker_bin: String,
        /// Cap on the enumerator frontier size.
        #[arg(long)]
        max_frontier: Option<usize>,
        /// Seconds to wait for workers to report termination.
        #[arg(long, default_value_t = 300)]
        join_timeout: u64,
    },
}

/// Aggregated run statistics, updated by the result-gathering task and
/// printed at the end of the run or on Ctrl-C.
struct RunStats {
    started: Instant,
    result: Option<String>,
    discovery: Option<Duration>,
    queued: Option<Duration>,
    exhausted: Option<Duration>,
    attempts: u64,
    preterminals: u64,
    hosts: usize,
}

impl RunStats {
    fn new(hosts: usize) -> RunStats {
        RunStats {
            started: Instant::now(),
            result: None,
            discovery: None,
            queued: None,
            exhausted: None,
            attempts: 0,
            preterminals: 0,
            hosts,
        }
    }

    fn report(&self) -> String {
        let opt = |d: Option<Duration>| match d {
            Some(d) => format!("{d:?}"),
            None => "N/A".to_string(),
        };
        format!(
            "\nPassmill Report:\n\
             \x20 Result:          {}\n\
             \x20 Runtime:         {:?}\n\
             \x20 Discovery Time:  {}\n\
             \x20 Time to Queue:   {}\n\
             \x20 Exhaustion Time: {}\n\
             \x20 Attempts:        {}\n\
             \x20 Preterminals:    {}\n\
             \x20 Hosts:           {}",
            self.result.as_deref().unwrap_or("N/A"),
            self.started.elapsed(),
            opt(self.discovery),
            opt(self.queued),
            opt(self.exhausted),
            self.attempts,
            self.preterminals,
            self.hosts,
        )
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Train {
            corpus,
            bases,
            grammar,
            glossary,
        } => train(&corpus, &bases, &grammar, &glossary),
        Command::Crack {
            hosts,
            advertise,
            challenge,
            bases,
            grammar,
            bind,
            user,
            identity,
            remote_cwd,
            activate,
            worker_bin,
            max_frontier,
            join_timeout,
        } => {
            let opts = LaunchOptions {
                challenge_path: challenge.display().to_string(),
                worker_bin,
                remote_cwd,
                activate,
                user,
                identity_file: identity,
            };
            crack(
                hosts,
                &advertise,
                &bind,
                &bases,
                &grammar,
                opts,
                max_frontier,
                Duration::from_secs(join_timeout),
            )
            .await
        }
    };
    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}

fn train(corpus: &PathBuf, bases: &PathBuf, grammar: &PathBuf, glossary: &PathBuf) -> Result<(), Error> {
    let classifier = Classifier::classify_file(corpus)?;
    classifier.write_artifacts(bases, grammar, glossary)?;
    info!(
        passwords = classifier.classified(),
        skipped = classifier.skipped(),
        "artifacts written"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn crack(
    hosts: Vec<String>,
    advertise: &str,
    bind: &str,
    bases_path: &PathBuf,
    grammar_path: &PathBuf,
    opts: LaunchOptions,
    max_frontier: Option<usize>,
    join_timeout: Duration,
) -> Result<(), Error> {
    let bases = BaseStructures::from_file(bases_path)?;
    let grammar = Grammar::from_file(grammar_path)?;
    let stats = Arc::new(Mutex::new(RunStats::new(hosts.len())));

    let ctx = DispatcherContext::bootstrap(bind, advertise).await?;
    let mut bullpen = Bullpen::new(&ctx, hosts, opts).await?;
    bullpen.launch_workers().await?;

    // Ctrl-C prints the report and exits; remote workers drain their TERMs
    // or notice the server is gone.
    {
        let stats = stats.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                if let Ok(stats) = stats.lock() {
                    println!("{}", stats.report());
                }
                std::process::exit(0);
            }
        });
    }

    // Gather results on a separate task so feeding never blocks on a slow
    // worker.
    let mut feed = bullpen.result_feed().await?;
    {
        let stats = stats.clone();
        tokio::spawn(async move {
            loop {
                match feed.next_result().await {
                    Ok(result) => {
                        let Ok(mut stats) = stats.lock() else { return };
                        stats.preterminals += 1;
                        stats.attempts += result.attempts;
                        if let Some(solution) = result.solution {
                            println!("MATCH: {solution}");
                            let elapsed = stats.started.elapsed();
                            stats.discovery.get_or_insert(elapsed);
                            stats.result = Some(solution);
                        }
                    }
                    // The queue server is gone; nothing more will arrive.
                    Err(_) => return,
                }
            }
        });
    }

    let mut heap = PreterminalHeap::new(&bases, &grammar);
    if let Some(cap) = max_frontier {
        heap = heap.with_max_frontier(cap);
    }
    let mut enqueued = 0u64;
    for preterminal in heap {
        bullpen.enqueue(&preterminal.text).await?;
        enqueued += 1;
    }
    bullpen.kill_workers().await?;
    if let Ok(mut stats) = stats.lock() {
        stats.queued = Some(stats.started.elapsed());
    }
    info!(enqueued, "all tasks queued");

    if let Err(e) = bullpen.join(join_timeout).await {
        warn!("{e}");
    }
    if let Ok(mut stats) = stats.lock() {
        stats.exhausted = Some(stats.started.elapsed());
    }
    ctx.shutdown();

    if let Ok(stats) = stats.lock() {
        println!("{}", stats.report());
    }
    Ok(())
}
