use prcheck::analyze::processor::ProcessorFactory;
use prcheck::config::WorkerConfig;
use prcheck::queue::{self, Registry, TaskMessage, Worker};
use prcheck::util::logging::{self, LoggingConfig};
use prcheck::VERSION;

use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "prcheck-worker", version, about = "Pull request analysis worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume analysis tasks (JSON lines on stdin) until the stream closes
    Worker {
        /// Number of concurrent consumers
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_logging_from_args(&args);

    debug!("prcheck-worker v{} starting", VERSION);

    let exit_code = match &args.command {
        Commands::Worker { concurrency } => handle_worker(*concurrency).await,
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &Cli) {
    if let Some(level_str) = &args.log_level {
        logging::init_logging(LoggingConfig::with_level(logging::parse_level(level_str)));
    } else if args.verbose {
        logging::init_logging(LoggingConfig::with_level(Level::DEBUG));
    } else if args.quiet {
        logging::init_logging(LoggingConfig::with_level(Level::ERROR));
    } else {
        logging::init_from_env();
    }
}

async fn handle_worker(concurrency: Option<usize>) -> i32 {
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            eprintln!("Error: invalid configuration: {e}");
            return 1;
        }
    };
    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        eprintln!("Error: invalid configuration: {e}");
        return 1;
    }

    let concurrency = concurrency.unwrap_or(config.concurrency);
    let factory = Arc::new(ProcessorFactory::new(config));

    let mut registry = Registry::new();
    queue::register_tasks(&mut registry, factory);
    info!(tasks = ?registry.task_names(), "registered task handlers");

    let (tx, transport) = queue::channel(64);

    // Bridge: line-delimited TaskMessage JSON on stdin feeds the consumers.
    let feeder = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TaskMessage>(&line) {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping undecodable task line"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "can't read task stream");
                    break;
                }
            }
        }
    });

    let worker = Worker::new(Arc::new(transport), Arc::new(registry), concurrency);
    let run = worker.launch().await;
    let _ = feeder.await;

    match run {
        Ok(()) => {
            info!("task stream closed, shutting down");
            0
        }
        Err(e) => {
            error!("worker failed: {e:#}");
            1
        }
    }
}
