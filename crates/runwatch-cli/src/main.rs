//! Runwatch CLI - submit structure runs and watch them to completion.

use std::collections::HashMap;
use std::io::Write;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use runwatch_client::{Config, HttpTransport, RunEmitter, RunOutcome, RunTransport, Watcher};
use runwatch_core::{RunId, StructureId, Verdict};

/// Runwatch - structure run observation tool
#[derive(Parser)]
#[command(name = "runwatch")]
#[command(about = "CLI for submitting and observing structure runs", long_about = None)]
struct Cli {
    /// Run service base URL (overrides RUNWATCH_BASE_URL)
    #[arg(short, long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a run and stream it to completion
    Run {
        /// Structure id (overrides RUNWATCH_STRUCTURE_ID)
        #[arg(short, long)]
        structure: Option<String>,

        /// Input passed to the hosted program
        input: String,

        /// Consume the live event stream instead of polling
        #[arg(long)]
        stream: bool,

        /// KEY=VALUE environment entries for the hosted program
        #[arg(short, long)]
        env: Vec<String>,
    },

    /// Show the current status of a run
    Status {
        /// Run id
        id: String,
    },

    /// Fetch logs of a finished run
    Logs {
        /// Run id
        id: String,
    },

    /// Report this hosted run as finished (reads RUNWATCH_RUN_ID)
    Emit {
        /// Mark the run failed instead of succeeded
        #[arg(long)]
        failed: bool,

        /// Final output, or the failure detail with --failed
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Keep streamed tokens clean on stdout; RUST_LOG opts into more.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    let transport = HttpTransport::from_config(&config);

    match cli.command {
        Commands::Run {
            structure,
            input,
            stream,
            env,
        } => {
            run(&config, transport, structure, input, stream, &env).await?;
        }
        Commands::Status { id } => {
            status(transport, id).await?;
        }
        Commands::Logs { id } => {
            logs(transport, id).await?;
        }
        Commands::Emit { failed, text } => {
            emit(&config, transport, failed, text).await?;
        }
    }

    Ok(())
}

async fn run(
    config: &Config,
    transport: HttpTransport,
    structure: Option<String>,
    input: String,
    stream: bool,
    env: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let structure_id = match structure.map(StructureId::new).or_else(|| config.structure_id.clone()) {
        Some(id) => id,
        None => return Err("no structure id; pass --structure or set RUNWATCH_STRUCTURE_ID".into()),
    };

    let env = parse_env_entries(env)?;
    let watcher = Watcher::new(transport).with_poll_interval(config.poll_interval);

    let handle = watcher.submit(&structure_id, &env, &[input]).await?;
    eprintln!("Run created: {} ({})", handle.run_id, handle.status);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(token) = rx.recv().await {
            print!("{token}");
            stdout.flush().ok();
        }
    });

    let outcome = if stream {
        watcher.watch_stream(&handle.run_id, tx).await?
    } else {
        watcher.watch(&handle.run_id, tx).await?
    };
    printer.await.ok();
    println!();

    print_outcome(outcome)
}

fn print_outcome(outcome: RunOutcome) -> Result<(), Box<dyn std::error::Error>> {
    for entry in &outcome.logs {
        eprintln!("{:<6}  {}", entry.stream, entry.message);
    }

    match outcome.verdict {
        Verdict::Succeeded(output) => {
            if let Some(output) = output {
                println!("{output}");
            }
            Ok(())
        }
        Verdict::Failed(detail) => Err(format!("run failed: {detail}").into()),
    }
}

async fn status(transport: HttpTransport, id: String) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = transport.get_run(&RunId::new(id)).await?;

    println!("Status: {}", snapshot.status);
    if let Some(output) = snapshot.output {
        println!("Output: {output}");
    }

    Ok(())
}

async fn logs(transport: HttpTransport, id: String) -> Result<(), Box<dyn std::error::Error>> {
    let entries = transport.get_logs(&RunId::new(id)).await?;

    for entry in entries {
        println!("{:<6}  {}", entry.stream, entry.message);
    }

    Ok(())
}

async fn emit(
    config: &Config,
    transport: HttpTransport,
    failed: bool,
    text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let emitter = RunEmitter::from_config(config, transport)?;

    if failed {
        emitter.failed(text).await?;
    } else {
        emitter.succeeded(text).await?;
    }

    Ok(())
}

fn parse_env_entries(entries: &[String]) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let mut env = HashMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(format!("invalid env entry '{entry}'; expected KEY=VALUE").into());
        };
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}
