//! SelfQuiz CLI - drives the quiz worker and the offline cache from a shell.
//!
//! This binary stands in for the browser host: it feeds quiz files through
//! the background worker and runs the cache lifecycle against the network,
//! keeping cache storage in a snapshot between runs.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use selfquiz_core::cache::ResponseSource;
use selfquiz_core::network::Destination;
use selfquiz_core::worker::reader_stream;
use selfquiz_core::{
    spawn_worker, CacheManager, CacheStorage, Config, HttpFetcher, Request, WorkerRequest,
    WorkerResponse,
};

const USAGE: &str = "\
Usage: selfquiz <command> [options]

Commands:
  validate <file> [--limit-mb N] [--min-choices N]
                     Run a quiz file through the worker, printing each message
  install            Precache static assets and drop stale cache namespaces
  fetch <url> [--navigate | --font]
                     Serve one request through the offline cache
  status             List cache namespaces and entry counts";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode> {
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    };

    let config = Config::load().context("Failed to load config")?;
    debug!(?config, "Config loaded");

    match command.as_str() {
        "validate" => validate(&config, &args[1..]).await,
        "install" => install(&config).await,
        "fetch" => fetch(&config, &args[1..]).await,
        "status" => status(&config).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(ExitCode::SUCCESS)
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

/// Value following `flag`, if the flag is present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match flag_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", flag, raw)),
        None => Ok(None),
    }
}

fn megabytes_to_bytes(megabytes: u64) -> Result<u64> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("--limit-mb {} is too large", megabytes))
}

/// Run a quiz file through the worker, printing each message as a JSON line.
async fn validate(config: &Config, args: &[String]) -> Result<ExitCode> {
    let Some(path) = args.first().filter(|arg| !arg.starts_with("--")) else {
        bail!("validate needs a file path\n\n{}", USAGE);
    };

    let limit = match parse_flag::<u64>(args, "--limit-mb")? {
        Some(megabytes) => Some(megabytes_to_bytes(megabytes)?),
        None => config.size_limit_bytes,
    };
    let mut validation = config.validation_config();
    if let Some(min_choices) = parse_flag::<usize>(args, "--min-choices")? {
        validation.min_choices = min_choices;
    }

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open quiz file: {}", path))?;

    let mut worker = spawn_worker();
    worker
        .send(WorkerRequest::ProcessStream {
            stream: reader_stream(file),
            limit,
            config: validation,
        })
        .await?;

    let mut stdout = io::stdout().lock();
    let mut questions = 0usize;
    let mut failed = false;
    while let Some(message) = worker.recv().await {
        match &message {
            WorkerResponse::Chunk { data } => questions += data.len(),
            WorkerResponse::Error { .. } => failed = true,
            _ => {}
        }
        writeln!(stdout, "{}", serde_json::to_string(&message)?)?;
        if message.is_terminal() {
            break;
        }
    }
    drop(stdout);
    worker.shutdown().await;

    if failed {
        Ok(ExitCode::FAILURE)
    } else {
        eprintln!("{} questions valid", questions);
        Ok(ExitCode::SUCCESS)
    }
}

async fn open_manager(config: &Config) -> Result<(CacheManager<HttpFetcher>, PathBuf)> {
    let snapshot = config.snapshot_path()?;
    let storage = CacheStorage::load(&snapshot).await?;
    let fetcher = HttpFetcher::new()?;
    let manager = CacheManager::new(config, Arc::new(storage), Arc::new(fetcher))?;
    Ok((manager, snapshot))
}

/// Install and activate: precache the manifest, then drop stale namespaces.
async fn install(config: &Config) -> Result<ExitCode> {
    let (manager, snapshot) = open_manager(config).await?;

    let count = manager.install().await?;
    let deleted = manager.activate().await;
    manager.storage().save(&snapshot).await?;

    info!(count, deleted = deleted.len(), "Install complete");
    eprintln!("Precached {} assets into {}", count, config.static_cache);
    for name in deleted {
        eprintln!("Deleted stale cache {}", name);
    }
    Ok(ExitCode::SUCCESS)
}

/// Serve one request through the cache and print the response body.
async fn fetch(config: &Config, args: &[String]) -> Result<ExitCode> {
    let Some(url) = args.first().filter(|arg| !arg.starts_with("--")) else {
        bail!("fetch needs a URL\n\n{}", USAGE);
    };

    let request = if args.iter().any(|arg| arg == "--navigate") {
        Request::navigate(url.as_str())
    } else if args.iter().any(|arg| arg == "--font") {
        Request::get(url.as_str()).with_destination(Destination::Font)
    } else {
        Request::get(url.as_str())
    };

    let (manager, snapshot) = open_manager(config).await?;
    let intercepted = manager.intercept(request).await?;
    let source = intercepted.source;
    let response = intercepted.settled().await;
    manager.storage().save(&snapshot).await?;

    let label = match source {
        ResponseSource::Cache => "cache",
        ResponseSource::Network => "network",
    };
    eprintln!("{} {} ({} bytes, from {})", response.status, response.url, response.body.len(), label);
    io::stdout().write_all(&response.body)?;

    if response.status == 200 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn status(config: &Config) -> Result<ExitCode> {
    let snapshot = config.snapshot_path()?;
    let storage = CacheStorage::load(&snapshot).await?;
    let namespaces = storage.status().await;

    if namespaces.is_empty() {
        println!("No caches at {}", snapshot.display());
        return Ok(ExitCode::SUCCESS);
    }

    let allowed = config.allowed_caches();
    for namespace in namespaces {
        let marker = if allowed.contains(&namespace.name.as_str()) { " " } else { "*" };
        println!(
            "{}{:<28} {:>4} entries  newest {}",
            marker,
            namespace.name,
            namespace.entries,
            namespace.newest.as_deref().unwrap_or("never"),
        );
    }
    Ok(ExitCode::SUCCESS)
}
