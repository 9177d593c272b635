//! Unison - play one audio stream on many networked devices in unison.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unison_coordinator::{ws, CoordinatorBuilder};
use unison_core::config::{DEFAULT_CHUNK_BYTES, DEFAULT_START_LEAD};

/// Command-line arguments
struct Args {
    host: String,
    port: u16,
    media_root: Option<PathBuf>,
    chunk_bytes: usize,
    start_lead: Duration,
    /// Synthesize a test tone for missing sources
    test_tone: bool,
    debug: bool,
    /// Also write logs to this file
    log_file: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            media_root: None,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            start_lead: DEFAULT_START_LEAD,
            test_tone: false,
            debug: false,
            log_file: None,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--host" => args.host = value(&mut iter, &arg)?,
            "--port" | "-p" => {
                args.port = value(&mut iter, &arg)?
                    .parse()
                    .context("--port expects a port number")?;
            }
            "--media-root" | "-m" => args.media_root = Some(PathBuf::from(value(&mut iter, &arg)?)),
            "--chunk-bytes" => {
                args.chunk_bytes = value(&mut iter, &arg)?
                    .parse()
                    .context("--chunk-bytes expects a byte count")?;
            }
            "--start-lead-ms" => {
                let millis: u64 = value(&mut iter, &arg)?
                    .parse()
                    .context("--start-lead-ms expects milliseconds")?;
                args.start_lead = Duration::from_millis(millis);
            }
            "--test-tone" => args.test_tone = true,
            "--debug" | "-d" => args.debug = true,
            "--log-file" | "-l" => args.log_file = Some(PathBuf::from(value(&mut iter, &arg)?)),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    Ok(args)
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    match iter.next() {
        Some(v) => Ok(v),
        None => bail!("{} expects a value", flag),
    }
}

fn print_help() {
    println!("Unison - synchronized multi-device audio streaming");
    println!();
    println!("Usage: unison [OPTIONS]");
    println!();
    println!("Options:");
    println!("      --host ADDR          Address to bind (default: 0.0.0.0)");
    println!("  -p, --port PORT          Port to listen on (default: 8080)");
    println!("  -m, --media-root DIR     Directory audio files are served from (default: .)");
    println!("      --chunk-bytes N      Bytes of audio per chunk (default: {})", DEFAULT_CHUNK_BYTES);
    println!(
        "      --start-lead-ms MS   Lead before the synchronized start (default: {})",
        DEFAULT_START_LEAD.as_millis()
    );
    println!("      --test-tone          Stream a test tone when a file is missing");
    println!("  -d, --debug              Enable debug logging");
    println!("  -l, --log-file PATH      Also write logs to PATH");
    println!("  -h, --help               Show this help message");
    println!();
    println!("RUST_LOG overrides the log filter unless --debug is given.");
}

fn setup_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let Some(path) = &args.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
        return Ok(None);
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Logging to {:?}", path);
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Setup logging before anything else
    let _guard = setup_logging(&args)?;

    info!("Starting Unison coordinator");

    let mut builder = CoordinatorBuilder::new()
        .chunk_bytes(args.chunk_bytes)
        .start_lead(args.start_lead)
        .test_tone_fallback(args.test_tone);
    if let Some(root) = &args.media_root {
        builder = builder.media_root(root.clone());
    }
    let coordinator = builder.build().context("invalid configuration")?;
    coordinator.spawn_maintenance();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    let on_signal = coordinator.clone();
    ws::serve(listener, coordinator, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        // Devices hear stop_streaming while their sockets are still open
        on_signal.shutdown().await;
    })
    .await?;

    info!("Unison exiting");

    Ok(())
}
