use anyhow::{Context, Result};
use clap::Parser;
use lockgraph::cli::Cli;
use lockgraph::config::LockgraphConfig;
use lockgraph::decoder_thread::DecoderThread;
use lockgraph::report::{self, ReportOptions};
use lockgraph::session::Session;
use std::fs;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<LockgraphConfig> {
    let base = match &args.config {
        Some(path) => LockgraphConfig::from_toml(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LockgraphConfig::default(),
    };
    Ok(args.apply(base))
}

/// Feed every file through the decoder thread as one batch
fn replay(args: &Cli, session: &Arc<Session>, config: &LockgraphConfig) -> Result<()> {
    session.start_batch()?;
    let worker = DecoderThread::spawn(Arc::clone(session), config.channel_capacity);

    for path in &args.files {
        let buffer = fs::read(path)
            .with_context(|| format!("Failed to read trace file {}", path.display()))?;
        tracing::debug!("Submitting {} ({} bytes)", path.display(), buffer.len());
        worker.submit(buffer)?;
    }

    let finished = worker.finish();
    session.stop_batch();
    let stats = finished.context("Trace replay stopped")?;
    tracing::debug!(
        "Decoded {} buffers, {} bytes",
        stats.buffers,
        stats.bytes
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let session = Arc::new(Session::new(&config));
    replay(&args, &session, &config)?;

    let stats = session.stats();
    if stats.abandoned_buffers > 0 {
        eprintln!(
            "WARNING: {} of {} buffers stopped early on undecodable frames",
            stats.abandoned_buffers, stats.buffers
        );
    }
    if stats.builder.dropped_events > 0 {
        eprintln!(
            "WARNING: {} events referenced unknown threads and were dropped",
            stats.builder.dropped_events
        );
    }

    let options = ReportOptions {
        threads_only: args.threads_only,
    };
    print!("{}", report::render(&session.root_node(), options));
    Ok(())
}
