use clap::Parser;

use floodwatch::cli::Cli;
use floodwatch::config::{Config, ConfigError};
use floodwatch::display;
use floodwatch::feed;
use floodwatch::ml::{self, MlBridge};
use floodwatch::pcap;
use floodwatch::session::CaptureSession;

fn main() {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if args.input.is_none() && args.events.is_none() {
        eprintln!("error: nothing to inspect (pass a capture file and/or --events)");
        std::process::exit(1);
    }

    if let Err(err) = run(&args, &config) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(args: &Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = CaptureSession::new(config.detection.clone());
    let mut flood_seen = false;

    if let Some(path) = &args.input {
        let bytes = std::fs::read(path)?;
        let summary = session.ingest_capture(&bytes)?;
        flood_seen |= summary.flood;
        tracing::info!(
            appended = summary.appended,
            duplicates = summary.duplicates,
            flood = summary.flood,
            "capture file ingested"
        );
    }

    if let Some(path) = &args.events {
        flood_seen |= ingest_events(path, &mut session)?;
    }

    tracing::info!("session totals: {}", session.stats());

    if args.ml && !session.is_empty() {
        let bridge = MlBridge::new(&config.classifier);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let outcome = runtime.block_on(bridge.classify(session.records(), None));
        if let Some(reason) = outcome.unavailable_reason() {
            eprintln!("notice: {} (local heuristics applied)", reason);
        }
        let response = outcome.response();
        session.apply_classification(response);
        println!(
            "ML pass: {} analyzed, {} malicious, {} benign",
            response.summary.total, response.summary.malicious, response.summary.benign
        );
    }

    if !args.quiet {
        for record in session.records() {
            display::print_record_summary(record);
        }
    }

    display::print_session_summary(session.stats(), flood_seen);

    if let Some(path) = &args.export_pcap {
        std::fs::write(path, pcap::encode(session.records()))?;
        println!("  Capture export: {}", path.display());
    }
    if let Some(path) = &args.export_csv {
        std::fs::write(path, ml::to_training_csv(session.records()))?;
        println!("  CSV export:     {}", path.display());
    }

    Ok(())
}

/// Ingest a JSON-lines file of feed events through the feed hand-off.
/// Returns whether any batch tripped the flood detector.
fn ingest_events(
    path: &std::path::Path,
    session: &mut CaptureSession,
) -> Result<bool, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let (handle, drain) = feed::channel(4096);

    let mut flood_seen = false;
    let mut unreadable = 0u64;

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Drain well before the channel can fill so no event is dropped.
        if index % 1024 == 1023 {
            flood_seen |= report_drain(&drain, session);
        }
        match feed::parse_event(line) {
            Ok(event) => {
                handle.push(event);
            }
            Err(err) => {
                unreadable += 1;
                tracing::warn!(line = index + 1, %err, "skipping unreadable feed event");
            }
        }
    }
    flood_seen |= report_drain(&drain, session);

    if unreadable > 0 {
        eprintln!("notice: {} unreadable feed events skipped", unreadable);
    }
    Ok(flood_seen)
}

fn report_drain(drain: &feed::FeedDrain, session: &mut CaptureSession) -> bool {
    let summary = drain.drain_into(session);
    for ack in &summary.acks {
        tracing::info!(
            command = %ack.command,
            status = %ack.status,
            "feed acknowledgement"
        );
    }
    if summary.appended > 0 || summary.duplicates > 0 {
        tracing::info!(
            appended = summary.appended,
            duplicates = summary.duplicates,
            "feed events ingested"
        );
    }
    summary.floods > 0
}

fn load_config(args: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(port) = args.watch_port {
        config.detection.watch_port = port;
    }
    if let Some(url) = &args.classifier_url {
        config.classifier.url = url.clone();
    }
    if args.no_flood {
        config.detection.flood.enabled = false;
    }
    if args.no_seed {
        config.detection.seed_rule = false;
    }

    Ok(config)
}
