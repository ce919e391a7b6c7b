use clap::Parser;
use std::path::PathBuf;

/// Floodwatch: passive capture inspection and SYN-flood classification
#[derive(Parser, Debug)]
#[command(name = "floodwatch", version, about)]
pub struct Cli {
    /// Capture file to inspect (libpcap format)
    pub input: Option<PathBuf>,

    /// JSON-lines file of live-feed events to ingest after the capture
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the external classifier pass over the ingested records
    #[arg(long)]
    pub ml: bool,

    /// Classifier endpoint (overrides the config file)
    #[arg(long)]
    pub classifier_url: Option<String>,

    /// Port the flood rules watch (overrides the config file)
    #[arg(long)]
    pub watch_port: Option<u16>,

    /// Disable the sliding-window flood detector
    #[arg(long)]
    pub no_flood: bool,

    /// Disable the decoder's SYN-to-watch-port seed rule
    #[arg(long)]
    pub no_seed: bool,

    /// Re-serialize the records to a capture file
    #[arg(long)]
    pub export_pcap: Option<PathBuf>,

    /// Export feature rows + labels for classifier retraining
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Suppress per-record output
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
