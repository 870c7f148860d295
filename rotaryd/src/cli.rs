use std::path::PathBuf;

use clap::Parser;

/// Process controller for a single rotary VoIP phone line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the phone core's TOML configuration document.
    #[arg(short, long, default_value = "/etc/rotaryd/config.toml")]
    pub config: PathBuf,

    /// Path to the SQLite call-log database (created if absent).
    #[arg(long, default_value = "/var/lib/rotaryd/calls.db")]
    pub db: PathBuf,

    /// Log level filter, e.g. `info`, `debug`, `rotary_callcore=trace,info`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
