//! `rotaryd`: the process controller binary for a single rotary VoIP phone
//! line. Parses CLI arguments, sets up logging, and hands off to
//! [`rotaryd::controller::Controller`] for the rest of the process lifetime.

use clap::Parser;
use rotaryd::{cli, controller, error, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    logging::init(&args.log_level);

    let controller = controller::Controller::new(args.config, args.db);
    if let Err(err) = controller.run().await {
        error!(%err, "rotaryd exited with an error");
        std::process::exit(error::exit_code_for(&err));
    }
}
