//! click-trigger: press Enter, take a picture.
//!
//! Every line read from standard input sends the trigger signal to all
//! running `click` processes. End of input exits.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use click::{Delivery, Forwarder, TriggerSignal};

#[derive(Parser, Debug)]
#[command(author, version, about = "Forward console input as capture triggers")]
struct Args {
    /// Process name of the capture program.
    #[arg(short, long, default_value = "click")]
    target: String,

    #[arg(short, long, value_enum, default_value = "interrupt")]
    signal: TriggerSignal,

    #[arg(long, value_enum, default_value = "direct")]
    delivery: Delivery,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    info!(target_process = %args.target, signal = %args.signal, "Press Enter to take a picture");

    let forwarder = Forwarder::new(args.target, args.signal, args.delivery);
    let sent = forwarder.run(io::stdin().lock()).context("reading standard input")?;

    info!(sent, "Input closed");
    Ok(())
}
