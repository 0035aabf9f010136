//! Print a DRM card's mode-setting graph as JSON.
//!
//! ```bash
//! drmdump /dev/dri/card0 > graph.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use vkms_writeback::dump::GraphDump;
use vkms_writeback::{Card, WRITEBACK_CLIENT_CAPS};

#[derive(Parser)]
#[command(name = "drmdump")]
#[command(version)]
#[command(about = "Dump a DRM device's connectors, CRTCs, planes and properties as JSON", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't ask for atomic, universal planes or writeback connectors
    #[arg(long)]
    no_caps: bool,

    /// Device node to inspect
    #[arg(default_value = "/dev/dri/card0")]
    device: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let card = Card::open(&cli.device)
        .with_context(|| format!("failed to open {}", cli.device.display()))?;
    if !cli.no_caps {
        for cap in WRITEBACK_CLIENT_CAPS {
            // Without the cap the kernel just hides the matching objects.
            if let Err(e) = card.set_client_cap(cap, 1) {
                warn!(?cap, error = %e, "capability not enabled");
            }
        }
    }

    let dump = GraphDump::collect(&card).context("failed to read the mode-setting graph")?;
    let json = serde_json::to_string_pretty(&dump)?;
    println!("{json}");

    card.close().context("failed to close device")?;
    Ok(())
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive: Directive = format!("vkms_writeback={level}").parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
