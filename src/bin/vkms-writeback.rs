//! Find a VKMS device, attach its writeback connector to the active output
//! and capture frames into a dumb buffer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use vkms_writeback::config::VkmsConfig;
use vkms_writeback::modeset::{PropertyCache, WritebackTarget};
use vkms_writeback::vkms::VkmsClient;

#[derive(Parser)]
#[command(name = "vkms-writeback")]
#[command(version)]
#[command(about = "Attach a VKMS writeback connector to the active CRTC", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file
    #[arg(short, long, default_value = "/etc/vkms-writeback.toml")]
    config: PathBuf,

    /// Number of frames to capture after attaching
    #[arg(short, long, default_value_t = 1)]
    frames: u32,

    /// Only attach the connector; don't allocate a buffer or capture
    #[arg(long)]
    attach_only: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = VkmsConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?
        .with_env_overrides();

    let client = VkmsClient::find(&config).context("no usable VKMS device")?;
    let mut cache = PropertyCache::new();
    let topology = client.writeback(&mut cache)?;
    let outcome = topology.attach(client.card())?;
    println!(
        "{}: writeback connector {} on CRTC {} ({:?})",
        client.path().display(),
        topology.writeback_connector().id,
        topology.active_crtc().crtc_id,
        outcome
    );
    if cli.attach_only {
        return Ok(client.close()?);
    }

    let (width, height) = match &topology.active_crtc().mode {
        Some(mode) => (mode.hdisplay as u32, mode.vdisplay as u32),
        None => anyhow::bail!("active CRTC {} has no mode", topology.active_crtc().crtc_id),
    };
    let target = WritebackTarget::allocate(client.card(), width, height)?;
    for frame in 0..cli.frames {
        topology.trigger(client.card(), &mut cache, &target)?;
        info!(frame, fb_id = %target.framebuffer_id(), "capture requested");
    }
    target.release(client.card()).map_err(|(e, _)| e)?;
    client.close()?;
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
        .init();
    Ok(())
}
