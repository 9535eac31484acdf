//! v6paint entry point.
//!
//! ```text
//! v6paint                          Run with ./v6paint.toml (or defaults)
//! v6paint --config <path>          Load a custom config TOML
//! v6paint --image <path>           Override the image to draw
//! v6paint --workers <n>            Override the number of senders
//! v6paint --gen-config             Write default config to stdout
//! v6paint --init-config            Write default config to --config path
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use v6paint::config::PaintConfig;
use v6paint::service::PaintService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "v6paint", about = "Draw an image into an IPv6 range with ICMPv6 echo requests")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "v6paint.toml")]
    config: PathBuf,

    /// Image to draw (overrides `[image].path`).
    #[arg(short, long)]
    image: Option<String>,

    /// Number of concurrent senders (overrides `[sender].workers`).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    init_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&PaintConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --init-config: bootstrap a config file and exit.
    if cli.init_config {
        PaintConfig::write_default(&cli.config)?;
        println!("Wrote default config to {}", cli.config.display());
        return Ok(());
    }

    // Load config and apply overrides.
    let mut config = PaintConfig::load(&cli.config);
    if let Some(image) = cli.image {
        config.image.path = image;
    }
    if let Some(workers) = cli.workers {
        config.sender.workers = workers;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("v6paint v{}", env!("CARGO_PKG_VERSION"));
    info!("image: {} (width {})", config.image.path, config.image.target_width);
    info!("prefix: {}::/48", config.address.prefix);
    info!("senders: {}", config.sender.workers);

    // Image and socket failures end the process with a non-zero exit.
    let service = PaintService::prepare(&config)?;
    service.stop_on_ctrl_c();

    let report = service.run().await?;
    info!(
        "sent {} packets across {} snapshots",
        report.packets, report.snapshots
    );

    Ok(())
}
