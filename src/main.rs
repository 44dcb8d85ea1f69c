#![windows_subsystem = "windows"]

use anyhow::Result;
use fundpg::{config::Config, gui};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Optional run id or strategy link to open on startup
    let run_id = std::env::args().nth(1);

    let config = Config::from_env();
    tracing::info!("Using app {} (api {})", config.app_url, config.api_url);
    gui::launch(config, run_id)?;

    Ok(())
}
