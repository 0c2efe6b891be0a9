#![windows_subsystem = "windows"]

use anyhow::Result;
use strongbox::{config::Config, gui};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Network and Safes come from the user's settings once the window is up
    let config = Config::default();
    gui::launch(config)?;

    Ok(())
}
