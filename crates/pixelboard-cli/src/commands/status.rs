//! Status and init command handlers

use anyhow::Result;

use pixelboard_core::{Store, GRID_HEIGHT, GRID_PIXELS, GRID_WIDTH};

use crate::output::{Output, OutputFormat};

/// Report a completed bootstrap
///
/// Opening the store already ran the bootstrap, so this only confirms the
/// result.
pub fn init(store: &Store, output: &Output) -> Result<()> {
    let pixels = store.pixel_count()?;
    output.success(&format!(
        "Store ready at {} ({} of {} pixels)",
        store.config().sqlite_path().display(),
        pixels,
        GRID_PIXELS
    ));
    Ok(())
}

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let pixels = store.pixel_count().unwrap_or(0);
    let users = store.user_count().unwrap_or(0);
    let config = store.config();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "database": config.sqlite_path().display().to_string(),
                    "grid": {
                        "width": GRID_WIDTH,
                        "height": GRID_HEIGHT,
                        "pixels": pixels
                    },
                    "users": users
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", pixels);
        }
        OutputFormat::Human => {
            println!("Pixelboard Status");
            println!("=================");
            println!();
            println!("Storage:");
            println!("  Database: {}", config.sqlite_path().display());
            println!();
            println!("Contents:");
            println!("  Pixels: {} / {}", pixels, GRID_PIXELS);
            println!("  Users:  {}", users);
        }
    }

    Ok(())
}
