//! Pixel command handlers

use anyhow::{Context, Result};

use pixelboard_core::{Pixel, Store};

use crate::output::Output;

/// Show a single pixel
pub fn show(store: &Store, id: i64, output: &Output) -> Result<()> {
    let pixel = store.get_pixel(id)?;
    output.print_pixel(&pixel);
    Ok(())
}

/// Set a pixel's color and destination url
///
/// With `--user` the write goes through the ownership-checked path and
/// claims the pixel for that user; without it the write is unconditional.
pub fn set(
    store: &Store,
    id: i64,
    color: String,
    url: String,
    user: Option<i64>,
    output: &Output,
) -> Result<()> {
    let pixel = Pixel::taken(id, color, url);
    match user {
        Some(user_id) => store
            .update_pixel_for_user(user_id, &pixel)
            .context("Failed to claim pixel")?,
        None => store.update_pixel(&pixel).context("Failed to update pixel")?,
    }

    output.success(&format!("Updated pixel {}", id));
    output.print_pixel(&store.get_pixel(id)?);
    Ok(())
}

/// Clear a pixel back to free
pub fn free(store: &Store, id: i64, user: Option<i64>, output: &Output) -> Result<()> {
    let pixel = Pixel::free(id);
    match user {
        Some(user_id) => store
            .update_pixel_for_user(user_id, &pixel)
            .context("Failed to release pixel")?,
        None => store.update_pixel(&pixel).context("Failed to update pixel")?,
    }

    output.success(&format!("Freed pixel {}", id));
    Ok(())
}
