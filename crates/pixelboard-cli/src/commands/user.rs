//! User command handlers

use anyhow::{Context, Result};

use pixelboard_core::Store;

use crate::output::Output;

/// Create a user account
pub fn create(store: &Store, email: String, password_hash: String, output: &Output) -> Result<()> {
    let user = store
        .create_user(&email, &password_hash)
        .context("Failed to create user")?;

    output.success(&format!("Created user {}", user.id));
    output.print_user(&user);
    Ok(())
}

/// Look up a user by email
pub fn show(store: &Store, email: String, output: &Output) -> Result<()> {
    let user = store.get_user_by_email(&email)?;
    output.print_user(&user);
    Ok(())
}
