//! Verification-token command handlers

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use uuid::Uuid;

use pixelboard_core::Store;

use crate::output::Output;

/// Issue a fresh verification token, superseding any previous one
pub fn issue(store: &Store, user_id: i64, ttl_hours: i64, output: &Output) -> Result<()> {
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);

    let issued = store
        .issue_verification_token(user_id, &token, expires_at)
        .context("Failed to issue verification token")?;

    output.success(&format!("Issued verification token for user {}", user_id));
    output.print_token(&issued);
    Ok(())
}

/// Consume a verification token, marking the user's email verified
pub fn consume(store: &Store, token: String, output: &Output) -> Result<()> {
    let user = store
        .consume_verification_token(&token)
        .context("Failed to consume verification token")?;

    output.success(&format!("Verified email for user {}", user.id));
    output.print_user(&user);
    Ok(())
}
