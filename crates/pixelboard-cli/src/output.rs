//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use pixelboard_core::{EmailVerificationToken, Pixel, User};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single pixel
    pub fn print_pixel(&self, pixel: &Pixel) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", pixel.id);
                println!("Status:  {}", pixel.status);
                if let Some(ref color) = pixel.color {
                    println!("Color:   {}", color);
                }
                if let Some(ref url) = pixel.url {
                    println!("URL:     {}", url);
                }
                if let Some(owner) = pixel.owner_id {
                    println!("Owner:   {}", owner);
                }
                if let Some(updated) = pixel.updated_at {
                    println!("Updated: {}", updated.format("%Y-%m-%d %H:%M"));
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(pixel).unwrap());
            }
            OutputFormat::Quiet => {
                println!("{}", pixel.id);
            }
        }
    }

    /// Print a single user
    pub fn print_user(&self, user: &User) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", user.id);
                println!("Email:    {}", user.email);
                println!("Created:  {}", user.created_at.format("%Y-%m-%d %H:%M"));
                match user.email_verified_at {
                    Some(at) => println!("Verified: {}", at.format("%Y-%m-%d %H:%M")),
                    None => println!("Verified: no"),
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(user).unwrap());
            }
            OutputFormat::Quiet => {
                println!("{}", user.id);
            }
        }
    }

    /// Print an issued verification token
    pub fn print_token(&self, token: &EmailVerificationToken) {
        match self.format {
            OutputFormat::Human => {
                println!("Token:   {}", token.token);
                println!("User:    {}", token.user_id);
                println!("Expires: {}", token.expires_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(token).unwrap());
            }
            OutputFormat::Quiet => {
                println!("{}", token.token);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }
}
