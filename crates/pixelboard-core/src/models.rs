//! Data models for pixelboard
//!
//! Defines the grid dimensions and the rows the stores read and write:
//! pixels, users, and email-verification tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grid width in pixels
pub const GRID_WIDTH: i64 = 1000;
/// Grid height in pixels
pub const GRID_HEIGHT: i64 = 1000;
/// Total number of addressable pixels. Once bootstrapped the grid always
/// holds exactly this many rows; they are only ever mutated.
pub const GRID_PIXELS: i64 = GRID_WIDTH * GRID_HEIGHT;

/// Lifecycle state of a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelStatus {
    Free,
    Taken,
}

impl PixelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelStatus::Free => "free",
            PixelStatus::Taken => "taken",
        }
    }

    /// Parse the stored status text; anything but "free"/"taken" is invalid
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PixelStatus::Free),
            "taken" => Some(PixelStatus::Taken),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cell of the shared grid
///
/// A free pixel carries no color, url, or owner. A taken pixel always has
/// a color and a url, plus an owner when it was claimed by an
/// authenticated user. Optional fields are omitted from the serialized
/// form when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    /// Grid position, `0 <= id < GRID_PIXELS`
    pub id: i64,
    pub status: PixelStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_id: Option<i64>,
    /// Stamped on every mutation; unset only for never-touched seed rows
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pixel {
    /// A cleared, unowned pixel
    pub fn free(id: i64) -> Self {
        Self {
            id,
            status: PixelStatus::Free,
            color: None,
            url: None,
            owner_id: None,
            updated_at: None,
        }
    }

    /// A taken pixel with the given color and destination url
    pub fn taken(id: i64, color: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            status: PixelStatus::Taken,
            color: Some(color.into()),
            url: Some(url.into()),
            owner_id: None,
            updated_at: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == PixelStatus::Free
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique, stored case-sensitively
    pub email: String,
    /// Opaque to the store; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Assigned by the engine at insert, immutable afterwards
    pub created_at: DateTime<Utc>,
    /// Set at most once, never unset
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// A single-use, time-bounded credential proving control of an email
/// address. At most one live token exists per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailVerificationToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EmailVerificationToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
