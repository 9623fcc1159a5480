//! Unified storage interface
//!
//! The `Store` opens the database, runs the schema bootstrap, and exposes
//! the pixel and user operations behind one handle.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;  // bootstraps on first run
//!
//! let grid = store.read_all()?;  // 1,000,000 pixels
//! store.update_pixel_for_user(user_id, &pixel)?;
//! ```

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Config;
use crate::models::{EmailVerificationToken, Pixel, User};
use crate::storage::db::Database;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::pixels::PixelStore;
use crate::storage::schema::{self, CancelToken};
use crate::storage::users::UserStore;

/// Unified storage interface for pixelboard
///
/// Every multi-statement operation runs in its own transaction over the
/// single serialized connection.
pub struct Store {
    config: Config,
    pixels: PixelStore,
    users: UserStore,
}

impl Store {
    /// Open the store with configuration from the default locations
    pub fn open() -> StoreResult<Self> {
        let config = Config::load().map_err(|e| StoreError::Config(e.to_string()))?;
        Self::open_with_config(config)
    }

    /// Open the store at the configured path and bootstrap the schema
    ///
    /// On first run this seeds the full grid; afterwards bootstrap is a
    /// cheap no-op.
    pub fn open_with_config(config: Config) -> StoreResult<Self> {
        Self::open_with(config, &CancelToken::new())
    }

    /// Open with a cancellation token honored during the first-run seed
    pub fn open_with(config: Config, cancel: &CancelToken) -> StoreResult<Self> {
        let db = Database::open(&config.sqlite_path())?;
        schema::bootstrap(&db, cancel)?;
        info!(path = %config.sqlite_path().display(), "store ready");

        Ok(Self {
            pixels: PixelStore::new(db.clone()),
            users: UserStore::new(db),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Pixel Operations ====================

    /// Snapshot of the whole grid, ordered by id ascending
    pub fn read_all(&self) -> StoreResult<Vec<Pixel>> {
        self.pixels.read_all()
    }

    /// A single pixel by id
    pub fn get_pixel(&self, id: i64) -> StoreResult<Pixel> {
        self.pixels.get(id)
    }

    /// Unconditional pixel update, no ownership check
    pub fn update_pixel(&self, pixel: &Pixel) -> StoreResult<()> {
        self.pixels.update(pixel)
    }

    /// Ownership-checked pixel update on behalf of a user
    pub fn update_pixel_for_user(&self, user_id: i64, pixel: &Pixel) -> StoreResult<()> {
        self.pixels.update_for_user(user_id, pixel)
    }

    /// Number of pixel rows present
    pub fn pixel_count(&self) -> StoreResult<i64> {
        self.pixels.count()
    }

    // ==================== User Operations ====================

    /// Create a user account
    pub fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        self.users.create_user(email, password_hash)
    }

    /// Look up a user by email
    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        self.users.get_user_by_email(email)
    }

    /// Look up a user by id
    pub fn get_user_by_id(&self, id: i64) -> StoreResult<User> {
        self.users.get_user_by_id(id)
    }

    /// Number of registered users
    pub fn user_count(&self) -> StoreResult<i64> {
        self.users.count()
    }

    // ==================== Verification Tokens ====================

    /// Issue a verification token, superseding any previous one
    pub fn issue_verification_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<EmailVerificationToken> {
        self.users.issue_verification_token(user_id, token, expires_at)
    }

    /// Consume a verification token, marking the user's email verified
    pub fn consume_verification_token(&self, token: &str) -> StoreResult<User> {
        self.users.consume_verification_token(token)
    }
}
