//! User and verification-token store
//!
//! Account creation and lookup, plus the single-use email-verification
//! protocol: issuing a token supersedes every earlier token the user
//! holds, and a consumed or expired token never validates twice.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use crate::models::{EmailVerificationToken, User};
use crate::storage::db::{self, Database, Value};
use crate::storage::error::{StoreError, StoreResult};

const SELECT_USER: &str =
    "SELECT id, email, password_hash, created_at, email_verified_at FROM users";

const SELECT_TOKEN: &str =
    "SELECT id, user_id, token, created_at, expires_at FROM email_verification_tokens";

/// Typed operations over the `users` and `email_verification_tokens` tables
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an account.
    ///
    /// The returned row is reloaded from the engine so `created_at`
    /// reflects the column default. A duplicate email fails
    /// `AlreadyExists`.
    pub fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let email = email.trim();
        let password_hash = password_hash.trim();
        if email.is_empty() {
            return Err(StoreError::Validation("email must not be empty".to_string()));
        }
        if password_hash.is_empty() {
            return Err(StoreError::Validation(
                "password hash must not be empty".to_string(),
            ));
        }

        self.db.with_txn("create user", |tx| {
            let res = db::exec(
                tx,
                "insert user",
                "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
                params![email, password_hash],
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    StoreError::AlreadyExists("user email")
                } else {
                    e
                }
            })?;

            debug!(user_id = res.last_insert_id, "user created");
            load_user(tx, res.last_insert_id)
        })
    }

    /// Exact lookup by email
    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let rs = self.db.query(
            "read user by email",
            &format!("{SELECT_USER} WHERE email = ?1"),
            params![email],
        )?;
        match rs.rows.into_iter().next() {
            Some(row) => user_from_row(row),
            None => Err(StoreError::NotFound("user")),
        }
    }

    /// Exact lookup by id
    pub fn get_user_by_id(&self, id: i64) -> StoreResult<User> {
        let rs = self.db.query(
            "read user by id",
            &format!("{SELECT_USER} WHERE id = ?1"),
            params![id],
        )?;
        match rs.rows.into_iter().next() {
            Some(row) => user_from_row(row),
            None => Err(StoreError::NotFound("user")),
        }
    }

    /// Number of registered users
    pub fn count(&self) -> StoreResult<i64> {
        let rs = self
            .db
            .query("count users", "SELECT COUNT(*) FROM users", [])?;
        rs.rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| StoreError::DataIntegrity("user count is not an integer".to_string()))
    }

    /// Issue a fresh verification token, atomically superseding any
    /// previous one for the user.
    ///
    /// A token-string collision fails `AlreadyExists`; an unknown user
    /// fails `NotFound`.
    pub fn issue_verification_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<EmailVerificationToken> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Validation("token must not be empty".to_string()));
        }

        self.db.with_txn("issue verification token", |tx| {
            db::exec(
                tx,
                "delete superseded tokens",
                "DELETE FROM email_verification_tokens WHERE user_id = ?1",
                params![user_id],
            )?;

            let res = db::exec(
                tx,
                "insert verification token",
                "INSERT INTO email_verification_tokens (user_id, token, expires_at) \
                 VALUES (?1, ?2, ?3)",
                params![user_id, token, expires_at.timestamp_millis()],
            )
            .map_err(|e| {
                if e.is_unique_violation() {
                    StoreError::AlreadyExists("verification token")
                } else if e.is_foreign_key_violation() {
                    StoreError::NotFound("user")
                } else {
                    e
                }
            })?;

            let rs = db::query(
                tx,
                "reload verification token",
                &format!("{SELECT_TOKEN} WHERE id = ?1"),
                params![res.last_insert_id],
            )?;
            match rs.rows.into_iter().next() {
                Some(row) => token_from_row(row),
                None => Err(StoreError::NotFound("verification token")),
            }
        })
    }

    /// Consume a token: verify the user's email and retire every token the
    /// user holds, atomically.
    ///
    /// An expired token is deleted as part of detecting expiry and the
    /// delete commits, so a retry with the same token reports
    /// `TokenInvalid` rather than `TokenExpired`.
    pub fn consume_verification_token(&self, token: &str) -> StoreResult<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::Validation("token must not be empty".to_string()));
        }

        let now = Utc::now();
        let outcome = self.db.with_txn("consume verification token", |tx| {
            let rs = db::query(
                tx,
                "read verification token",
                &format!("{SELECT_TOKEN} WHERE token = ?1"),
                params![token],
            )?;
            let stored = match rs.rows.into_iter().next() {
                Some(row) => token_from_row(row)?,
                None => return Err(StoreError::TokenInvalid),
            };

            if stored.is_expired(now) {
                db::exec(
                    tx,
                    "delete expired token",
                    "DELETE FROM email_verification_tokens WHERE id = ?1",
                    params![stored.id],
                )?;
                debug!(user_id = stored.user_id, "verification token expired");
                return Ok(Consumed::Expired);
            }

            db::exec(
                tx,
                "mark email verified",
                "UPDATE users SET email_verified_at = COALESCE(email_verified_at, ?1) \
                 WHERE id = ?2",
                params![now.timestamp_millis(), stored.user_id],
            )?;
            db::exec(
                tx,
                "retire user tokens",
                "DELETE FROM email_verification_tokens WHERE user_id = ?1",
                params![stored.user_id],
            )?;

            debug!(user_id = stored.user_id, "email verified");
            load_user(tx, stored.user_id).map(Consumed::Verified)
        })?;

        match outcome {
            Consumed::Expired => Err(StoreError::TokenExpired),
            Consumed::Verified(user) => Ok(user),
        }
    }
}

/// Outcome of the consume transaction. Expiry commits its delete before
/// the error is reported to the caller.
enum Consumed {
    Expired,
    Verified(User),
}

fn load_user(conn: &rusqlite::Connection, id: i64) -> StoreResult<User> {
    let rs = db::query(
        conn,
        "reload user",
        &format!("{SELECT_USER} WHERE id = ?1"),
        params![id],
    )?;
    match rs.rows.into_iter().next() {
        Some(row) => user_from_row(row),
        None => Err(StoreError::NotFound("user")),
    }
}

fn user_from_row(row: Vec<Value>) -> StoreResult<User> {
    let id = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::DataIntegrity("user id is not an integer".to_string()))?;

    let email = row
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::DataIntegrity(format!("user {id} has no email")))?
        .to_string();
    let password_hash = row
        .get(2)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::DataIntegrity(format!("user {id} has no password hash")))?
        .to_string();

    let created_at = match row.get(3) {
        Some(Value::Integer(ms)) => DateTime::from_timestamp_millis(*ms).ok_or_else(|| {
            StoreError::DataIntegrity(format!("user {id} has an invalid created_at"))
        })?,
        _ => {
            return Err(StoreError::DataIntegrity(format!(
                "user {id} has a missing or malformed created_at"
            )))
        }
    };

    let email_verified_at = match row.get(4) {
        None | Some(Value::Null) => None,
        Some(Value::Integer(ms)) => Some(DateTime::from_timestamp_millis(*ms).ok_or_else(
            || StoreError::DataIntegrity(format!("user {id} has an invalid email_verified_at")),
        )?),
        Some(_) => {
            return Err(StoreError::DataIntegrity(format!(
                "user {id} has a malformed email_verified_at"
            )))
        }
    };

    Ok(User {
        id,
        email,
        password_hash,
        created_at,
        email_verified_at,
    })
}

fn token_from_row(row: Vec<Value>) -> StoreResult<EmailVerificationToken> {
    let id = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::DataIntegrity("token id is not an integer".to_string()))?;
    let user_id = row
        .get(1)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::DataIntegrity(format!("token {id} has no user_id")))?;
    let token = row
        .get(2)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::DataIntegrity(format!("token {id} has no token value")))?
        .to_string();

    let created_at = match row.get(3) {
        Some(Value::Integer(ms)) => DateTime::from_timestamp_millis(*ms).ok_or_else(|| {
            StoreError::DataIntegrity(format!("token {id} has an invalid created_at"))
        })?,
        _ => {
            return Err(StoreError::DataIntegrity(format!(
                "token {id} has a missing or malformed created_at"
            )))
        }
    };
    let expires_at = match row.get(4) {
        Some(Value::Integer(ms)) => DateTime::from_timestamp_millis(*ms).ok_or_else(|| {
            StoreError::DataIntegrity(format!("token {id} has an invalid expires_at"))
        })?,
        _ => {
            return Err(StoreError::DataIntegrity(format!(
                "token {id} has a missing or malformed expires_at"
            )))
        }
    };

    Ok(EmailVerificationToken {
        id,
        user_id,
        token,
        created_at,
        expires_at,
    })
}
