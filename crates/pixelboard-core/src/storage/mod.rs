//! Storage layer
//!
//! The driver adapter, schema bootstrap, and the typed stores.
//!
//! ## Architecture
//!
//! - `db`: single-connection SQLite adapter with eager result
//!   materialization and explicit transaction scopes
//! - `schema`: versioned migrations and the one-time grid seed
//! - `pixels`: grid reads and ownership-aware writes
//! - `users`: accounts and the verification-token protocol

pub mod db;
pub mod error;
pub mod pixels;
pub mod schema;
pub mod users;

pub use db::{Database, ExecResult, ResultSet, Value};
pub use error::{StoreError, StoreResult};
pub use pixels::PixelStore;
pub use schema::{bootstrap, CancelToken, SCHEMA_VERSION};
pub use users::UserStore;
