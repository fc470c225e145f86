//! Durable credential records for scraping providers
//!
//! One JSON file holds every provider key the gateway knows about, together
//! with its health flag, quota counters, and lifecycle timestamps. The store
//! is the single source of truth: selection reads from it, and every call
//! outcome is written back through it.
//!
//! All writes use atomic temp-file + rename to prevent corruption on crash,
//! and a tokio Mutex serializes read-modify-write operations so concurrent
//! calls reporting on the same credential never lose counter updates.

pub mod error;
pub mod model;
pub mod store;

pub use error::{Error, Result};
pub use model::{CallResult, Credential, MILLIS_PER_DAY, epoch_day, now_millis};
pub use store::{CredentialStore, CredentialUpdate};
