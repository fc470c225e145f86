//! Credential rotation and fallback for scraping providers
//!
//! Mediates every outbound call to a third-party profile-data provider.
//! Each provider has a pool of keys; the pool picks the best eligible one
//! per call, records the outcome, retires keys that start failing, and a
//! background sweeper brings them back after a cooldown.
//!
//! Credential lifecycle:
//! 1. Operator adds a key via the admin API → stored active with zeroed counters
//! 2. Selector picks the active key with the lowest priority (LRU tie-break)
//!    that still has daily quota left
//! 3. Call outcome is recorded: counters bump, terminal failures (auth,
//!    quota, repeated server faults) deactivate the key
//! 4. The orchestrator moves on to the next distinct key, up to the attempt
//!    budget
//! 5. The sweeper reactivates keys dormant past the cooldown window

pub mod classify;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod sweeper;

pub use classify::{CallError, FailureKind, classify_status, classify_transport};
pub use error::FallbackError;
pub use orchestrator::FallbackOutcome;
pub use pool::Pool;
pub use sweeper::{reactivate_eligible, spawn_sweeper_task};
