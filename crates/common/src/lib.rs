//! Common types for the scrape credential gateway

mod secret;
mod error;

pub use secret::{Secret, mask_secret};
pub use error::{Error, Result};
