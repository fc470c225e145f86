//! Failure classification for provider responses
//!
//! Classification decides whether a key is worth retrying later: auth,
//! quota, and unclassified failures retire the key immediately so future
//! calls skip it, while an isolated server fault is treated as the
//! provider's problem rather than the key's.

use scrape_credentials::CallResult;

/// What went wrong with one provider call.
///
/// - `Auth`: the key itself was rejected (401/403) — unusable until reactivated
/// - `Quota`: provider-side rate limit or quota exhaustion (429)
/// - `Server`: provider-side fault or transport failure, not the key's fault
/// - `Other`: anything unclassified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Quota,
    Server,
    Other,
}

impl FailureKind {
    /// Label for logging and metrics.
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::Quota => "quota",
            FailureKind::Server => "server",
            FailureKind::Other => "other",
        }
    }

    /// The `last_result` value recorded for this failure.
    pub fn call_result(self) -> CallResult {
        match self {
            FailureKind::Auth => CallResult::Auth,
            FailureKind::Quota => CallResult::Quota,
            FailureKind::Server => CallResult::Server,
            FailureKind::Other => CallResult::Other,
        }
    }
}

/// Classify an HTTP status from a provider.
///
/// 401/403 mean the key was rejected outright. 429 covers both rate limits
/// and daily-quota exhaustion on the provider side — either way the key is
/// spent for now. 408 and 5xx are provider faults. Everything else is
/// unclassified.
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        401 | 403 => FailureKind::Auth,
        429 => FailureKind::Quota,
        408 | 500..=599 => FailureKind::Server,
        _ => FailureKind::Other,
    }
}

/// Classify a transport-level failure (connect error, timeout, broken body).
///
/// Transport faults never implicate the key, so they all map to `Server`.
pub fn classify_transport(_err: &reqwest::Error) -> FailureKind {
    FailureKind::Server
}

/// A classified failure returned by a unit of work.
///
/// Units of work construct these from whatever wire protocol they speak;
/// the orchestrator only ever sees the classification and a message.
#[derive(Debug, thiserror::Error)]
#[error("{}: {message}", .kind.label())]
pub struct CallError {
    pub kind: FailureKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from an HTTP status and response body snippet.
    pub fn from_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        Self {
            kind: classify_status(status),
            message: format!("provider returned {status}: {snippet}"),
        }
    }

    /// Build from a reqwest transport error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self {
            kind: classify_transport(err),
            message: format!("transport failure: {err}"),
        }
    }
}
