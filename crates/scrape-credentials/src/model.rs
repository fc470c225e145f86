//! Credential record and outcome vocabulary

use serde::{Deserialize, Serialize};

/// Milliseconds in one UTC calendar day.
pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// UTC day number (days since the unix epoch) for a millisecond timestamp.
///
/// Daily quota windows are calendar days in UTC, not rolling 24h windows.
pub fn epoch_day(millis: u64) -> u64 {
    millis / MILLIS_PER_DAY
}

/// Classification of the most recent call outcome on a credential.
///
/// `Auth`, `Quota`, `Server`, and `Other` mirror the failure taxonomy used
/// by the orchestrator; `AutoReactivated` is stamped by the sweeper when it
/// brings a dormant credential back, so operators can tell an automatic
/// recovery apart from a real call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Success,
    Auth,
    Quota,
    Server,
    Other,
    AutoReactivated,
}

impl CallResult {
    /// Label for logging and metrics.
    pub fn label(self) -> &'static str {
        match self {
            CallResult::Success => "success",
            CallResult::Auth => "auth",
            CallResult::Quota => "quota",
            CallResult::Server => "server",
            CallResult::Other => "other",
            CallResult::AutoReactivated => "auto_reactivated",
        }
    }
}

/// One provider key with its health and usage state.
///
/// Counters are only ever mutated through `CredentialStore`, which applies
/// the lazy daily reset and the increments as a single update under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque unique identifier (`cred_` + uuid at creation time).
    pub id: String,
    /// Logical name of the external service this key belongs to.
    pub provider: String,
    /// The key value presented to the provider. Never returned unmasked
    /// through the admin surface.
    pub secret: String,
    /// Eligibility flag. An inactive credential is never selected.
    pub active: bool,
    /// Lower sorts first; ties broken by least-recently-used.
    #[serde(default)]
    pub priority: i32,
    /// Optional cap on calls per UTC calendar day. `None` means unlimited.
    #[serde(default)]
    pub daily_limit: Option<u32>,
    /// Calls made since `last_reset_day`.
    #[serde(default)]
    pub daily_usage: u32,
    /// UTC day number at which `daily_usage` last started from zero.
    #[serde(default)]
    pub last_reset_day: u64,
    /// Lifetime counter of all attempted calls. Monotonic, never reset.
    #[serde(default)]
    pub usage_count: u64,
    /// Unix millis of the most recent call attempt, success or failure.
    #[serde(default)]
    pub last_used_at: Option<u64>,
    /// Outcome of the most recent call (or sweeper action).
    #[serde(default)]
    pub last_result: Option<CallResult>,
    /// Unix millis at which `active` last flipped to false. Cleared on
    /// reactivation.
    #[serde(default)]
    pub deactivated_at: Option<u64>,
    /// Unix millis at creation time.
    #[serde(default)]
    pub created_at: u64,
}

impl Credential {
    /// Create a fresh, eligible credential with zeroed counters.
    pub fn new(
        id: String,
        provider: String,
        secret: String,
        priority: i32,
        daily_limit: Option<u32>,
    ) -> Self {
        let now = now_millis();
        Self {
            id,
            provider,
            secret,
            active: true,
            priority,
            daily_limit,
            daily_usage: 0,
            last_reset_day: epoch_day(now),
            usage_count: 0,
            last_used_at: None,
            last_result: None,
            deactivated_at: None,
            created_at: now,
        }
    }

    /// Daily usage as of `today`, applying the lazy reset without writing.
    ///
    /// If the stored reset day is not today, the counter belongs to an old
    /// day and counts as zero. The stored value is only rewritten when a
    /// call is actually recorded.
    pub fn effective_daily_usage(&self, today: u64) -> u32 {
        if self.last_reset_day == today {
            self.daily_usage
        } else {
            0
        }
    }

    /// Whether this credential still has daily quota left as of `today`.
    pub fn within_daily_limit(&self, today: u64) -> bool {
        match self.daily_limit {
            Some(limit) => self.effective_daily_usage(today) < limit,
            None => true,
        }
    }
}
