//! Key selection and outcome recording
//!
//! The pool wraps the credential store with the selection policy and the
//! recording policy. Selection is read-only: the lazy daily-reset check is
//! applied in memory and nothing is written until a call is actually
//! recorded. Two concurrent calls may legitimately pick the same key (e.g.
//! it is the only eligible one) — correctness relies on the store's atomic
//! counters, not on mutual exclusion of selection.

use std::sync::Arc;
use std::time::Duration;

use scrape_credentials::{Credential, CredentialStore, epoch_day, now_millis};
use tracing::{debug, info, warn};

use crate::classify::FailureKind;

/// Per-provider credential pool.
///
/// `call_timeout` bounds each unit-of-work invocation; a hung provider call
/// is cut off and classified as a server fault. `max_attempts` bounds how
/// many distinct keys one logical operation will burn through.
pub struct Pool {
    store: Arc<CredentialStore>,
    call_timeout: Duration,
    max_attempts: u32,
}

impl Pool {
    /// Create a pool over the given store.
    ///
    /// An attempt budget of zero is nonsense and is clamped to one.
    pub fn new(store: Arc<CredentialStore>, call_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            store,
            call_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The underlying credential store (for the admin surface and sweeper).
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Select the best eligible credential for a provider.
    ///
    /// Filters to active keys with daily quota left (counting a stale daily
    /// counter as zero), then orders by priority ascending with
    /// least-recently-used breaking ties — a never-used key sorts first.
    /// `None` means no key is currently eligible; callers treat that as a
    /// normal operational state, not a fault.
    pub async fn select(&self, provider: &str) -> Option<Credential> {
        let today = epoch_day(now_millis());
        let mut candidates: Vec<Credential> = self
            .store
            .active_for_provider(provider)
            .await
            .into_iter()
            .filter(|c| c.within_daily_limit(today))
            .collect();

        candidates.sort_by(|a, b| {
            (a.priority, a.last_used_at.unwrap_or(0), &a.id)
                .cmp(&(b.priority, b.last_used_at.unwrap_or(0), &b.id))
        });

        let selected = candidates.into_iter().next();
        match &selected {
            Some(c) => debug!(provider, credential_id = %c.id, "selected credential"),
            None => debug!(provider, "no eligible credential"),
        }
        selected
    }

    /// Record a successful call. Store errors are logged, never propagated —
    /// the caller already has its payload and a bookkeeping hiccup must not
    /// turn a success into a failure.
    pub async fn record_success(&self, credential_id: &str) {
        match self.store.record_success(credential_id).await {
            Ok(credential) => {
                metrics::counter!(
                    "pool_calls_total",
                    "provider" => credential.provider.clone(),
                    "outcome" => "success"
                )
                .increment(1);
                debug!(
                    credential_id,
                    provider = %credential.provider,
                    usage_count = credential.usage_count,
                    daily_usage = credential.daily_usage,
                    "recorded success"
                );
            }
            Err(e) => warn!(credential_id, error = %e, "failed to record success"),
        }
    }

    /// Record a failed call with its classification.
    ///
    /// `terminal` retires the key until the sweeper or an operator restores
    /// it. The orchestrator decides terminality (a first isolated server
    /// fault gets one grace retry); auth, quota, and unclassified failures
    /// are always terminal.
    pub async fn record_failure(&self, credential_id: &str, kind: FailureKind, terminal: bool) {
        match self
            .store
            .record_failure(credential_id, kind.call_result(), terminal)
            .await
        {
            Ok(credential) => {
                metrics::counter!(
                    "pool_calls_total",
                    "provider" => credential.provider.clone(),
                    "outcome" => kind.label()
                )
                .increment(1);
                if terminal {
                    metrics::counter!(
                        "credential_deactivations_total",
                        "provider" => credential.provider.clone(),
                        "reason" => kind.label()
                    )
                    .increment(1);
                    info!(
                        credential_id,
                        provider = %credential.provider,
                        reason = kind.label(),
                        "credential deactivated"
                    );
                }
            }
            Err(e) => warn!(credential_id, error = %e, "failed to record failure"),
        }
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Per provider: total keys, selectable (active with quota left), and
    /// inactive counts. Status mapping: every provider has a selectable key
    /// → healthy, some do → degraded, none do (or the store is empty) →
    /// unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let today = epoch_day(now_millis());
        let all = self.store.list().await;

        let mut providers: Vec<serde_json::Value> = Vec::new();
        let mut current: Option<(String, usize, usize, usize)> = None;
        let mut healthy_providers = 0usize;
        let mut total_providers = 0usize;

        let mut flush = |entry: Option<(String, usize, usize, usize)>,
                         providers: &mut Vec<serde_json::Value>,
                         healthy: &mut usize,
                         total: &mut usize| {
            if let Some((name, total_keys, selectable, inactive)) = entry {
                *total += 1;
                if selectable > 0 {
                    *healthy += 1;
                }
                providers.push(serde_json::json!({
                    "provider": name,
                    "credentials_total": total_keys,
                    "credentials_selectable": selectable,
                    "credentials_inactive": inactive,
                }));
            }
        };

        // `list()` is ordered by provider, so one pass groups correctly.
        for credential in all {
            let matches_current = current
                .as_ref()
                .is_some_and(|(name, ..)| *name == credential.provider);
            if !matches_current {
                flush(
                    current.take(),
                    &mut providers,
                    &mut healthy_providers,
                    &mut total_providers,
                );
                current = Some((credential.provider.clone(), 0, 0, 0));
            }
            if let Some((_, total_keys, selectable, inactive)) = current.as_mut() {
                *total_keys += 1;
                if credential.active && credential.within_daily_limit(today) {
                    *selectable += 1;
                } else if !credential.active {
                    *inactive += 1;
                }
            }
        }
        flush(
            current.take(),
            &mut providers,
            &mut healthy_providers,
            &mut total_providers,
        );

        let status = if total_providers > 0 && healthy_providers == total_providers {
            "healthy"
        } else if healthy_providers > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "providers_total": total_providers,
            "providers_with_capacity": healthy_providers,
            "providers": providers,
        })
    }
}
