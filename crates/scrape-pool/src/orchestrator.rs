//! Fallback across credentials for one logical provider call
//!
//! The orchestrator knows nothing about any wire protocol. The caller
//! supplies a unit of work — a function that performs exactly one provider
//! call given a key's secret — and the orchestrator drives it across
//! successive distinct keys until one succeeds or the attempt budget runs
//! out. Per-key failures are recorded as data and never propagate; only the
//! aggregate result reaches the caller.
//!
//! Cancellation falls out of dropping the returned future: the in-flight
//! unit of work is abandoned with it and no further attempts start.

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

use tracing::{debug, warn};

use crate::classify::{CallError, FailureKind};
use crate::error::FallbackError;
use crate::pool::Pool;

/// A successful fallback operation.
///
/// `credential_id` is exposed for observability only; callers must not need
/// it for anything else.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub payload: T,
    pub credential_id: String,
    pub attempts: u32,
}

impl Pool {
    /// Run one logical provider call, falling back across distinct keys.
    ///
    /// Per attempt: select a key, run the unit of work with its secret
    /// (bounded by the pool's call timeout — a hung call counts as a server
    /// fault), and record the outcome. Failure handling follows the
    /// classification: auth, quota, and unclassified failures retire the key
    /// immediately and the loop moves to the next one. The first server
    /// fault in a run gets a single grace retry on the same key before
    /// server faults also become terminal — one transport hiccup shouldn't
    /// cost a healthy key, but the loop must never spin on a dead provider.
    ///
    /// Stops early when the selector returns a key already tried in this run
    /// (it has nothing new to offer) or nothing at all.
    pub async fn call_with_fallback<T, F, Fut>(
        &self,
        provider: &str,
        mut work: F,
    ) -> Result<FallbackOutcome<T>, FallbackError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut tried: HashSet<String> = HashSet::new();
        let mut attempts: u32 = 0;
        let mut server_grace = true;
        let mut last_error: Option<String> = None;

        while attempts < self.max_attempts() {
            let Some(credential) = self.select(provider).await else {
                metrics::counter!(
                    "pool_exhausted_total",
                    "provider" => provider.to_string(),
                    "reason" => "no_eligible_credential"
                )
                .increment(1);
                return Err(FallbackError::NoEligibleCredential {
                    provider: provider.to_string(),
                    attempts,
                });
            };

            if !tried.insert(credential.id.clone()) {
                // Selector re-offered a key this run already burned; with
                // nothing new to try, looping further would spin forever.
                break;
            }
            attempts += 1;

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                self.call_timeout(),
                work(credential.secret.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CallError::new(
                    FailureKind::Server,
                    format!(
                        "provider call timed out after {}s",
                        self.call_timeout().as_secs()
                    ),
                )),
            };
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(payload) => {
                    metrics::histogram!(
                        "provider_call_duration_seconds",
                        "provider" => provider.to_string(),
                        "outcome" => "success"
                    )
                    .record(elapsed);
                    self.record_success(&credential.id).await;
                    debug!(
                        provider,
                        credential_id = %credential.id,
                        attempts,
                        "provider call succeeded"
                    );
                    return Ok(FallbackOutcome {
                        payload,
                        credential_id: credential.id,
                        attempts,
                    });
                }
                Err(err) => {
                    metrics::histogram!(
                        "provider_call_duration_seconds",
                        "provider" => provider.to_string(),
                        "outcome" => err.kind.label()
                    )
                    .record(elapsed);

                    let terminal = if err.kind == FailureKind::Server && server_grace {
                        // One grace retry on the same key for the first
                        // server fault in this run.
                        server_grace = false;
                        tried.remove(&credential.id);
                        false
                    } else {
                        true
                    };

                    warn!(
                        provider,
                        credential_id = %credential.id,
                        kind = err.kind.label(),
                        terminal,
                        attempt = attempts,
                        error = %err.message,
                        "provider call failed"
                    );
                    self.record_failure(&credential.id, err.kind, terminal).await;
                    last_error = Some(err.to_string());
                }
            }
        }

        metrics::counter!(
            "pool_exhausted_total",
            "provider" => provider.to_string(),
            "reason" => "attempts_exhausted"
        )
        .increment(1);
        Err(FallbackError::Exhausted {
            provider: provider.to_string(),
            attempts,
            last_error: last_error
                .unwrap_or_else(|| "selector re-offered an already-tried credential".into()),
        })
    }
}
