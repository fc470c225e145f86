//! Periodic reactivation of dormant credentials
//!
//! Keys retired by terminal failures come back automatically once they have
//! been dormant past a cooldown window. The sweep is a plain function so it
//! can also be triggered on demand through the admin surface; the spawned
//! task just runs it on an interval, independently of the request path.

use std::sync::Arc;
use std::time::Duration;

use scrape_credentials::{CredentialStore, now_millis};
use tracing::{debug, info, warn};

/// Reactivate every credential dormant for at least `cooldown`.
///
/// Idempotent: reactivation clears `deactivated_at`, so a second sweep (or
/// a concurrent one) finds nothing left to restore. Returns the reactivated
/// ids, sorted.
pub async fn reactivate_eligible(
    store: &CredentialStore,
    cooldown: Duration,
) -> scrape_credentials::Result<Vec<String>> {
    let cutoff = now_millis().saturating_sub(cooldown.as_millis() as u64);
    let reactivated = store.reactivate_older_than(cutoff).await?;
    if !reactivated.is_empty() {
        metrics::counter!("credential_reactivations_total").increment(reactivated.len() as u64);
        info!(
            count = reactivated.len(),
            cooldown_secs = cooldown.as_secs(),
            "reactivated dormant credentials"
        );
    }
    Ok(reactivated)
}

/// Spawn a background task sweeping every `interval`.
///
/// The immediate first tick is skipped — the store was just loaded and an
/// on-demand sweep is available through the admin API if an operator wants
/// one right away. Sweep failures are logged and retried on the next tick.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_sweeper_task(
    store: Arc<CredentialStore>,
    interval: Duration,
    cooldown: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match reactivate_eligible(&store, cooldown).await {
                Ok(ids) if ids.is_empty() => debug!("sweep found nothing to reactivate"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "reactivation sweep failed, will retry next tick"),
            }
        }
    })
}
