//! File-backed credential store
//!
//! Manages a JSON file mapping credential ids to `Credential` records. All
//! writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes every read-modify-write, which is what makes the
//! counter updates atomic: two concurrent calls recording on the same
//! credential queue behind the lock instead of racing a read-then-write.
//!
//! The recording methods fold the lazy daily reset into the same locked
//! update as the increments, so a counter can never be incremented against
//! a stale day.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{CallResult, Credential, epoch_day, now_millis};

/// Partial update applied through the admin surface.
///
/// `None` fields are left untouched. `clear_daily_limit` removes the cap
/// entirely (distinct from "don't change it", which plain `Option` can't
/// express in a JSON body).
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub active: Option<bool>,
    pub priority: Option<i32>,
    pub daily_limit: Option<u32>,
    pub clear_daily_limit: bool,
}

/// Thread-safe credential file manager.
///
/// The Mutex serializes all access. Mutating methods persist to disk before
/// releasing the lock, so the file never lags behind what a concurrent
/// reader could have observed.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Credential>>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// credentials). The pool will report `unhealthy` until credentials are
    /// added via the admin API.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: HashMap<String, Credential> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), credentials = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let empty = HashMap::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific credential.
    pub async fn get(&self, id: &str) -> Option<Credential> {
        let state = self.state.lock().await;
        state.get(id).cloned()
    }

    /// All credentials, ordered by provider, then priority, then id.
    ///
    /// Stable ordering keeps admin listings and health output deterministic.
    pub async fn list(&self) -> Vec<Credential> {
        let state = self.state.lock().await;
        let mut all: Vec<Credential> = state.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.provider, a.priority, &a.id).cmp(&(&b.provider, b.priority, &b.id))
        });
        all
    }

    /// Active credentials for one provider.
    ///
    /// This is the `(provider, active)` lookup the selector builds on; the
    /// quota filter and ordering are applied by the caller, which knows the
    /// current day.
    pub async fn active_for_provider(&self, provider: &str) -> Vec<Credential> {
        let state = self.state.lock().await;
        state
            .values()
            .filter(|c| c.active && c.provider == provider)
            .cloned()
            .collect()
    }

    /// Add a new credential and persist to disk.
    ///
    /// Fails with `Duplicate` if the id is already present — credentials are
    /// only ever replaced through `update`, never silently overwritten.
    pub async fn insert(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.contains_key(&credential.id) {
            return Err(Error::Duplicate(credential.id));
        }
        let id = credential.id.clone();
        state.insert(id.clone(), credential);
        debug!(credential_id = id, "added credential");
        write_atomic(&self.path, &state).await
    }

    /// Apply an admin update to a credential and persist to disk.
    ///
    /// Flipping `active` maintains `deactivated_at`: deactivation stamps it,
    /// reactivation clears it. Re-asserting the current flag changes nothing,
    /// so a repeated deactivation keeps the original timestamp.
    pub async fn update(&self, id: &str, update: CredentialUpdate) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let credential = state
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(active) = update.active {
            if active && !credential.active {
                credential.active = true;
                credential.deactivated_at = None;
            } else if !active && credential.active {
                credential.active = false;
                credential.deactivated_at = Some(now_millis());
            }
        }
        if let Some(priority) = update.priority {
            credential.priority = priority;
        }
        if update.clear_daily_limit {
            credential.daily_limit = None;
        } else if let Some(limit) = update.daily_limit {
            credential.daily_limit = Some(limit);
        }

        let updated = credential.clone();
        debug!(credential_id = id, "updated credential");
        write_atomic(&self.path, &state).await?;
        Ok(updated)
    }

    /// Remove a credential and persist to disk.
    ///
    /// Returns the removed credential if it existed.
    pub async fn remove(&self, id: &str) -> Result<Option<Credential>> {
        let mut state = self.state.lock().await;
        let removed = state.remove(id);
        if removed.is_some() {
            debug!(credential_id = id, "removed credential");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Record a successful call against a credential.
    ///
    /// One atomic update under the lock: reset the daily counter if the UTC
    /// day rolled over, then bump both counters, stamp `last_used_at`, and
    /// set `last_result = success`.
    pub async fn record_success(&self, id: &str) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let credential = state
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let now = now_millis();
        apply_usage(credential, now);
        credential.last_result = Some(CallResult::Success);

        let updated = credential.clone();
        write_atomic(&self.path, &state).await?;
        Ok(updated)
    }

    /// Record a failed call against a credential.
    ///
    /// Counters advance exactly as for a success — a failed call still spent
    /// a request against the provider. A terminal failure additionally flips
    /// `active` off and stamps `deactivated_at`, which removes the credential
    /// from selection until the sweeper (or an operator) restores it.
    pub async fn record_failure(
        &self,
        id: &str,
        result: CallResult,
        terminal: bool,
    ) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let credential = state
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let now = now_millis();
        apply_usage(credential, now);
        credential.last_result = Some(result);
        if terminal && credential.active {
            credential.active = false;
            credential.deactivated_at = Some(now);
        }

        let updated = credential.clone();
        write_atomic(&self.path, &state).await?;
        Ok(updated)
    }

    /// Reactivate every credential deactivated at or before `cutoff_millis`.
    ///
    /// Returns the reactivated ids, sorted. Clearing `deactivated_at` is what
    /// makes the sweep idempotent: a second pass finds nothing to restore.
    pub async fn reactivate_older_than(&self, cutoff_millis: u64) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let mut reactivated = Vec::new();

        for credential in state.values_mut() {
            if credential.active {
                continue;
            }
            let Some(deactivated_at) = credential.deactivated_at else {
                continue;
            };
            if deactivated_at <= cutoff_millis {
                credential.active = true;
                credential.deactivated_at = None;
                credential.last_result = Some(CallResult::AutoReactivated);
                reactivated.push(credential.id.clone());
            }
        }

        if !reactivated.is_empty() {
            write_atomic(&self.path, &state).await?;
        }
        reactivated.sort();
        Ok(reactivated)
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Lazy daily reset + increments, applied while the store lock is held.
fn apply_usage(credential: &mut Credential, now: u64) {
    let today = epoch_day(now);
    if credential.last_reset_day != today {
        credential.daily_usage = 0;
        credential.last_reset_day = today;
    }
    credential.daily_usage += 1;
    credential.usage_count += 1;
    credential.last_used_at = Some(now);
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains provider keys.
async fn write_atomic(path: &Path, data: &HashMap<String, Credential>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
