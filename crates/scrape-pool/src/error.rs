//! Aggregate failure results for fallback operations

/// Why a whole fallback operation failed.
///
/// These are ordinary results, not faults: running out of keys is an
/// expected operational state. Callers surface them to end users as a
/// "temporarily unavailable, try later" condition rather than an input or
/// data error.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// The selector had no key to offer (none configured, all retired, or
    /// all out of daily quota).
    #[error("no eligible credential for provider '{provider}' after {attempts} attempts")]
    NoEligibleCredential { provider: String, attempts: u32 },

    /// Every attempted key failed within the attempt budget.
    #[error("all credentials failed for provider '{provider}' after {attempts} attempts: {last_error}")]
    Exhausted {
        provider: String,
        attempts: u32,
        last_error: String,
    },
}

impl FallbackError {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FallbackError::NoEligibleCredential { attempts, .. } => *attempts,
            FallbackError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_provider_and_attempts() {
        let err = FallbackError::NoEligibleCredential {
            provider: "talentscan".into(),
            attempts: 0,
        };
        assert_eq!(
            err.to_string(),
            "no eligible credential for provider 'talentscan' after 0 attempts"
        );

        let err = FallbackError::Exhausted {
            provider: "talentscan".into(),
            attempts: 3,
            last_error: "auth: key revoked".into(),
        };
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("auth: key revoked"));
        assert_eq!(err.attempts(), 3);
    }
}
