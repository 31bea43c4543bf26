use serde::{Deserialize, Serialize};

/// Bearer credential for the provider API, cached between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Unix timestamp after which the token must be refreshed.
    pub expires_at: i64,
}

impl Credential {
    pub fn is_valid(&self, now: i64) -> bool {
        self.expires_at > now
    }
}
