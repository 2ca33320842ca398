//! Signed download URLs for the tape bucket.
//!
//! A token is `hex(SHA-256(secret ‖ bucket ‖ path ‖ expiry))`, each part
//! terminated by a NUL byte so that `("ab", "c")` and `("a", "bc")` hash
//! differently. Expiry is a UNIX timestamp in seconds.

use chrono::{DateTime, Duration, Utc};
use riskblocs_types::{BackendConfig, Result, RiskblocsError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A time-limited URL for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks storage URL tokens.
#[derive(Debug, Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: String,
    ttl: Duration,
}

impl UrlSigner {
    /// # Errors
    /// `Configuration` if `ttl_secs` is not positive.
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        ttl_secs: i64,
    ) -> Result<Self> {
        if ttl_secs <= 0 {
            return Err(RiskblocsError::Configuration(format!(
                "signed URL ttl must be > 0, got {ttl_secs}"
            )));
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            ttl: Duration::seconds(ttl_secs),
        })
    }

    /// # Errors
    /// `Configuration` if the configured ttl is not positive.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(
            config.url.clone(),
            config.signing_secret.clone(),
            config.signed_url_ttl_secs,
        )
    }

    /// Sign `bucket/path`, valid until `now + ttl`.
    #[must_use]
    pub fn sign(&self, bucket: &str, path: &str, now: DateTime<Utc>) -> SignedUrl {
        let expires_at = now + self.ttl;
        let expires = expires_at.timestamp();
        let token = self.token(bucket, path, expires);
        SignedUrl {
            url: format!(
                "{}/storage/v1/object/sign/{bucket}/{path}?token={token}&expires={expires}",
                self.base_url
            ),
            token,
            expires_at,
        }
    }

    /// Check a token presented with `expires` against `now`.
    ///
    /// # Errors
    /// - `SignatureInvalid` if the token does not match
    /// - `SignedUrlExpired` if the token matches but `now` is past `expires`
    pub fn verify(
        &self,
        bucket: &str,
        path: &str,
        token: &str,
        expires: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expected = self.token(bucket, path, expires);
        if !constant_time_eq(expected.as_bytes(), token.as_bytes()) {
            return Err(RiskblocsError::SignatureInvalid);
        }
        if now.timestamp() > expires {
            return Err(RiskblocsError::SignedUrlExpired);
        }
        Ok(())
    }

    fn token(&self, bucket: &str, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        for part in [self.secret.as_bytes(), bucket.as_bytes(), path.as_bytes()] {
            hasher.update(part);
            hasher.update([0u8]);
        }
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
