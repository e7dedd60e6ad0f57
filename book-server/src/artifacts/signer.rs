//! Signed artifact URLs (HMAC-SHA256)
//!
//! URL layout: `{base}/artifacts/{object_key}?expires={unix_millis}&signature={hex}`
//! where the signature covers `"{object_key}\n{expires}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

/// Signing key rejected by HMAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid signing key")]
pub struct InvalidSigningKey;

/// Why a presented link was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature does not match")]
    Invalid,
    #[error("link expired")]
    Expired,
}

impl From<SignatureError> for shared::error::AppError {
    fn from(err: SignatureError) -> Self {
        use shared::error::{AppError, ErrorCode};
        match err {
            SignatureError::Invalid => AppError::new(ErrorCode::SignatureInvalid),
            SignatureError::Expired => AppError::new(ErrorCode::SignedUrlExpired),
        }
    }
}

/// Issues and verifies signed artifact links
#[derive(Clone)]
pub struct UrlSigner {
    keyed: Hmac<Sha256>,
    base_url: Arc<str>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(
        secret: impl AsRef<[u8]>,
        base_url: impl AsRef<str>,
    ) -> Result<Self, InvalidSigningKey> {
        let keyed =
            Hmac::<Sha256>::new_from_slice(secret.as_ref()).map_err(|_| InvalidSigningKey)?;
        Ok(Self {
            keyed,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        })
    }

    fn mac(&self, object_key: &str, expires_at: i64) -> Hmac<Sha256> {
        let mut mac = self.keyed.clone();
        mac.update(object_key.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Hex signature for `object_key` valid until `expires_at`
    pub fn sign(&self, object_key: &str, expires_at: i64) -> String {
        hex::encode(self.mac(object_key, expires_at).finalize().into_bytes())
    }

    /// Full download URL
    pub fn url_for(&self, object_key: &str, expires_at: i64) -> String {
        format!(
            "{}/artifacts/{}?expires={}&signature={}",
            self.base_url,
            object_key,
            expires_at,
            self.sign(object_key, expires_at)
        )
    }

    /// Check a presented signature (constant-time) and its expiry
    pub fn verify(
        &self,
        object_key: &str,
        expires_at: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let sig_bytes = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(object_key, expires_at)
            .verify_slice(&sig_bytes)
            .map_err(|_| SignatureError::Invalid)?;

        if expires_at <= now {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("test-secret", "http://localhost:5000/").unwrap()
    }

    #[test]
    fn test_url_layout() {
        let s = signer();
        let url = s.url_for("orders/o1/i1/book.pdf", 1_000);
        assert!(url.starts_with("http://localhost:5000/artifacts/orders/o1/i1/book.pdf?expires=1000&signature="));
    }

    #[test]
    fn test_verify_roundtrip() {
        let s = signer();
        let sig = s.sign("k", 2_000);
        assert_eq!(s.verify("k", 2_000, &sig, 1_000), Ok(()));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let s = signer();
        let sig = s.sign("k", 2_000);
        assert_eq!(s.verify("other", 2_000, &sig, 1_000), Err(SignatureError::Invalid));
        // Extending the expiry invalidates the signature
        assert_eq!(s.verify("k", 9_000, &sig, 1_000), Err(SignatureError::Invalid));
        assert_eq!(s.verify("k", 2_000, "zz", 1_000), Err(SignatureError::Invalid));

        let other = UrlSigner::new("another-secret", "http://localhost:5000").unwrap();
        assert_eq!(other.verify("k", 2_000, &sig, 1_000), Err(SignatureError::Invalid));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let s = signer();
        let sig = s.sign("k", 2_000);
        assert_eq!(s.verify("k", 2_000, &sig, 2_000), Err(SignatureError::Expired));
    }
}
