//! Checking the RSA signature on a server descriptor.
//!
//! This crate does no cryptography of its own.  Callers supply a
//! [`CryptoProvider`] that can hash and check RSA keys, and
//! [`ServerDesc::check_signature`] uses it to tie the descriptor's
//! fingerprint, signing key, and signature together.

use super::ServerDesc;
use crate::types::misc::RsaIdentity;

use thiserror::Error;

/// A source of the RSA operations needed to check a descriptor.
pub trait CryptoProvider {
    /// The error type returned by this provider.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return the RSA identity of a DER-encoded public key: the SHA1
    /// digest of its encoding.
    fn rsa_key_id(&self, der: &[u8]) -> Result<RsaIdentity, Self::Error>;

    /// Check that `sig` is a PKCS#1 v1.5 signature made by the
    /// DER-encoded public key `key` on the SHA1 digest of `signed`.
    fn verify_rsa(&self, key: &[u8], signed: &[u8], sig: &[u8]) -> Result<(), Self::Error>;
}

/// An error from checking the signature on a descriptor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignatureError {
    /// The descriptor's fingerprint isn't the identity of its signing key.
    #[error("fingerprint does not match signing key")]
    FingerprintMismatch,
    /// The crypto provider rejected a key or the signature.
    #[error("signature check failed")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SignatureError {
    /// Wrap an error from a provider.
    fn provider<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        SignatureError::Provider(Box::new(e))
    }
}

impl ServerDesc {
    /// Check this descriptor's RSA signature using `provider`.
    ///
    /// Succeeds if the signing key's identity matches the fingerprint,
    /// and the `router-signature` is a valid signature by that key on
    /// [`super::SignedText::rsa_digest_input`].
    ///
    /// The ed25519 signature and certificates are not checked.
    pub fn check_signature<P: CryptoProvider>(&self, provider: &P) -> Result<(), SignatureError> {
        let id = provider
            .rsa_key_id(&self.signing_key)
            .map_err(SignatureError::provider)?;
        if id != self.fingerprint {
            return Err(SignatureError::FingerprintMismatch);
        }
        provider
            .verify_rsa(
                &self.signing_key,
                self.signed.rsa_digest_input().as_bytes(),
                &self.router_signature,
            )
            .map_err(SignatureError::provider)
    }
}
