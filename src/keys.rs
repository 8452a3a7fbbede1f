//! Security keys and signing credentials.
//!
//! The token handler consumes key material through the opaque
//! [`SecurityKey`] capability; [`RsaSecurityKey`] is the bundled RSA
//! PKCS#1 v1.5 implementation.

use std::fmt;
use std::sync::Arc;

use rsa::pkcs1v15;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{Saml2Error, Saml2Result};
use crate::types::SignatureAlgorithm;
use crate::validation::ValidationParameters;

/// An asymmetric key used to verify (and optionally produce) assertion
/// signatures.
///
/// Keys are shared, borrowed from the validation parameters for the
/// duration of a single validation call; the handler never retains them.
pub trait SecurityKey: fmt::Debug + Send + Sync {
    /// The key identifier, when the key carries one.
    fn key_id(&self) -> Option<&str>;

    /// Verifies `signature` over `data` under the given signature
    /// algorithm URI.
    ///
    /// Returns `Ok(false)` for a well-formed but non-matching signature;
    /// errors are reserved for unusable input (unknown algorithm,
    /// malformed signature bytes).
    fn verify(&self, algorithm: &str, data: &[u8], signature: &[u8]) -> Saml2Result<bool>;

    /// Signs `data` under the given signature algorithm URI.
    ///
    /// Verification-only keys return [`Saml2Error::Crypto`].
    fn sign(&self, algorithm: &str, _data: &[u8]) -> Saml2Result<Vec<u8>> {
        let _ = algorithm;
        Err(Saml2Error::Crypto(
            "this key cannot produce signatures".to_string(),
        ))
    }
}

/// RSA key pair (or bare public key) implementing [`SecurityKey`] with
/// PKCS#1 v1.5 padding over SHA-256/384/512.
pub struct RsaSecurityKey {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
    key_id: Option<String>,
}

impl RsaSecurityKey {
    /// Creates a key from an RSA private key; the public half is derived.
    #[must_use]
    pub fn from_private_key(private_key: RsaPrivateKey, key_id: Option<String>) -> Self {
        Self {
            public_key: RsaPublicKey::from(&private_key),
            private_key: Some(private_key),
            key_id,
        }
    }

    /// Creates a verification-only key from an RSA public key.
    #[must_use]
    pub const fn from_public_key(public_key: RsaPublicKey, key_id: Option<String>) -> Self {
        Self {
            public_key,
            private_key: None,
            key_id,
        }
    }

    /// Creates a key from a PKCS#8 PEM-encoded private key.
    pub fn from_pkcs8_pem(pem: &str, key_id: Option<String>) -> Saml2Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Saml2Error::Crypto(format!("invalid RSA PKCS#8 key: {e}")))?;
        Ok(Self::from_private_key(private_key, key_id))
    }

    /// Returns a verification-only copy of this key.
    #[must_use]
    pub fn public_only(&self) -> Self {
        Self {
            public_key: self.public_key.clone(),
            private_key: None,
            key_id: self.key_id.clone(),
        }
    }

    fn algorithm(uri: &str) -> Saml2Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_uri(uri)
            .ok_or_else(|| Saml2Error::UnsupportedAlgorithm(uri.to_string()))
    }
}

impl fmt::Debug for RsaSecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSecurityKey")
            .field("key_id", &self.key_id)
            .field("can_sign", &self.private_key.is_some())
            .finish()
    }
}

impl SecurityKey for RsaSecurityKey {
    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn verify(&self, algorithm: &str, data: &[u8], signature: &[u8]) -> Saml2Result<bool> {
        let signature = pkcs1v15::Signature::try_from(signature)
            .map_err(|e| Saml2Error::Crypto(format!("malformed signature bytes: {e}")))?;

        let verified = match Self::algorithm(algorithm)? {
            SignatureAlgorithm::RsaSha256 => {
                pkcs1v15::VerifyingKey::<Sha256>::new(self.public_key.clone())
                    .verify(data, &signature)
                    .is_ok()
            }
            SignatureAlgorithm::RsaSha384 => {
                pkcs1v15::VerifyingKey::<Sha384>::new(self.public_key.clone())
                    .verify(data, &signature)
                    .is_ok()
            }
            SignatureAlgorithm::RsaSha512 => {
                pkcs1v15::VerifyingKey::<Sha512>::new(self.public_key.clone())
                    .verify(data, &signature)
                    .is_ok()
            }
        };
        Ok(verified)
    }

    fn sign(&self, algorithm: &str, data: &[u8]) -> Saml2Result<Vec<u8>> {
        let private_key = self.private_key.as_ref().ok_or_else(|| {
            Saml2Error::Crypto("key has no private component for signing".to_string())
        })?;

        let bytes = match Self::algorithm(algorithm)? {
            SignatureAlgorithm::RsaSha256 => {
                pkcs1v15::SigningKey::<Sha256>::new(private_key.clone())
                    .sign(data)
                    .to_bytes()
            }
            SignatureAlgorithm::RsaSha384 => {
                pkcs1v15::SigningKey::<Sha384>::new(private_key.clone())
                    .sign(data)
                    .to_bytes()
            }
            SignatureAlgorithm::RsaSha512 => {
                pkcs1v15::SigningKey::<Sha512>::new(private_key.clone())
                    .sign(data)
                    .to_bytes()
            }
        };
        Ok(bytes.into_vec())
    }
}

/// Credentials used to sign an assertion on the creation path.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    /// The signing key.
    pub key: Arc<dyn SecurityKey>,

    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,

    /// Base64-encoded DER certificate to embed in the signature's
    /// `KeyInfo`, when available.
    pub certificate: Option<String>,
}

impl SigningCredentials {
    /// Creates signing credentials with the default RSA-SHA256 algorithm.
    #[must_use]
    pub fn new(key: Arc<dyn SecurityKey>) -> Self {
        Self {
            key,
            algorithm: SignatureAlgorithm::default(),
            certificate: None,
        }
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the certificate to embed in `KeyInfo` (base64-encoded DER).
    #[must_use]
    pub fn with_certificate(mut self, certificate: impl Into<String>) -> Self {
        self.certificate = Some(certificate.into());
        self
    }
}

/// Credentials for encrypting assertions.
///
/// Assertion encryption is not supported; a descriptor carrying these is
/// rejected at build time. The type exists so callers migrating from
/// encrypting stacks get a precise error rather than silent omission.
#[derive(Debug, Clone)]
pub struct EncryptingCredentials {
    /// The key-encryption key.
    pub key: Arc<dyn SecurityKey>,

    /// The data-encryption algorithm URI.
    pub algorithm: String,
}

/// Maps a signature key identifier to a candidate verification key from
/// the validation parameters.
///
/// Scans the single configured issuer signing key and then the key
/// collection, in order, returning the first whose `key_id` equals `kid`
/// under byte-exact comparison. Pure; no I/O.
#[must_use]
pub fn resolve_issuer_signing_key(
    kid: &str,
    parameters: &ValidationParameters,
) -> Option<Arc<dyn SecurityKey>> {
    parameters
        .issuer_signing_key
        .iter()
        .chain(parameters.issuer_signing_keys.iter())
        .find(|key| key.key_id() == Some(kid))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StubKey(&'static str);

    impl SecurityKey for StubKey {
        fn key_id(&self) -> Option<&str> {
            Some(self.0)
        }

        fn verify(&self, _: &str, _: &[u8], _: &[u8]) -> Saml2Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn resolver_prefers_single_key_over_collection() {
        let params = ValidationParameters::new()
            .with_issuer_signing_key(Arc::new(StubKey("k1")))
            .with_issuer_signing_keys(vec![Arc::new(StubKey("k1")), Arc::new(StubKey("k2"))]);

        let resolved = resolve_issuer_signing_key("k2", &params).expect("k2 resolves");
        assert_eq!(resolved.key_id(), Some("k2"));

        let resolved = resolve_issuer_signing_key("k1", &params).expect("k1 resolves");
        assert_eq!(resolved.key_id(), Some("k1"));
    }

    #[test]
    fn resolver_is_byte_exact() {
        let params = ValidationParameters::new().with_issuer_signing_key(Arc::new(StubKey("K1")));
        assert!(resolve_issuer_signing_key("k1", &params).is_none());
        assert!(resolve_issuer_signing_key("K1", &params).is_some());
    }

    #[test]
    fn verification_only_key_cannot_sign() {
        let key = StubKey("k");
        let err = key
            .sign("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256", b"data")
            .unwrap_err();
        assert!(matches!(err, Saml2Error::Crypto(_)));
    }
}
