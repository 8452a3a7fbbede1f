//! SAML2 token handler error types.
//!
//! Provides error types for token reading, signature verification,
//! condition validation and assertion construction.

use std::fmt;

use thiserror::Error;

/// Result type for SAML2 token operations.
pub type Saml2Result<T> = Result<T, Saml2Error>;

/// Diagnostic trail collected while trial-verifying a signature against a
/// set of candidate keys.
///
/// Carried by [`Saml2Error::InvalidSignature`] so callers can see which
/// keys were attempted and why each one failed.
#[derive(Debug, Clone, Default)]
pub struct SignatureDiagnostics {
    /// Key identifiers (or a placeholder for unnamed keys) that were tried.
    pub keys_tried: Vec<String>,
    /// Per-key verification failure descriptions, parallel to `keys_tried`.
    pub failures: Vec<String>,
    /// Set when no candidate verification key was available at all.
    pub empty_key_set: bool,
}

impl SignatureDiagnostics {
    /// Creates a diagnostics payload from a single failure description.
    #[must_use]
    pub fn from_reason(reason: impl Into<String>) -> Self {
        Self {
            keys_tried: Vec::new(),
            failures: vec![reason.into()],
            empty_key_set: false,
        }
    }

    /// Records one failed attempt against a candidate key.
    pub fn record_failure(&mut self, key_id: Option<&str>, reason: impl Into<String>) {
        self.keys_tried
            .push(key_id.unwrap_or("<unnamed key>").to_string());
        self.failures.push(reason.into());
    }
}

impl fmt::Display for SignatureDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty_key_set {
            return write!(f, "no candidate verification keys were available");
        }
        if self.keys_tried.is_empty() {
            return match self.failures.first() {
                Some(reason) => write!(f, "{reason}"),
                None => write!(f, "signature could not be verified"),
            };
        }
        write!(f, "{} key(s) tried:", self.keys_tried.len())?;
        for (key, reason) in self.keys_tried.iter().zip(&self.failures) {
            write!(f, " [{key}: {reason}]")?;
        }
        Ok(())
    }
}

/// SAML2 token handler errors.
#[derive(Debug, Error)]
pub enum Saml2Error {
    /// Input exceeds the configured maximum token size.
    #[error("token size {size} bytes exceeds the configured maximum of {max} bytes")]
    OversizeInput {
        /// Size of the rejected input in bytes.
        size: usize,
        /// The configured maximum token size.
        max: usize,
    },

    /// Input is not a well-formed SAML2 assertion.
    #[error("malformed SAML2 assertion: {0}")]
    Malformed(String),

    /// The token carries no signature while the validation parameters
    /// require signed tokens.
    #[error("token is unsigned but the validation parameters require signed tokens")]
    MissingSignature,

    /// Signature verification failed against every candidate key, or a
    /// signature-validator override returned an unusable result.
    #[error("signature validation failed: {0}")]
    InvalidSignature(SignatureDiagnostics),

    /// The signature named a key identifier but none of the configured
    /// issuer signing keys matched it. Refreshing issuer metadata is the
    /// usual remedy.
    #[error("no issuer signing key matched the signature key identifier '{kid}'; issuer key metadata may be stale")]
    SignatureKeyNotFound {
        /// The unmatched key identifier from the signature's `KeyInfo`.
        kid: String,
    },

    /// The assertion has no `Subject` element.
    #[error("assertion has no subject")]
    MissingSubject,

    /// The token descriptor carries no issuer.
    #[error("token descriptor has no issuer")]
    MissingIssuer,

    /// The subject identity carries more than one name identifier claim.
    #[error("subject identity contains more than one name identifier claim")]
    DuplicateNameIdentifier,

    /// No audience restriction matched the validation parameters.
    #[error("invalid audience: token audiences {actual:?} matched none of {expected:?}")]
    InvalidAudience {
        /// Audiences accepted by the validation parameters.
        expected: Vec<String>,
        /// Audience URIs carried by the assertion.
        actual: Vec<String>,
    },

    /// The assertion issuer was not accepted.
    #[error("invalid issuer: '{issuer}'")]
    InvalidIssuer {
        /// The rejected issuer value.
        issuer: String,
    },

    /// The assertion (or a subject confirmation) is outside its validity
    /// window.
    #[error("token lifetime invalid at {now}: valid {}..{}", fmt_instant(.not_before), fmt_instant(.not_on_or_after))]
    InvalidLifetime {
        /// Lower bound of the violated window, when declared.
        not_before: Option<chrono::DateTime<chrono::Utc>>,
        /// Upper bound of the violated window, when declared.
        not_on_or_after: Option<chrono::DateTime<chrono::Utc>>,
        /// The instant at which validation was performed.
        now: chrono::DateTime<chrono::Utc>,
    },

    /// A replay validator rejected the token as already seen.
    #[error("token has already been validated once and is marked one-time-use")]
    TokenReplayed,

    /// A condition was encountered that the default pipeline cannot
    /// enforce; a replaying/proxy-aware stage must be supplied.
    #[error("condition '{0}' requires an overriding validator stage")]
    RequiresOverride(&'static str),

    /// The authentication context uses a declaration reference, which is
    /// not supported.
    #[error("authentication context declaration references are not supported")]
    UnsupportedAuthnContext,

    /// More than one delegated-actor attribute was present at the same
    /// delegation level.
    #[error("more than one Actor attribute present at a single delegation level")]
    NestedActorConflict,

    /// A name or attribute format string was not an absolute URI.
    #[error("'{0}' is not a valid absolute URI")]
    InvalidNameFormat(String),

    /// Handler or descriptor configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An algorithm URI is not supported by this implementation.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

fn fmt_instant(instant: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    instant.map_or_else(|| "*".to_string(), |t| t.to_rfc3339())
}

impl Saml2Error {
    /// Shorthand for an [`Saml2Error::InvalidSignature`] with a single
    /// failure reason.
    #[must_use]
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature(SignatureDiagnostics::from_reason(reason))
    }

    /// Returns a stable identifying code for this error kind.
    ///
    /// Codes are stable across releases and suitable for log correlation.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OversizeInput { .. } => "SAML2:oversize_input",
            Self::Malformed(_) => "SAML2:malformed",
            Self::MissingSignature => "SAML2:missing_signature",
            Self::InvalidSignature(_) => "SAML2:invalid_signature",
            Self::SignatureKeyNotFound { .. } => "SAML2:signature_key_not_found",
            Self::MissingSubject => "SAML2:missing_subject",
            Self::MissingIssuer => "SAML2:missing_issuer",
            Self::DuplicateNameIdentifier => "SAML2:duplicate_name_identifier",
            Self::InvalidAudience { .. } => "SAML2:invalid_audience",
            Self::InvalidIssuer { .. } => "SAML2:invalid_issuer",
            Self::InvalidLifetime { .. } => "SAML2:invalid_lifetime",
            Self::TokenReplayed => "SAML2:token_replayed",
            Self::RequiresOverride(_) => "SAML2:requires_override",
            Self::UnsupportedAuthnContext => "SAML2:unsupported_authn_context",
            Self::NestedActorConflict => "SAML2:nested_actor_conflict",
            Self::InvalidNameFormat(_) => "SAML2:invalid_name_format",
            Self::InvalidConfiguration(_) => "SAML2:invalid_configuration",
            Self::UnsupportedAlgorithm(_) => "SAML2:unsupported_algorithm",
            Self::Crypto(_) => "SAML2:crypto",
        }
    }
}

impl From<quick_xml::Error> for Saml2Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<base64::DecodeError> for Saml2Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Malformed(format!("base64 decode error: {err}"))
    }
}
