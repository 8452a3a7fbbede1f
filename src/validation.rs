//! Validation parameters and default validators.
//!
//! The validation pipeline is assembled from replaceable strategy
//! functions carried by [`ValidationParameters`]; an unset callback
//! means "use the default". Defaults are free functions so overrides can
//! delegate back to them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::claims::ClaimsIdentity;
use crate::error::{Saml2Error, Saml2Result};
use crate::handler::Saml2SecurityToken;
use crate::keys::SecurityKey;
use crate::types::Assertion;

/// Produces the ordered candidate key set for signature verification,
/// replacing the built-in key resolver.
pub type IssuerSigningKeyResolver =
    Arc<dyn Fn(&Assertion, &ValidationParameters) -> Vec<Arc<dyn SecurityKey>> + Send + Sync>;

/// Replaces the whole signature verification stage. Returning `Ok(None)`
/// is treated as a verification failure.
pub type SignatureValidator = Arc<
    dyn Fn(&[u8], &ValidationParameters) -> Saml2Result<Option<Saml2SecurityToken>> + Send + Sync,
>;

/// Replaces the default audience check for one audience restriction.
pub type AudienceValidator =
    Arc<dyn Fn(&[String], &Assertion, &ValidationParameters) -> Saml2Result<()> + Send + Sync>;

/// Replaces the default issuer check; returns the resolved issuer string
/// recorded on every claim.
pub type IssuerValidator =
    Arc<dyn Fn(&str, &Assertion, &ValidationParameters) -> Saml2Result<String> + Send + Sync>;

/// Replaces the default lifetime check.
pub type LifetimeValidator = Arc<
    dyn Fn(
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
            &Assertion,
            &ValidationParameters,
        ) -> Saml2Result<()>
        + Send
        + Sync,
>;

/// Detects token replay; also enables acceptance of `OneTimeUse`
/// conditions, which otherwise fail with
/// [`Saml2Error::RequiresOverride`].
pub type ReplayValidator =
    Arc<dyn Fn(&Assertion, &ValidationParameters) -> Saml2Result<()> + Send + Sync>;

/// Produces the claims identity the translator populates.
pub type ClaimsIdentityFactory =
    Arc<dyn Fn(&Assertion, &str, &ValidationParameters) -> ClaimsIdentity + Send + Sync>;

/// Supplies the current instant; unset means the system clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Configuration consumed by token validation.
///
/// Candidate keys are borrowed for the duration of a single validation
/// call; callers must not mutate them mid-flight.
#[derive(Clone)]
pub struct ValidationParameters {
    /// Whether unsigned tokens are rejected. Defaults to `true`.
    pub require_signed_tokens: bool,

    /// A single configured issuer signing key, scanned before
    /// [`issuer_signing_keys`](Self::issuer_signing_keys).
    pub issuer_signing_key: Option<Arc<dyn SecurityKey>>,

    /// Additional issuer signing keys, scanned in order.
    pub issuer_signing_keys: Vec<Arc<dyn SecurityKey>>,

    /// Resolver callback replacing the built-in key resolution.
    pub issuer_signing_key_resolver: Option<IssuerSigningKeyResolver>,

    /// Whole-token signature validation override.
    pub signature_validator: Option<SignatureValidator>,

    /// Audience validation override.
    pub audience_validator: Option<AudienceValidator>,

    /// Issuer validation override.
    pub issuer_validator: Option<IssuerValidator>,

    /// Lifetime validation override.
    pub lifetime_validator: Option<LifetimeValidator>,

    /// Replay validation callback, invoked at most once per validation.
    pub replay_validator: Option<ReplayValidator>,

    /// Claims identity factory.
    pub claims_identity_factory: Option<ClaimsIdentityFactory>,

    /// Audience URIs accepted by [`validate_audience`].
    pub valid_audiences: Vec<String>,

    /// Issuer values accepted by [`validate_issuer`]. Empty means any
    /// issuer is accepted as-is.
    pub valid_issuers: Vec<String>,

    /// Allowed clock skew applied on both ends of validity windows.
    /// Defaults to five minutes.
    pub clock_skew: Duration,

    /// Whether the validated identity retains the raw token it was built
    /// from.
    pub save_signin_token: bool,

    /// Clock override, mainly for tests.
    pub clock: Option<Clock>,
}

impl Default for ValidationParameters {
    fn default() -> Self {
        Self {
            require_signed_tokens: true,
            issuer_signing_key: None,
            issuer_signing_keys: Vec::new(),
            issuer_signing_key_resolver: None,
            signature_validator: None,
            audience_validator: None,
            issuer_validator: None,
            lifetime_validator: None,
            replay_validator: None,
            claims_identity_factory: None,
            valid_audiences: Vec::new(),
            valid_issuers: Vec::new(),
            clock_skew: Duration::minutes(5),
            save_signin_token: false,
            clock: None,
        }
    }
}

impl fmt::Debug for ValidationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationParameters")
            .field("require_signed_tokens", &self.require_signed_tokens)
            .field("issuer_signing_key", &self.issuer_signing_key)
            .field("issuer_signing_keys", &self.issuer_signing_keys)
            .field("has_key_resolver", &self.issuer_signing_key_resolver.is_some())
            .field("has_signature_validator", &self.signature_validator.is_some())
            .field("has_audience_validator", &self.audience_validator.is_some())
            .field("has_issuer_validator", &self.issuer_validator.is_some())
            .field("has_lifetime_validator", &self.lifetime_validator.is_some())
            .field("has_replay_validator", &self.replay_validator.is_some())
            .field("valid_audiences", &self.valid_audiences)
            .field("valid_issuers", &self.valid_issuers)
            .field("clock_skew", &self.clock_skew)
            .field("save_signin_token", &self.save_signin_token)
            .finish()
    }
}

impl ValidationParameters {
    /// Creates parameters with defaults: signed tokens required, five
    /// minutes of clock skew, no keys, no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unsigned tokens are rejected.
    #[must_use]
    pub const fn require_signed_tokens(mut self, require: bool) -> Self {
        self.require_signed_tokens = require;
        self
    }

    /// Sets the single issuer signing key.
    #[must_use]
    pub fn with_issuer_signing_key(mut self, key: Arc<dyn SecurityKey>) -> Self {
        self.issuer_signing_key = Some(key);
        self
    }

    /// Sets the issuer signing key collection.
    #[must_use]
    pub fn with_issuer_signing_keys(mut self, keys: Vec<Arc<dyn SecurityKey>>) -> Self {
        self.issuer_signing_keys = keys;
        self
    }

    /// Adds an accepted audience URI.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.valid_audiences.push(audience.into());
        self
    }

    /// Adds an accepted issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.valid_issuers.push(issuer.into());
        self
    }

    /// Sets the clock skew window.
    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Pins validation to a fixed instant; useful in tests.
    #[must_use]
    pub fn with_fixed_clock(mut self, instant: DateTime<Utc>) -> Self {
        self.clock = Some(Arc::new(move || instant));
        self
    }

    /// Sets whether the validated identity retains the raw token.
    #[must_use]
    pub const fn with_save_signin_token(mut self, save: bool) -> Self {
        self.save_signin_token = save;
        self
    }

    /// Sets the key resolver callback.
    #[must_use]
    pub fn with_issuer_signing_key_resolver(mut self, resolver: IssuerSigningKeyResolver) -> Self {
        self.issuer_signing_key_resolver = Some(resolver);
        self
    }

    /// Sets the signature validation override.
    #[must_use]
    pub fn with_signature_validator(mut self, validator: SignatureValidator) -> Self {
        self.signature_validator = Some(validator);
        self
    }

    /// Sets the audience validation override.
    #[must_use]
    pub fn with_audience_validator(mut self, validator: AudienceValidator) -> Self {
        self.audience_validator = Some(validator);
        self
    }

    /// Sets the issuer validation override.
    #[must_use]
    pub fn with_issuer_validator(mut self, validator: IssuerValidator) -> Self {
        self.issuer_validator = Some(validator);
        self
    }

    /// Sets the lifetime validation override.
    #[must_use]
    pub fn with_lifetime_validator(mut self, validator: LifetimeValidator) -> Self {
        self.lifetime_validator = Some(validator);
        self
    }

    /// Sets the replay validation callback.
    #[must_use]
    pub fn with_replay_validator(mut self, validator: ReplayValidator) -> Self {
        self.replay_validator = Some(validator);
        self
    }

    /// Sets the claims identity factory.
    #[must_use]
    pub fn with_claims_identity_factory(mut self, factory: ClaimsIdentityFactory) -> Self {
        self.claims_identity_factory = Some(factory);
        self
    }

    /// The instant validation is performed at.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match &self.clock {
            Some(clock) => clock(),
            None => Utc::now(),
        }
    }
}

/// Default lifetime validation.
///
/// The window is half-open, `[not_before, not_on_or_after)`, widened on
/// both ends by the configured clock skew.
pub fn validate_lifetime(
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    _assertion: &Assertion,
    parameters: &ValidationParameters,
) -> Saml2Result<()> {
    let now = parameters.now();
    let skew = parameters.clock_skew;

    if let Some(not_before) = not_before {
        if now + skew < not_before {
            return Err(Saml2Error::InvalidLifetime {
                not_before: Some(not_before),
                not_on_or_after,
                now,
            });
        }
    }
    if let Some(not_on_or_after) = not_on_or_after {
        if now - skew >= not_on_or_after {
            return Err(Saml2Error::InvalidLifetime {
                not_before,
                not_on_or_after: Some(not_on_or_after),
                now,
            });
        }
    }
    Ok(())
}

/// Default audience validation: at least one audience URI must equal
/// (ordinal) one of the configured valid audiences.
pub fn validate_audience(
    audiences: &[String],
    _assertion: &Assertion,
    parameters: &ValidationParameters,
) -> Saml2Result<()> {
    let matched = audiences
        .iter()
        .any(|a| parameters.valid_audiences.iter().any(|v| v == a));
    if matched {
        Ok(())
    } else {
        Err(Saml2Error::InvalidAudience {
            expected: parameters.valid_audiences.clone(),
            actual: audiences.to_vec(),
        })
    }
}

/// Default issuer validation.
///
/// With no configured valid issuers any issuer is accepted and returned
/// as-is; otherwise the issuer must equal (ordinal) one of them.
pub fn validate_issuer(
    issuer: &str,
    _assertion: &Assertion,
    parameters: &ValidationParameters,
) -> Saml2Result<String> {
    if parameters.valid_issuers.is_empty() || parameters.valid_issuers.iter().any(|v| v == issuer) {
        Ok(issuer.to_string())
    } else {
        Err(Saml2Error::InvalidIssuer {
            issuer: issuer.to_string(),
        })
    }
}
