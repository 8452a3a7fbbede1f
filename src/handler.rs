//! The SAML2 security token handler.
//!
//! Validation is a linear pipeline: parse, verify the signature against
//! candidate keys, validate conditions, validate subject confirmations,
//! resolve the issuer, check replay, build the claims identity. Any
//! stage failure is terminal. Creation runs the reverse path from a
//! token descriptor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::actor;
use crate::attributes::attributes_for_identity;
use crate::claims::{issuer_or_default, Claim, ClaimsIdentity, ClaimsPrincipal};
use crate::error::{Saml2Error, Saml2Result, SignatureDiagnostics};
use crate::keys::{resolve_issuer_signing_key, EncryptingCredentials, SecurityKey, SigningCredentials};
use crate::serializer::{format_instant, root_is_assertion, Saml2Serializer};
use crate::signature::sign_assertion_xml;
use crate::transforms::{DefaultTransformFactory, TransformFactory};
use crate::types::constants::{
    claim_properties, claim_types, claim_value_types, DEFAULT_AUTHENTICATION_TYPE,
};
use crate::types::{
    Assertion, AttributeStatement, AuthnStatement, Conditions, NameId, Statement, Subject,
    SubjectConfirmation,
};
use crate::validation::{
    validate_audience, validate_issuer, validate_lifetime, ValidationParameters,
};

/// Default maximum accepted token size, in bytes.
pub const DEFAULT_MAXIMUM_TOKEN_SIZE: usize = 256 * 1024;

/// A SAML2 security token: an assertion plus the key that verified it.
#[derive(Debug, Clone)]
pub struct Saml2SecurityToken {
    /// The underlying assertion.
    pub assertion: Assertion,
}

impl Saml2SecurityToken {
    /// Wraps an assertion as a token.
    #[must_use]
    pub const fn new(assertion: Assertion) -> Self {
        Self { assertion }
    }

    /// The assertion identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.assertion.id
    }

    /// The assertion issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.assertion.issuer
    }

    /// The key that verified this token's signature, when validation has
    /// succeeded.
    #[must_use]
    pub fn signing_key(&self) -> Option<&Arc<dyn SecurityKey>> {
        self.assertion.signing_key.as_ref()
    }
}

/// Describes the token to be created by [`Saml2TokenHandler::create_token`].
#[derive(Debug, Clone, Default)]
pub struct SecurityTokenDescriptor {
    /// The issuer of the token. Required, non-empty.
    pub issuer: Option<String>,

    /// The subject identity whose claims populate the token.
    pub subject: Option<ClaimsIdentity>,

    /// Start of the validity window.
    pub not_before: Option<DateTime<Utc>>,

    /// End of the validity window.
    pub expires: Option<DateTime<Utc>>,

    /// Audience URI restricting the token.
    pub audience: Option<String>,

    /// Credentials to sign the token with.
    pub signing_credentials: Option<SigningCredentials>,

    /// Credentials to encrypt the token with. Unsupported; rejected at
    /// build time when present.
    pub encrypting_credentials: Option<EncryptingCredentials>,
}

impl SecurityTokenDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the subject identity.
    #[must_use]
    pub fn with_subject(mut self, subject: ClaimsIdentity) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_lifetime(
        mut self,
        not_before: Option<DateTime<Utc>>,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        self.not_before = not_before;
        self.expires = expires;
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the signing credentials.
    #[must_use]
    pub fn with_signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing_credentials = Some(credentials);
        self
    }
}

/// Creates, reads, writes and validates SAML 2.0 assertions.
///
/// Reentrant and safe for concurrent validations provided its
/// configuration (serializer, transform factory, maximum token size) is
/// not changed while validations are in flight; treat a handler as
/// immutable once shared.
#[derive(Debug, Clone)]
pub struct Saml2TokenHandler {
    serializer: Saml2Serializer,
    transform_factory: Arc<dyn TransformFactory>,
    max_token_size: usize,
}

impl Default for Saml2TokenHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Saml2TokenHandler {
    /// Creates a handler with the default serializer, transform factory
    /// and maximum token size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            serializer: Saml2Serializer::new(),
            transform_factory: Arc::new(DefaultTransformFactory),
            max_token_size: DEFAULT_MAXIMUM_TOKEN_SIZE,
        }
    }

    /// Sets the maximum accepted token size, builder style.
    pub fn with_max_token_size(mut self, size: usize) -> Saml2Result<Self> {
        self.set_max_token_size(size)?;
        Ok(self)
    }

    /// Replaces the transform factory, builder style.
    #[must_use]
    pub fn with_transform_factory(mut self, factory: Arc<dyn TransformFactory>) -> Self {
        self.transform_factory = factory;
        self
    }

    /// Replaces the serializer, builder style.
    #[must_use]
    pub const fn with_serializer(mut self, serializer: Saml2Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// The maximum accepted token size, in bytes.
    #[must_use]
    pub const fn max_token_size(&self) -> usize {
        self.max_token_size
    }

    /// Sets the maximum accepted token size.
    ///
    /// Must not be called while validations are in flight on a shared
    /// handler.
    pub fn set_max_token_size(&mut self, size: usize) -> Saml2Result<()> {
        if size < 1 {
            return Err(Saml2Error::InvalidConfiguration(
                "maximum token size must be at least 1 byte".to_string(),
            ));
        }
        self.max_token_size = size;
        Ok(())
    }

    /// Returns true when the input could be read as a SAML2 assertion:
    /// within the size limit and rooted at the SAML2 `Assertion`
    /// element. Never errors.
    #[must_use]
    pub fn can_read_token(&self, token: &[u8]) -> bool {
        if token.is_empty() || token.len() > self.max_token_size {
            return false;
        }
        let Ok(text) = std::str::from_utf8(token) else {
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        root_is_assertion(text)
    }

    /// Parses a token into its in-memory assertion without validating
    /// anything beyond structure.
    pub fn read_token(&self, token: &[u8]) -> Saml2Result<Saml2SecurityToken> {
        let text = self.token_text(token)?;
        if !root_is_assertion(text) {
            return Err(Saml2Error::Malformed(
                "root element is not a SAML2 Assertion".to_string(),
            ));
        }
        let assertion = self.serializer.read_assertion(text)?;
        Ok(Saml2SecurityToken::new(assertion))
    }

    /// Serializes a token, signing it when the assertion carries signing
    /// credentials.
    pub fn write_token(&self, token: &Saml2SecurityToken) -> Saml2Result<String> {
        let xml = self.serializer.write_assertion(&token.assertion)?;
        match &token.assertion.signing_credentials {
            Some(credentials) => sign_assertion_xml(
                &xml,
                &token.assertion.id,
                credentials,
                self.transform_factory.as_ref(),
            ),
            None => Ok(xml),
        }
    }

    /// Validates a token and produces the claims principal it represents
    /// together with the verified token.
    pub fn validate_token(
        &self,
        token: &[u8],
        parameters: &ValidationParameters,
    ) -> Saml2Result<(ClaimsPrincipal, Saml2SecurityToken)> {
        let validated = self.validate_signature(token, parameters)?;
        self.validate_conditions(&validated.assertion, parameters)?;
        self.validate_subject(&validated.assertion, parameters)?;

        let issuer = match &parameters.issuer_validator {
            Some(validator) => validator(&validated.assertion.issuer, &validated.assertion, parameters)?,
            None => validate_issuer(&validated.assertion.issuer, &validated.assertion, parameters)?,
        };
        let issuer = issuer_or_default(&issuer).to_string();

        if let Some(replay) = &parameters.replay_validator {
            replay(&validated.assertion, parameters)?;
        }

        let identity = self.create_claims_identity(&validated.assertion, &issuer, parameters, token)?;
        tracing::debug!(
            token_id = %validated.assertion.id,
            issuer = %issuer,
            claims = identity.claims.len(),
            "token validated"
        );
        Ok((ClaimsPrincipal::new(identity), validated))
    }

    /// Verifies the token signature against the candidate keys from the
    /// validation parameters and returns the parsed token with its
    /// signing key stamped.
    pub fn validate_signature(
        &self,
        token: &[u8],
        parameters: &ValidationParameters,
    ) -> Saml2Result<Saml2SecurityToken> {
        if let Some(validator) = &parameters.signature_validator {
            return match validator(token, parameters)? {
                Some(validated) => Ok(validated),
                None => Err(Saml2Error::invalid_signature(
                    "signature validator override returned no token",
                )),
            };
        }

        let mut validated = self.read_token(token)?;

        let Some(mut signature) = validated.assertion.signature.take() else {
            if parameters.require_signed_tokens {
                return Err(Saml2Error::MissingSignature);
            }
            tracing::debug!(token_id = %validated.assertion.id, "accepting unsigned token");
            return Ok(validated);
        };
        signature.install_transform_factory(self.transform_factory.clone());
        validated.assertion.signature = Some(signature.clone());

        let candidates = Self::candidate_keys(&validated.assertion, parameters);

        if candidates.is_empty() {
            return Err(Saml2Error::InvalidSignature(SignatureDiagnostics {
                empty_key_set: true,
                ..SignatureDiagnostics::default()
            }));
        }

        let mut diagnostics = SignatureDiagnostics::default();
        for key in &candidates {
            match signature.verify(key.as_ref()) {
                Ok(()) => {
                    tracing::debug!(
                        token_id = %validated.assertion.id,
                        key_id = key.key_id().unwrap_or("<unnamed key>"),
                        "signature verified"
                    );
                    validated.assertion.signing_key = Some(key.clone());
                    return Ok(validated);
                }
                Err(err) => diagnostics.record_failure(key.key_id(), err.to_string()),
            }
        }

        if let Some(kid) = signature.kid() {
            if !candidates.iter().any(|key| key.key_id() == Some(kid)) {
                tracing::warn!(kid, "no candidate key matched the signature kid; issuer key metadata may be stale");
                return Err(Saml2Error::SignatureKeyNotFound {
                    kid: kid.to_string(),
                });
            }
        }
        Err(Saml2Error::InvalidSignature(diagnostics))
    }

    /// Builds the ordered candidate key list for trial verification.
    fn candidate_keys(
        assertion: &Assertion,
        parameters: &ValidationParameters,
    ) -> Vec<Arc<dyn SecurityKey>> {
        if let Some(resolver) = &parameters.issuer_signing_key_resolver {
            return resolver(assertion, parameters);
        }

        if let Some(kid) = assertion.signature.as_ref().and_then(|s| s.kid()) {
            if let Some(key) = resolve_issuer_signing_key(kid, parameters) {
                return vec![key];
            }
        }

        parameters
            .issuer_signing_key
            .iter()
            .chain(parameters.issuer_signing_keys.iter())
            .cloned()
            .collect()
    }

    /// Enforces the assertion's conditions.
    pub fn validate_conditions(
        &self,
        assertion: &Assertion,
        parameters: &ValidationParameters,
    ) -> Saml2Result<()> {
        let Some(conditions) = &assertion.conditions else {
            return Ok(());
        };

        if conditions.not_before.is_some() || conditions.not_on_or_after.is_some() {
            self.run_lifetime_validator(
                conditions.not_before,
                conditions.not_on_or_after,
                assertion,
                parameters,
            )?;
        }

        if conditions.one_time_use && parameters.replay_validator.is_none() {
            return Err(Saml2Error::RequiresOverride("OneTimeUse"));
        }
        if conditions.proxy_restriction.is_some() {
            return Err(Saml2Error::RequiresOverride("ProxyRestriction"));
        }

        for restriction in &conditions.audience_restrictions {
            match &parameters.audience_validator {
                Some(validator) => validator(&restriction.audiences, assertion, parameters)?,
                None => validate_audience(&restriction.audiences, assertion, parameters)?,
            }
        }
        Ok(())
    }

    /// Validates the subject and the lifetime of each subject
    /// confirmation.
    pub fn validate_subject(
        &self,
        assertion: &Assertion,
        parameters: &ValidationParameters,
    ) -> Saml2Result<()> {
        let Some(subject) = &assertion.subject else {
            return Err(Saml2Error::MissingSubject);
        };

        for confirmation in &subject.subject_confirmations {
            if let Some(data) = &confirmation.confirmation_data {
                self.run_lifetime_validator(
                    data.not_before,
                    data.not_on_or_after,
                    assertion,
                    parameters,
                )?;
            }
        }
        Ok(())
    }

    fn run_lifetime_validator(
        &self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
        assertion: &Assertion,
        parameters: &ValidationParameters,
    ) -> Saml2Result<()> {
        match &parameters.lifetime_validator {
            Some(validator) => validator(not_before, not_on_or_after, assertion, parameters),
            None => validate_lifetime(not_before, not_on_or_after, assertion, parameters),
        }
    }

    /// Translates a validated assertion into a claims identity.
    fn create_claims_identity(
        &self,
        assertion: &Assertion,
        issuer: &str,
        parameters: &ValidationParameters,
        raw_token: &[u8],
    ) -> Saml2Result<ClaimsIdentity> {
        let mut identity = match &parameters.claims_identity_factory {
            Some(factory) => factory(assertion, issuer, parameters),
            None => ClaimsIdentity::with_authentication_type(DEFAULT_AUTHENTICATION_TYPE),
        };

        if let Some(name_id) = assertion.subject.as_ref().and_then(|s| s.name_id.as_ref()) {
            let mut claim = Claim::new(claim_types::NAME_IDENTIFIER, &name_id.value, issuer);
            if let Some(format) = &name_id.format {
                claim =
                    claim.with_property(claim_properties::SAML_NAME_IDENTIFIER_FORMAT, format);
            }
            if let Some(qualifier) = &name_id.name_qualifier {
                claim = claim.with_property(
                    claim_properties::SAML_NAME_IDENTIFIER_NAME_QUALIFIER,
                    qualifier,
                );
            }
            if let Some(qualifier) = &name_id.sp_name_qualifier {
                claim = claim.with_property(
                    claim_properties::SAML_NAME_IDENTIFIER_SP_NAME_QUALIFIER,
                    qualifier,
                );
            }
            if let Some(id) = &name_id.sp_provided_id {
                claim = claim
                    .with_property(claim_properties::SAML_NAME_IDENTIFIER_SP_PROVIDED_ID, id);
            }
            identity.add_claim(claim);
        }

        // Attribute statements are processed in document order;
        // authentication statements are deferred until the claim set is
        // stable. Authorization decision statements contribute nothing.
        let mut deferred: Vec<&AuthnStatement> = Vec::new();
        for statement in &assertion.statements {
            match statement {
                Statement::Attribute(stmt) => {
                    self.process_attribute_statement(stmt, &mut identity, issuer)?;
                }
                Statement::Authn(stmt) => deferred.push(stmt),
                Statement::AuthzDecision(_) | Statement::Unknown { .. } => {}
            }
        }
        for statement in deferred {
            Self::process_authn_statement(statement, &mut identity, issuer)?;
        }

        if parameters.save_signin_token {
            identity.bootstrap_token = Some(String::from_utf8_lossy(raw_token).into_owned());
        }
        Ok(identity)
    }

    fn process_attribute_statement(
        &self,
        statement: &AttributeStatement,
        identity: &mut ClaimsIdentity,
        issuer: &str,
    ) -> Saml2Result<()> {
        for attribute in &statement.attributes {
            if attribute.name == claim_types::ACTOR {
                if identity.actor.is_some() {
                    return Err(Saml2Error::NestedActorConflict);
                }
                let value = attribute.values.first().ok_or_else(|| {
                    Saml2Error::Malformed("Actor attribute has no value".to_string())
                })?;
                identity.actor = Some(Box::new(actor::decode_actor(&self.serializer, value)?));
                continue;
            }

            for value in &attribute.values {
                let mut claim = Claim::new(&attribute.name, value, issuer).with_original_issuer(
                    attribute.original_issuer.as_deref().unwrap_or(issuer),
                );
                if let Some(xsi_type) = &attribute.xsi_type {
                    claim = claim.with_value_type(xsi_type);
                }
                if let Some(format) = &attribute.name_format {
                    claim = claim
                        .with_property(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT, format);
                }
                if let Some(name) = &attribute.friendly_name {
                    claim = claim
                        .with_property(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME, name);
                }
                identity.add_claim(claim);
            }
        }
        Ok(())
    }

    fn process_authn_statement(
        statement: &AuthnStatement,
        identity: &mut ClaimsIdentity,
        issuer: &str,
    ) -> Saml2Result<()> {
        if statement.authn_context.declaration_reference.is_some() {
            return Err(Saml2Error::UnsupportedAuthnContext);
        }
        if let Some(class_reference) = &statement.authn_context.class_reference {
            identity.add_claim(Claim::new(
                claim_types::AUTHENTICATION_METHOD,
                class_reference,
                issuer,
            ));
        }
        identity.add_claim(
            Claim::new(
                claim_types::AUTHENTICATION_INSTANT,
                format_instant(statement.authn_instant),
                issuer,
            )
            .with_value_type(claim_value_types::DATE_TIME),
        );
        Ok(())
    }

    /// Creates a token from a descriptor.
    pub fn create_token(&self, descriptor: &SecurityTokenDescriptor) -> Saml2Result<Saml2SecurityToken> {
        if descriptor.encrypting_credentials.is_some() {
            return Err(Saml2Error::InvalidConfiguration(
                "assertion encryption is not supported".to_string(),
            ));
        }

        let issuer = descriptor
            .issuer
            .as_deref()
            .filter(|issuer| !issuer.trim().is_empty())
            .ok_or(Saml2Error::MissingIssuer)?;

        let mut assertion = Assertion::new(issuer);
        assertion.subject = Some(Self::build_subject(descriptor.subject.as_ref())?);

        if descriptor.not_before.is_some()
            || descriptor.expires.is_some()
            || descriptor.audience.as_deref().is_some_and(|a| !a.is_empty())
        {
            let mut conditions = Conditions::over(descriptor.not_before, descriptor.expires);
            if let Some(audience) = descriptor.audience.as_deref().filter(|a| !a.is_empty()) {
                conditions = conditions.with_audience(audience);
            }
            assertion.conditions = Some(conditions);
        }

        if let Some(identity) = &descriptor.subject {
            let attributes = attributes_for_identity(
                identity,
                &[
                    claim_types::NAME_IDENTIFIER,
                    claim_types::AUTHENTICATION_INSTANT,
                    claim_types::AUTHENTICATION_METHOD,
                ],
                &self.serializer,
            )?;
            if !attributes.is_empty() {
                assertion
                    .statements
                    .push(Statement::Attribute(AttributeStatement { attributes }));
            }
        }

        assertion.signing_credentials = descriptor.signing_credentials.clone();
        tracing::debug!(token_id = %assertion.id, issuer = %assertion.issuer, "token created");
        Ok(Saml2SecurityToken::new(assertion))
    }

    /// Builds the subject element from the descriptor's identity: the
    /// single name identifier claim (duplicates are a hard error) plus a
    /// bearer confirmation.
    fn build_subject(identity: Option<&ClaimsIdentity>) -> Saml2Result<Subject> {
        let mut subject = Subject::default();

        if let Some(identity) = identity {
            let mut name_claims = identity.find_all(claim_types::NAME_IDENTIFIER);
            if let Some(claim) = name_claims.next() {
                if name_claims.next().is_some() {
                    return Err(Saml2Error::DuplicateNameIdentifier);
                }

                let mut name_id = NameId::new(&claim.value);
                if let Some(format) =
                    claim.properties.get(claim_properties::SAML_NAME_IDENTIFIER_FORMAT)
                {
                    if Url::parse(format).is_err() {
                        return Err(Saml2Error::InvalidNameFormat(format.clone()));
                    }
                    name_id.format = Some(format.clone());
                }
                name_id.name_qualifier = claim
                    .properties
                    .get(claim_properties::SAML_NAME_IDENTIFIER_NAME_QUALIFIER)
                    .cloned();
                name_id.sp_name_qualifier = claim
                    .properties
                    .get(claim_properties::SAML_NAME_IDENTIFIER_SP_NAME_QUALIFIER)
                    .cloned();
                name_id.sp_provided_id = claim
                    .properties
                    .get(claim_properties::SAML_NAME_IDENTIFIER_SP_PROVIDED_ID)
                    .cloned();
                subject.name_id = Some(name_id);
            }
        }

        subject
            .subject_confirmations
            .push(SubjectConfirmation::bearer());
        Ok(subject)
    }

    fn token_text<'t>(&self, token: &'t [u8]) -> Saml2Result<&'t str> {
        if token.is_empty() {
            return Err(Saml2Error::Malformed("token is empty".to_string()));
        }
        if token.len() > self.max_token_size {
            return Err(Saml2Error::OversizeInput {
                size: token.len(),
                max: self.max_token_size,
            });
        }
        std::str::from_utf8(token)
            .map_err(|err| Saml2Error::Malformed(format!("token is not valid UTF-8: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_with_name(name: &str) -> SecurityTokenDescriptor {
        SecurityTokenDescriptor::new()
            .with_issuer("https://idp.example/")
            .with_subject(ClaimsIdentity::new().with_claim(Claim::new(
                claim_types::NAME_IDENTIFIER,
                name,
                "https://idp.example/",
            )))
    }

    #[test]
    fn handler_rejects_zero_max_token_size() {
        let mut handler = Saml2TokenHandler::new();
        let err = handler.set_max_token_size(0).unwrap_err();
        assert!(matches!(err, Saml2Error::InvalidConfiguration(_)));
        assert!(Saml2TokenHandler::new().with_max_token_size(0).is_err());
    }

    #[test]
    fn can_read_gates_on_size() {
        let handler = Saml2TokenHandler::new().with_max_token_size(16).unwrap();
        let token = b"<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"/>";
        assert!(!handler.can_read_token(token));

        let err = handler.read_token(token).unwrap_err();
        assert!(matches!(err, Saml2Error::OversizeInput { .. }));
    }

    #[test]
    fn can_read_rejects_whitespace_and_foreign_roots() {
        let handler = Saml2TokenHandler::new();
        assert!(!handler.can_read_token(b""));
        assert!(!handler.can_read_token(b"   \n  "));
        assert!(!handler.can_read_token(b"<Response/>"));
        assert!(handler.can_read_token(
            b"<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" ID=\"_x\"/>"
        ));
    }

    #[test]
    fn create_token_requires_issuer() {
        let handler = Saml2TokenHandler::new();
        let err = handler
            .create_token(&SecurityTokenDescriptor::new())
            .unwrap_err();
        assert!(matches!(err, Saml2Error::MissingIssuer));

        let err = handler
            .create_token(&SecurityTokenDescriptor::new().with_issuer("  "))
            .unwrap_err();
        assert!(matches!(err, Saml2Error::MissingIssuer));
    }

    #[test]
    fn create_token_rejects_encrypting_credentials() {
        #[derive(Debug)]
        struct StubKey;
        impl SecurityKey for StubKey {
            fn key_id(&self) -> Option<&str> {
                None
            }
            fn verify(&self, _: &str, _: &[u8], _: &[u8]) -> Saml2Result<bool> {
                Ok(false)
            }
        }

        let mut descriptor = descriptor_with_name("alice");
        descriptor.encrypting_credentials = Some(EncryptingCredentials {
            key: Arc::new(StubKey),
            algorithm: "http://www.w3.org/2001/04/xmlenc#aes256-cbc".to_string(),
        });

        let err = Saml2TokenHandler::new().create_token(&descriptor).unwrap_err();
        assert!(matches!(err, Saml2Error::InvalidConfiguration(_)));
    }

    #[test]
    fn create_token_builds_bearer_subject() {
        let handler = Saml2TokenHandler::new();
        let token = handler.create_token(&descriptor_with_name("alice")).unwrap();

        let subject = token.assertion.subject.as_ref().expect("subject");
        assert_eq!(subject.name_id.as_ref().unwrap().value, "alice");
        assert_eq!(subject.subject_confirmations.len(), 1);
        assert_eq!(
            subject.subject_confirmations[0].method,
            "urn:oasis:names:tc:SAML:2.0:cm:bearer"
        );
    }

    #[test]
    fn duplicate_name_identifier_is_rejected() {
        let handler = Saml2TokenHandler::new();
        let identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice", "iss"))
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "bob", "iss"));
        let descriptor = SecurityTokenDescriptor::new()
            .with_issuer("https://idp.example/")
            .with_subject(identity);

        let err = handler.create_token(&descriptor).unwrap_err();
        assert!(matches!(err, Saml2Error::DuplicateNameIdentifier));
    }

    #[test]
    fn name_id_format_must_be_absolute() {
        let handler = Saml2TokenHandler::new();
        let identity = ClaimsIdentity::new().with_claim(
            Claim::new(claim_types::NAME_IDENTIFIER, "alice", "iss").with_property(
                claim_properties::SAML_NAME_IDENTIFIER_FORMAT,
                "relative/path",
            ),
        );
        let descriptor = SecurityTokenDescriptor::new()
            .with_issuer("https://idp.example/")
            .with_subject(identity);

        let err = handler.create_token(&descriptor).unwrap_err();
        assert!(matches!(err, Saml2Error::InvalidNameFormat(_)));
    }

    #[test]
    fn authentication_claims_are_left_out_of_attributes() {
        let handler = Saml2TokenHandler::new();
        let identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice", "iss"))
            .with_claim(Claim::new(claim_types::AUTHENTICATION_METHOD, "urn:m", "iss"))
            .with_claim(Claim::new(claim_types::AUTHENTICATION_INSTANT, "t", "iss"))
            .with_claim(Claim::new("email", "alice@example", "iss"));
        let descriptor = SecurityTokenDescriptor::new()
            .with_issuer("https://idp.example/")
            .with_subject(identity);

        let token = handler.create_token(&descriptor).unwrap();
        let attributes: Vec<_> = token
            .assertion
            .attribute_statements()
            .flat_map(|s| s.attributes.iter())
            .collect();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].name, "email");
    }
}
