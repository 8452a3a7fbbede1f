//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{constants, NameId};
use crate::keys::{SecurityKey, SigningCredentials};
use crate::signature::Signature;

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the authority that issued this assertion.
    pub issuer: String,

    /// The enveloped XML signature, when the assertion was parsed from a
    /// signed document or is due to be signed.
    #[serde(skip)]
    pub signature: Option<Signature>,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Additional advisory information, preserved as a raw XML fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,

    /// Statements about the subject, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<Statement>,

    /// The key that successfully verified this assertion's signature.
    ///
    /// Set once by the signature verifier; never populated on the
    /// creation path.
    #[serde(skip)]
    pub signing_key: Option<Arc<dyn SecurityKey>>,

    /// Credentials used to sign the assertion when it is written.
    #[serde(skip)]
    pub signing_credentials: Option<SigningCredentials>,
}

fn default_version() -> String {
    constants::SAML_VERSION.to_string()
}

impl Assertion {
    /// Creates a new assertion.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: format!("_id{}", uuid::Uuid::new_v4()),
            version: constants::SAML_VERSION.to_string(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            signature: None,
            subject: None,
            conditions: None,
            advice: None,
            statements: Vec::new(),
            signing_key: None,
            signing_credentials: None,
        }
    }

    /// Creates a new assertion with a custom ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(issuer)
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Appends a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Returns the attribute statements in document order.
    pub fn attribute_statements(&self) -> impl Iterator<Item = &AttributeStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Attribute(stmt) => Some(stmt),
            _ => None,
        })
    }

    /// Returns the authentication statements in document order.
    pub fn authn_statements(&self) -> impl Iterator<Item = &AuthnStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Authn(stmt) => Some(stmt),
            _ => None,
        })
    }
}

/// Subject of an assertion.
///
/// Identifies the principal that is the subject of all statements in the
/// assertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmations, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }
}

/// Subject confirmation.
///
/// Information that allows the assertion consumer to confirm the subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: String,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self {
            method: constants::confirmation_methods::BEARER.to_string(),
            confirmation_data: None,
        }
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.confirmation_data = Some(data);
        self
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Time before which the subject cannot be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// IP address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Conditions for assertion validity.
///
/// The two timestamps define a half-open interval
/// `[not_before, not_on_or_after)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,

    /// One-time use condition.
    #[serde(default)]
    pub one_time_use: bool,

    /// Proxy restriction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_restriction: Option<ProxyRestriction>,
}

impl Conditions {
    /// Creates conditions valid over the given window.
    #[must_use]
    pub const fn over(
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            not_before,
            not_on_or_after,
            audience_restrictions: Vec::new(),
            one_time_use: false,
            proxy_restriction: None,
        }
    }

    /// Adds an audience restriction with a single audience URI.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }

    /// Sets the one-time use flag.
    #[must_use]
    pub const fn one_time_use(mut self) -> Self {
        self.one_time_use = true;
        self
    }
}

/// Audience restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// List of valid audiences.
    pub audiences: Vec<String>,
}

/// Proxy restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyRestriction {
    /// Maximum number of proxies allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// List of allowed proxy audiences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

/// A statement within an assertion.
///
/// Unknown statement variants are preserved for pass-through but do not
/// contribute claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    /// Attribute statement.
    Attribute(AttributeStatement),
    /// Authentication statement.
    Authn(AuthnStatement),
    /// Authorization decision statement.
    AuthzDecision(AuthzDecisionStatement),
    /// An unrecognized statement, preserved verbatim.
    Unknown {
        /// The raw XML of the statement element.
        raw: String,
    },
}

/// Attribute statement.
///
/// Contains attributes about the subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// List of attributes.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    /// Creates a new empty attribute statement.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name (typically a URI).
    pub name: String,

    /// The format of the attribute name (an absolute URI).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// A human-readable name for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// XML schema type of the attribute values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsi_type: Option<String>,

    /// The issuer that originally asserted this attribute, when it differs
    /// from the assertion issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_issuer: Option<String>,

    /// The attribute values, in document order.
    pub values: Vec<String>,
}

impl Attribute {
    /// Creates a new attribute with a single value.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            xsi_type: None,
            original_issuer: None,
            values: vec![value.into()],
        }
    }

    /// Creates a new attribute with multiple values.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            xsi_type: None,
            original_issuer: None,
            values,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_name_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// The key under which attributes collapse: equal keys merge into one
    /// attribute with concatenated values.
    #[must_use]
    pub fn collapse_key(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.name.as_str(),
            self.xsi_type.as_deref(),
            self.original_issuer.as_deref(),
        )
    }
}

/// Authentication statement.
///
/// Describes the act of authentication performed by the subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// The time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// The session index (for session management).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Time at which the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// The authentication context.
    pub authn_context: AuthnContext,

    /// The subject locality information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<SubjectLocality>,
}

impl AuthnStatement {
    /// Creates a new authentication statement with a context class
    /// reference.
    #[must_use]
    pub fn new(instant: DateTime<Utc>, class_reference: impl Into<String>) -> Self {
        Self {
            authn_instant: instant,
            session_index: None,
            session_not_on_or_after: None,
            authn_context: AuthnContext {
                class_reference: Some(class_reference.into()),
                declaration_reference: None,
            },
            subject_locality: None,
        }
    }
}

/// Authentication context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthnContext {
    /// Authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_reference: Option<String>,

    /// Authentication context declaration reference. Not supported by the
    /// claims translator; its presence fails validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_reference: Option<String>,
}

/// Subject locality information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectLocality {
    /// IP address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// DNS name of the system from which the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// Authorization decision statement.
///
/// A no-op for claims translation; preserved for pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzDecisionStatement {
    /// The resource the decision applies to.
    pub resource: String,

    /// The decision rendered by the authority.
    pub decision: AccessDecision,

    /// The actions authorized or denied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AuthzAction>,
}

/// Authorization decision verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    /// The action is permitted.
    Permit,
    /// The action is denied.
    Deny,
    /// The authority cannot determine whether the action is permitted.
    Indeterminate,
}

impl AccessDecision {
    /// Returns the schema token for this decision.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Permit => "Permit",
            Self::Deny => "Deny",
            Self::Indeterminate => "Indeterminate",
        }
    }

    /// Parses a decision from its schema token.
    #[must_use]
    pub fn from_str_token(token: &str) -> Option<Self> {
        match token {
            "Permit" => Some(Self::Permit),
            "Deny" => Some(Self::Deny),
            "Indeterminate" => Some(Self::Indeterminate),
            _ => None,
        }
    }
}

/// An action within an authorization decision statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzAction {
    /// The namespace in which the action name is interpreted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// The action name.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_creation() {
        let assertion = Assertion::new("https://idp.example.com")
            .with_subject(Subject::new(NameId::email("user@example.com")))
            .with_conditions(
                Conditions::over(Some(Utc::now()), Some(Utc::now() + chrono::Duration::minutes(5)))
                    .with_audience("https://sp.example.com"),
            )
            .with_statement(Statement::Attribute(
                AttributeStatement::new().with_attribute(Attribute::single("role", "admin")),
            ));

        assert!(!assertion.id.is_empty());
        assert_eq!(assertion.version, "2.0");
        assert!(assertion.subject.is_some());
        assert_eq!(assertion.attribute_statements().count(), 1);
        assert_eq!(assertion.authn_statements().count(), 0);
    }

    #[test]
    fn bearer_confirmation_method() {
        let confirmation = SubjectConfirmation::bearer();
        assert_eq!(confirmation.method, "urn:oasis:names:tc:SAML:2.0:cm:bearer");
        assert!(confirmation.confirmation_data.is_none());
    }

    #[test]
    fn attribute_collapse_key_distinguishes_origin() {
        let a = Attribute::single("role", "admin");
        let mut b = Attribute::single("role", "reader");
        assert_eq!(a.collapse_key(), b.collapse_key());

        b.original_issuer = Some("https://other.example".to_string());
        assert_ne!(a.collapse_key(), b.collapse_key());
    }

    #[test]
    fn access_decision_token_roundtrip() {
        for decision in [
            AccessDecision::Permit,
            AccessDecision::Deny,
            AccessDecision::Indeterminate,
        ] {
            assert_eq!(
                AccessDecision::from_str_token(decision.as_str()),
                Some(decision)
            );
        }
    }
}
