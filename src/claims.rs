//! Claims-based identity model.
//!
//! Validated assertions are translated into a bag of [`Claim`]s held by a
//! [`ClaimsIdentity`]; delegation chains appear as a nested `actor`
//! identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::constants::{claim_types, claim_value_types, DEFAULT_ISSUER};

/// A single statement about a subject: a typed, issuer-attributed
/// attribute-value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// The claim type, a URI.
    pub claim_type: String,

    /// The claim value.
    pub value: String,

    /// The XML schema type of the value.
    pub value_type: String,

    /// The issuer that provided the claim.
    pub issuer: String,

    /// The issuer that originally asserted the claim.
    pub original_issuer: String,

    /// SAML-specific metadata such as name-id format or attribute
    /// friendly name, keyed by claim-property URI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Claim {
    /// Creates a string-typed claim attributed to the given issuer.
    #[must_use]
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        let issuer = issuer.into();
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: claim_value_types::STRING.to_string(),
            original_issuer: issuer.clone(),
            issuer,
            properties: BTreeMap::new(),
        }
    }

    /// Sets the value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    /// Sets the original issuer.
    #[must_use]
    pub fn with_original_issuer(mut self, original_issuer: impl Into<String>) -> Self {
        self.original_issuer = original_issuer.into();
        self
    }

    /// Attaches a SAML metadata property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A bag of claims representing an authenticated party.
///
/// At most one nested [`actor`](Self::actor) identity is permitted,
/// carrying the delegation chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// The type of authentication that produced this identity, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<String>,

    /// The claims, in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<Claim>,

    /// The delegated identity acting on behalf of this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Box<ClaimsIdentity>>,

    /// The raw token this identity was built from, retained when the
    /// validation parameters request it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_token: Option<String>,
}

impl ClaimsIdentity {
    /// Creates an empty identity with no authentication type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty identity with the given authentication type.
    #[must_use]
    pub fn with_authentication_type(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            ..Self::default()
        }
    }

    /// Appends a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Appends a claim, builder style.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Sets the actor, builder style.
    #[must_use]
    pub fn with_actor(mut self, actor: ClaimsIdentity) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    /// Returns all claims of the given type, in insertion order.
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
    }

    /// Returns the first claim of the given type.
    #[must_use]
    pub fn find_first<'a>(&'a self, claim_type: &'a str) -> Option<&'a Claim> {
        self.find_all(claim_type).next()
    }

    /// Returns the subject's name identifier claim value, when present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.as_str())
    }
}

/// A principal backed by one or more claims identities.
///
/// Token validation produces a principal with a single identity; the
/// type mirrors hosts that aggregate identities across tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
    /// The identities backing this principal.
    pub identities: Vec<ClaimsIdentity>,
}

impl ClaimsPrincipal {
    /// Creates a principal from a single identity.
    #[must_use]
    pub fn new(identity: ClaimsIdentity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    /// Returns the primary identity.
    #[must_use]
    pub fn identity(&self) -> Option<&ClaimsIdentity> {
        self.identities.first()
    }

    /// Returns all claims of the given type across all identities.
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> {
        self.identities
            .iter()
            .flat_map(move |i| i.find_all(claim_type))
    }
}

/// Returns `issuer` unless it is blank, in which case the
/// [`DEFAULT_ISSUER`] sentinel is substituted.
#[must_use]
pub fn issuer_or_default(issuer: &str) -> &str {
    if issuer.trim().is_empty() {
        DEFAULT_ISSUER
    } else {
        issuer
    }
}
