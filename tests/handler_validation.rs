//! End-to-end token validation scenarios: create, sign, write, then
//! validate through the full pipeline.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;

use saml2_token::types::constants::{claim_properties, claim_types};
use saml2_token::{
    Claim, ClaimsIdentity, RsaSecurityKey, Saml2Error, Saml2TokenHandler, SecurityTokenDescriptor,
    SigningCredentials, ValidationParameters,
};

static KEY_ONE: OnceLock<RsaPrivateKey> = OnceLock::new();
static KEY_TWO: OnceLock<RsaPrivateKey> = OnceLock::new();

fn private_key(cell: &OnceLock<RsaPrivateKey>) -> RsaPrivateKey {
    cell.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate RSA key")
    })
    .clone()
}

fn signing_key(kid: &str) -> RsaSecurityKey {
    let cell = if kid == "k2" { &KEY_TWO } else { &KEY_ONE };
    RsaSecurityKey::from_private_key(private_key(cell), Some(kid.to_string()))
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn subject_identity() -> ClaimsIdentity {
    ClaimsIdentity::new()
        .with_claim(Claim::new(
            claim_types::NAME_IDENTIFIER,
            "alice",
            "https://idp.example/",
        ))
        .with_claim(Claim::new("email", "alice@example", "https://idp.example/"))
}

fn signed_token_xml(handler: &Saml2TokenHandler, kid: &str) -> String {
    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(subject_identity())
        .with_lifetime(
            Some(at("2024-01-01T00:00:00Z")),
            Some(at("2024-01-01T01:00:00Z")),
        )
        .with_audience("urn:rp:test")
        .with_signing_credentials(SigningCredentials::new(Arc::new(signing_key(kid))));

    let token = handler.create_token(&descriptor).expect("create token");
    handler.write_token(&token).expect("write token")
}

fn params_for(kid: &str, clock: &str) -> ValidationParameters {
    ValidationParameters::new()
        .with_issuer_signing_key(Arc::new(signing_key(kid).public_only()))
        .with_audience("urn:rp:test")
        .with_fixed_clock(at(clock))
}

#[test]
fn happy_path_validates_and_stamps_signing_key() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = params_for("k1", "2024-01-01T00:30:00Z");

    let (principal, token) = handler.validate_token(xml.as_bytes(), &params).unwrap();

    let identity = principal.identity().expect("identity");
    assert_eq!(identity.name(), Some("alice"));
    let emails: Vec<&str> = identity.find_all("email").map(|c| c.value.as_str()).collect();
    assert_eq!(emails, ["alice@example"]);
    // Every claim carries the resolved issuer.
    assert!(identity.claims.iter().all(|c| c.issuer == "https://idp.example/"));
    assert_eq!(
        token.signing_key().expect("signing key stamped").key_id(),
        Some("k1")
    );
}

#[test]
fn stale_key_reports_signature_key_not_found() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = params_for("k2", "2024-01-01T00:30:00Z");

    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    match err {
        Saml2Error::SignatureKeyNotFound { kid } => assert_eq!(kid, "k1"),
        other => panic!("expected SignatureKeyNotFound, got {other:?}"),
    }
}

#[test]
fn wrong_key_without_kid_reports_invalid_signature() {
    let handler = Saml2TokenHandler::new();

    // Sign with an unnamed key: the signature carries no kid, so trial
    // verification failure aggregates instead of diagnosing stale keys.
    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(subject_identity())
        .with_signing_credentials(SigningCredentials::new(Arc::new(
            RsaSecurityKey::from_private_key(private_key(&KEY_ONE), None),
        )));
    let token = handler.create_token(&descriptor).unwrap();
    let xml = handler.write_token(&token).unwrap();

    let params = ValidationParameters::new()
        .with_issuer_signing_key(Arc::new(signing_key("k2").public_only()))
        .with_fixed_clock(at("2024-01-01T00:30:00Z"));

    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    match err {
        Saml2Error::InvalidSignature(diag) => {
            assert_eq!(diag.keys_tried, ["k2"]);
            assert_eq!(diag.failures.len(), 1);
        }
        other => panic!("expected InvalidSignature, got {other:?}"),
    }
}

#[test]
fn empty_key_set_is_reported_distinctly() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = ValidationParameters::new().with_fixed_clock(at("2024-01-01T00:30:00Z"));

    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    match err {
        Saml2Error::InvalidSignature(diag) => assert!(diag.empty_key_set),
        other => panic!("expected InvalidSignature, got {other:?}"),
    }
}

#[test]
fn expired_token_fails_lifetime() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = params_for("k1", "2024-01-01T02:00:00Z");

    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    assert!(matches!(err, Saml2Error::InvalidLifetime { .. }));
}

#[test]
fn wrong_audience_fails() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = ValidationParameters::new()
        .with_issuer_signing_key(Arc::new(signing_key("k1").public_only()))
        .with_audience("urn:rp:other")
        .with_fixed_clock(at("2024-01-01T00:30:00Z"));

    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    match err {
        Saml2Error::InvalidAudience { actual, .. } => {
            assert_eq!(actual, ["urn:rp:test"]);
        }
        other => panic!("expected InvalidAudience, got {other:?}"),
    }
}

#[test]
fn actor_chain_roundtrips() {
    let handler = Saml2TokenHandler::new();

    let actor = ClaimsIdentity::new()
        .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "svc", "https://idp.example/"))
        .with_claim(Claim::new("role", "system", "https://idp.example/"));
    let identity = ClaimsIdentity::new()
        .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "bob", "https://idp.example/"))
        .with_claim(Claim::new("role", "admin", "https://idp.example/"))
        .with_actor(actor);

    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(identity)
        .with_lifetime(
            Some(at("2024-01-01T00:00:00Z")),
            Some(at("2024-01-01T01:00:00Z")),
        )
        .with_audience("urn:rp:test")
        .with_signing_credentials(SigningCredentials::new(Arc::new(signing_key("k1"))));

    let token = handler.create_token(&descriptor).unwrap();
    let xml = handler.write_token(&token).unwrap();
    let params = params_for("k1", "2024-01-01T00:30:00Z");
    let (principal, _) = handler.validate_token(xml.as_bytes(), &params).unwrap();

    let identity = principal.identity().unwrap();
    assert_eq!(identity.name(), Some("bob"));
    let roles: Vec<&str> = identity.find_all("role").map(|c| c.value.as_str()).collect();
    assert_eq!(roles, ["admin"]);

    let actor = identity.actor.as_deref().expect("actor identity");
    let actor_roles: Vec<&str> = actor.find_all("role").map(|c| c.value.as_str()).collect();
    assert_eq!(actor_roles, ["system"]);
    assert!(actor.actor.is_none());
}

#[test]
fn one_time_use_requires_override() {
    let handler = Saml2TokenHandler::new();
    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(subject_identity())
        .with_lifetime(
            Some(at("2024-01-01T00:00:00Z")),
            Some(at("2024-01-01T01:00:00Z")),
        )
        .with_signing_credentials(SigningCredentials::new(Arc::new(signing_key("k1"))));

    let mut token = handler.create_token(&descriptor).unwrap();
    token.assertion.conditions.as_mut().unwrap().one_time_use = true;
    let xml = handler.write_token(&token).unwrap();

    let params = ValidationParameters::new()
        .with_issuer_signing_key(Arc::new(signing_key("k1").public_only()))
        .with_fixed_clock(at("2024-01-01T00:30:00Z"));
    let err = handler.validate_token(xml.as_bytes(), &params).unwrap_err();
    assert!(matches!(err, Saml2Error::RequiresOverride("OneTimeUse")));

    // A replay validator takes over one-time-use enforcement.
    let replay_params = params
        .clone()
        .with_replay_validator(Arc::new(|_, _| Err(Saml2Error::TokenReplayed)));
    let err = handler
        .validate_token(xml.as_bytes(), &replay_params)
        .unwrap_err();
    assert!(matches!(err, Saml2Error::TokenReplayed));
}

#[test]
fn oversize_token_fails_both_paths() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");

    let small_handler = Saml2TokenHandler::new().with_max_token_size(64).unwrap();
    assert!(!small_handler.can_read_token(xml.as_bytes()));

    let params = params_for("k1", "2024-01-01T00:30:00Z");
    let err = small_handler
        .validate_token(xml.as_bytes(), &params)
        .unwrap_err();
    assert!(matches!(err, Saml2Error::OversizeInput { .. }));
}

#[test]
fn unsigned_token_policy() {
    let handler = Saml2TokenHandler::new();
    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(subject_identity());
    let token = handler.create_token(&descriptor).unwrap();
    let xml = handler.write_token(&token).unwrap();

    let strict = ValidationParameters::new().with_fixed_clock(at("2024-01-01T00:30:00Z"));
    let err = handler.validate_token(xml.as_bytes(), &strict).unwrap_err();
    assert!(matches!(err, Saml2Error::MissingSignature));

    let relaxed = strict.require_signed_tokens(false);
    let (principal, token) = handler.validate_token(xml.as_bytes(), &relaxed).unwrap();
    assert_eq!(principal.identity().unwrap().name(), Some("alice"));
    assert!(token.signing_key().is_none());
}

#[test]
fn validation_is_idempotent() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = params_for("k1", "2024-01-01T00:30:00Z");

    let (first, _) = handler.validate_token(xml.as_bytes(), &params).unwrap();
    let (second, _) = handler.validate_token(xml.as_bytes(), &params).unwrap();
    assert_eq!(first.identity(), second.identity());
}

#[test]
fn roundtrip_preserves_claims_modulo_issuer() {
    let handler = Saml2TokenHandler::new();
    let identity = subject_identity().with_claim(
        Claim::new("role", "admin", "https://idp.example/")
            .with_property(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME, "Role"),
    );

    let descriptor = SecurityTokenDescriptor::new()
        .with_issuer("https://idp.example/")
        .with_subject(identity.clone())
        .with_signing_credentials(SigningCredentials::new(Arc::new(signing_key("k1"))));
    let token = handler.create_token(&descriptor).unwrap();
    let xml = handler.write_token(&token).unwrap();

    let params = ValidationParameters::new()
        .with_issuer_signing_key(Arc::new(signing_key("k1").public_only()))
        .with_fixed_clock(at("2024-01-01T00:30:00Z"));
    let (principal, _) = handler.validate_token(xml.as_bytes(), &params).unwrap();
    let validated = principal.identity().unwrap();

    for claim in &identity.claims {
        let found = validated
            .find_all(&claim.claim_type)
            .find(|c| c.value == claim.value)
            .unwrap_or_else(|| panic!("claim {} lost in round-trip", claim.claim_type));
        assert_eq!(found.issuer, "https://idp.example/");
        for (key, value) in &claim.properties {
            assert_eq!(found.properties.get(key), Some(value));
        }
    }
}

#[test]
fn save_signin_token_retains_raw_xml() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let params = params_for("k1", "2024-01-01T00:30:00Z").with_save_signin_token(true);

    let (principal, _) = handler.validate_token(xml.as_bytes(), &params).unwrap();
    assert_eq!(
        principal.identity().unwrap().bootstrap_token.as_deref(),
        Some(xml.as_str())
    );
}

#[test]
fn tampered_token_fails_digest_check() {
    let handler = Saml2TokenHandler::new();
    let xml = signed_token_xml(&handler, "k1");
    let tampered = xml.replace("alice@example", "mallory@example");
    assert_ne!(xml, tampered);

    let params = params_for("k1", "2024-01-01T00:30:00Z");
    let err = handler
        .validate_token(tampered.as_bytes(), &params)
        .unwrap_err();
    assert!(matches!(err, Saml2Error::InvalidSignature(_)));
}
