//! Claims-to-attribute flattening and collapsing.
//!
//! The outbound builder turns each claim into a single-valued attribute,
//! then collapses attributes sharing a `(name, xsi_type,
//! original_issuer)` key into one multi-valued attribute, preserving
//! insertion order.

use url::Url;

use crate::claims::{Claim, ClaimsIdentity};
use crate::error::{Saml2Error, Saml2Result};
use crate::serializer::Saml2Serializer;
use crate::types::constants::{claim_properties, claim_types, claim_value_types};
use crate::types::Attribute;

/// Converts a claim into a single-valued attribute.
///
/// The claim's `original_issuer` is copied onto the attribute only when
/// it differs (ordinal) from its `issuer`. A `SamlAttributeNameFormat`
/// property must hold an absolute URI.
pub(crate) fn claim_to_attribute(claim: &Claim) -> Saml2Result<Attribute> {
    let mut attribute = Attribute {
        name: claim.claim_type.clone(),
        name_format: None,
        friendly_name: None,
        xsi_type: (claim.value_type != claim_value_types::STRING)
            .then(|| claim.value_type.clone()),
        original_issuer: (claim.original_issuer != claim.issuer)
            .then(|| claim.original_issuer.clone()),
        values: vec![claim.value.clone()],
    };

    if let Some(format) = claim.properties.get(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT) {
        if Url::parse(format).is_err() {
            return Err(Saml2Error::InvalidNameFormat(format.clone()));
        }
        attribute.name_format = Some(format.clone());
    }
    if let Some(name) = claim.properties.get(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME) {
        attribute.friendly_name = Some(name.clone());
    }
    Ok(attribute)
}

/// Collapses attributes with an equal collapse key into one attribute
/// whose values concatenate in original order. Stable: the first
/// occurrence of a key determines its position.
pub(crate) fn collapse_attributes(attributes: Vec<Attribute>) -> Vec<Attribute> {
    let mut out: Vec<Attribute> = Vec::new();
    for attribute in attributes {
        match out
            .iter_mut()
            .find(|existing| existing.collapse_key() == attribute.collapse_key())
        {
            Some(existing) => existing.values.extend(attribute.values),
            None => out.push(attribute),
        }
    }
    out
}

/// Flattens an identity's claims into collapsed attributes, excluding the
/// given claim types, with the delegated actor (when present) appended as
/// the last attribute.
pub(crate) fn attributes_for_identity(
    identity: &ClaimsIdentity,
    exclude: &[&str],
    serializer: &Saml2Serializer,
) -> Saml2Result<Vec<Attribute>> {
    let mut attributes = Vec::with_capacity(identity.claims.len());
    for claim in &identity.claims {
        if exclude.contains(&claim.claim_type.as_str()) {
            continue;
        }
        attributes.push(claim_to_attribute(claim)?);
    }
    let mut attributes = collapse_attributes(attributes);

    if let Some(actor) = &identity.actor {
        attributes.push(Attribute::single(
            claim_types::ACTOR,
            crate::actor::encode_actor(serializer, actor)?,
        ));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattening_copies_original_issuer_only_when_distinct() {
        let same = Claim::new("role", "admin", "https://idp.example/");
        assert!(claim_to_attribute(&same).unwrap().original_issuer.is_none());

        let distinct = Claim::new("role", "admin", "https://idp.example/")
            .with_original_issuer("https://upstream.example/");
        assert_eq!(
            claim_to_attribute(&distinct).unwrap().original_issuer.as_deref(),
            Some("https://upstream.example/")
        );
    }

    #[test]
    fn name_format_must_be_absolute_uri() {
        let claim = Claim::new("role", "admin", "iss").with_property(
            claim_properties::SAML_ATTRIBUTE_NAME_FORMAT,
            "not a uri",
        );
        let err = claim_to_attribute(&claim).unwrap_err();
        assert!(matches!(err, Saml2Error::InvalidNameFormat(_)));

        let claim = Claim::new("role", "admin", "iss").with_property(
            claim_properties::SAML_ATTRIBUTE_NAME_FORMAT,
            "urn:oasis:names:tc:SAML:2.0:attrname-format:uri",
        );
        assert!(claim_to_attribute(&claim).is_ok());
    }

    #[test]
    fn display_name_becomes_friendly_name() {
        let claim = Claim::new("role", "admin", "iss")
            .with_property(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME, "Role");
        let attribute = claim_to_attribute(&claim).unwrap();
        assert_eq!(attribute.friendly_name.as_deref(), Some("Role"));
    }

    #[test]
    fn collapse_merges_equal_keys_in_order() {
        let attrs = vec![
            Attribute::single("role", "admin"),
            Attribute::single("email", "a@b"),
            Attribute::single("role", "reader"),
            Attribute::single("role", "auditor"),
        ];
        let collapsed = collapse_attributes(attrs);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].name, "role");
        assert_eq!(collapsed[0].values, ["admin", "reader", "auditor"]);
        assert_eq!(collapsed[1].name, "email");
    }

    #[test]
    fn collapse_distinguishes_original_issuer() {
        let mut upstream = Attribute::single("role", "reader");
        upstream.original_issuer = Some("https://upstream.example/".to_string());
        let attrs = vec![Attribute::single("role", "admin"), upstream];
        let collapsed = collapse_attributes(attrs);
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn identity_flattening_excludes_requested_types() {
        let identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice", "iss"))
            .with_claim(Claim::new("email", "alice@example", "iss"));

        let attributes = attributes_for_identity(
            &identity,
            &[claim_types::NAME_IDENTIFIER],
            &Saml2Serializer::new(),
        )
        .unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].name, "email");
    }
}
