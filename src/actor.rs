//! Delegated-actor codec.
//!
//! A delegation chain travels inside an attribute whose name is the
//! Actor claim type and whose single value is an XML fragment:
//!
//! ```xml
//! <Actor>
//!   <saml:Attribute Name="...">
//!     <saml:AttributeValue>...</saml:AttributeValue>
//!   </saml:Attribute>
//! </Actor>
//! ```
//!
//! A nested actor appears as an inner Actor-typed attribute, recursively.
//! Exactly one nested actor per level is permitted.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::attributes::attributes_for_identity;
use crate::claims::{Claim, ClaimsIdentity};
use crate::error::{Saml2Error, Saml2Result};
use crate::serializer::{local_name, parse_attribute, parse_empty_attribute, Saml2Serializer};
use crate::types::constants::{claim_properties, claim_types, DEFAULT_ISSUER};
use crate::types::Attribute;

/// Serializes an actor identity into its XML blob form.
///
/// All of the actor's claims except the name identifier become
/// attributes; a nested actor recurses as the last attribute of the
/// inner set.
pub(crate) fn encode_actor(
    serializer: &Saml2Serializer,
    actor: &ClaimsIdentity,
) -> Saml2Result<String> {
    let attributes =
        attributes_for_identity(actor, &[claim_types::NAME_IDENTIFIER], serializer)?;

    let mut out = String::from("<Actor>");
    for attribute in &attributes {
        out.push('\n');
        out.push_str(&serializer.write_attribute(attribute));
    }
    out.push_str("\n</Actor>");
    Ok(out)
}

/// Parses an actor XML blob back into a claims identity.
pub(crate) fn decode_actor(
    serializer: &Saml2Serializer,
    xml: &str,
) -> Saml2Result<ClaimsIdentity> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"Actor" => {
                return decode_actor_body(serializer, &mut reader);
            }
            Event::Empty(ref e) if local_name(e) == b"Actor" => {
                return Ok(ClaimsIdentity::new());
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "actor value contains no Actor element".to_string(),
                ));
            }
            _ => {
                return Err(Saml2Error::Malformed(
                    "actor value is not an Actor fragment".to_string(),
                ));
            }
        }
    }
}

fn decode_actor_body(
    serializer: &Saml2Serializer,
    reader: &mut Reader<&[u8]>,
) -> Saml2Result<ClaimsIdentity> {
    let mut identity = ClaimsIdentity::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"Attribute" => {
                let attribute = parse_attribute(reader, e)?;
                apply_actor_attribute(serializer, &mut identity, attribute)?;
            }
            Event::Empty(ref e) if local_name(e) == b"Attribute" => {
                let attribute = parse_empty_attribute(e)?;
                apply_actor_attribute(serializer, &mut identity, attribute)?;
            }
            Event::End(ref e) if local_name_end(e) == b"Actor" => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of actor fragment".to_string(),
                ));
            }
            _ => {
                return Err(Saml2Error::Malformed(
                    "unexpected content in actor fragment".to_string(),
                ));
            }
        }
    }
    Ok(identity)
}

fn local_name_end<'e>(e: &'e quick_xml::events::BytesEnd<'_>) -> &'e [u8] {
    let bytes = e.name().into_inner();
    match bytes.iter().rposition(|&b| b == b':') {
        Some(idx) => &bytes[idx + 1..],
        None => bytes,
    }
}

fn apply_actor_attribute(
    serializer: &Saml2Serializer,
    identity: &mut ClaimsIdentity,
    attribute: Attribute,
) -> Saml2Result<()> {
    if attribute.name == claim_types::ACTOR {
        if identity.actor.is_some() {
            return Err(Saml2Error::NestedActorConflict);
        }
        let value = attribute.values.first().ok_or_else(|| {
            Saml2Error::Malformed("nested Actor attribute has no value".to_string())
        })?;
        identity.actor = Some(Box::new(decode_actor(serializer, value)?));
        return Ok(());
    }

    let issuer = attribute
        .original_issuer
        .clone()
        .unwrap_or_else(|| DEFAULT_ISSUER.to_string());
    for value in &attribute.values {
        let mut claim = Claim::new(&attribute.name, value, &issuer);
        if let Some(xsi_type) = &attribute.xsi_type {
            claim = claim.with_value_type(xsi_type);
        }
        if let Some(format) = &attribute.name_format {
            claim = claim.with_property(claim_properties::SAML_ATTRIBUTE_NAME_FORMAT, format);
        }
        if let Some(name) = &attribute.friendly_name {
            claim = claim.with_property(claim_properties::SAML_ATTRIBUTE_DISPLAY_NAME, name);
        }
        identity.add_claim(claim);
    }
    Ok(())
}
