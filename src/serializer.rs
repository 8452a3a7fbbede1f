//! SAML2 assertion serializer.
//!
//! Converts between the [`Assertion`] data model and SAML 2.0 XML. The
//! reader is a streaming quick-xml parser matching on local names, so
//! any namespace prefix bound to the SAML assertion namespace is
//! accepted; the writer emits the conventional `saml:`/`ds:` prefixes.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Reader};

use crate::error::{Saml2Error, Saml2Result};
use crate::signature::{KeyInfo, Reference, Signature, SignedInfo};
use crate::types::constants::{SAML_NS, SAML_VERSION, XS_NS};
use crate::types::{
    AccessDecision, Assertion, Attribute, AttributeStatement, AudienceRestriction, AuthnContext,
    AuthnStatement, AuthzAction, AuthzDecisionStatement, Conditions, NameId, ProxyRestriction,
    Statement, Subject, SubjectConfirmation, SubjectConfirmationData, SubjectLocality,
};

/// Reads and writes SAML 2.0 assertions.
///
/// Stateless; the handler holds one instance and shares it across
/// validations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saml2Serializer;

impl Saml2Serializer {
    /// Creates a serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Parses an assertion from its XML form.
    ///
    /// The raw input is captured onto the parsed signature (when one is
    /// present) so the signed sub-tree can later be canonicalized for
    /// verification.
    pub fn read_assertion(&self, input: &str) -> Saml2Result<Assertion> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event()? {
                Event::Start(ref e) if local_name(e) == b"Assertion" => {
                    return parse_assertion(&mut reader, e, input);
                }
                Event::Empty(ref e) if local_name(e) == b"Assertion" => {
                    return Err(Saml2Error::Malformed(
                        "assertion element is empty".to_string(),
                    ));
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => {
                    return Err(Saml2Error::Malformed(
                        "input contains no assertion element".to_string(),
                    ));
                }
                _ => {
                    return Err(Saml2Error::Malformed(
                        "root element is not a SAML2 Assertion".to_string(),
                    ));
                }
            }
        }
    }

    /// Serializes an assertion, unsigned.
    ///
    /// Signing happens after serialization by splicing a `ds:Signature`
    /// element into the produced XML.
    pub fn write_assertion(&self, assertion: &Assertion) -> Saml2Result<String> {
        let mut out = String::with_capacity(1024);
        out.push_str(&format!(
            "<saml:Assertion xmlns:saml=\"{SAML_NS}\" ID=\"{}\" IssueInstant=\"{}\" Version=\"{}\">",
            escape_attr(&assertion.id),
            format_instant(assertion.issue_instant),
            escape_attr(&assertion.version),
        ));
        out.push_str(&format!(
            "\n<saml:Issuer>{}</saml:Issuer>",
            escape_text(&assertion.issuer)
        ));

        if let Some(subject) = &assertion.subject {
            write_subject(&mut out, subject);
        }
        if let Some(conditions) = &assertion.conditions {
            write_conditions(&mut out, conditions);
        }
        if let Some(advice) = &assertion.advice {
            out.push_str(&format!("\n<saml:Advice>{advice}</saml:Advice>"));
        }
        for statement in &assertion.statements {
            match statement {
                Statement::Attribute(stmt) => write_attribute_statement(&mut out, stmt),
                Statement::Authn(stmt) => write_authn_statement(&mut out, stmt),
                Statement::AuthzDecision(stmt) => write_authz_statement(&mut out, stmt),
                Statement::Unknown { raw } => {
                    out.push('\n');
                    out.push_str(raw);
                }
            }
        }

        out.push_str("\n</saml:Assertion>");
        Ok(out)
    }

    /// Parses a single `Attribute` element fragment.
    pub fn read_attribute(&self, input: &str) -> Saml2Result<Attribute> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event()? {
                Event::Start(ref e) if local_name(e) == b"Attribute" => {
                    return parse_attribute(&mut reader, e);
                }
                Event::Empty(ref e) if local_name(e) == b"Attribute" => {
                    return parse_empty_attribute(e);
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => {
                    return Err(Saml2Error::Malformed(
                        "input contains no Attribute element".to_string(),
                    ));
                }
                _ => {
                    return Err(Saml2Error::Malformed(
                        "root element is not an Attribute".to_string(),
                    ));
                }
            }
        }
    }

    /// Serializes a single `Attribute` element fragment.
    #[must_use]
    pub fn write_attribute(&self, attribute: &Attribute) -> String {
        let mut out = String::new();
        write_attribute_xml(&mut out, attribute);
        out
    }
}

/// Returns true when the input's root element is
/// `{urn:oasis:names:tc:SAML:2.0:assertion}Assertion`.
///
/// Never errors; malformed input yields `false`.
#[must_use]
pub(crate) fn root_is_assertion(input: &str) -> bool {
    let mut reader = NsReader::from_str(input);
    loop {
        match reader.read_resolved_event() {
            Ok((resolve, Event::Start(ref e) | Event::Empty(ref e))) => {
                let ns_matches = matches!(
                    resolve,
                    ResolveResult::Bound(ns) if ns.into_inner() == SAML_NS.as_bytes()
                );
                return ns_matches && e.local_name().as_ref() == b"Assertion";
            }
            Ok((_, Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_))) => {}
            Ok((_, Event::Text(ref t))) => {
                // Leading whitespace is tolerated; any other text is not.
                match t.unescape() {
                    Ok(text) if text.trim().is_empty() => {}
                    _ => return false,
                }
            }
            Ok((_, Event::Eof)) | Err(_) => return false,
            Ok(_) => return false,
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

pub(crate) fn local_name<'e>(e: &'e BytesStart<'_>) -> &'e [u8] {
    let bytes = e.name().into_inner();
    match bytes.iter().rposition(|&b| b == b':') {
        Some(idx) => &bytes[idx + 1..],
        None => bytes,
    }
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Saml2Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Saml2Error::Malformed(format!("attribute error: {err}")))?;
        let key = attr.key.as_ref();
        let key_local = match key.iter().rposition(|&b| b == b':') {
            Some(idx) => &key[idx + 1..],
            None => key,
        };
        if key_local == name {
            let value = attr
                .unescape_value()
                .map_err(|err| Saml2Error::Malformed(format!("attribute unescape: {err}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(e: &BytesStart<'_>, name: &[u8], what: &str) -> Saml2Result<String> {
    attr_value(e, name)?.ok_or_else(|| {
        Saml2Error::Malformed(format!(
            "{what} is missing its {} attribute",
            String::from_utf8_lossy(name)
        ))
    })
}

fn parse_instant(value: &str) -> Saml2Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| Saml2Error::Malformed(format!("invalid timestamp '{value}': {err}")))
}

fn parse_instant_attr(e: &BytesStart<'_>, name: &[u8]) -> Saml2Result<Option<DateTime<Utc>>> {
    match attr_value(e, name)? {
        Some(value) => Ok(Some(parse_instant(&value)?)),
        None => Ok(None),
    }
}

/// Reads the text content of a leaf element, erroring on child markup.
fn read_leaf_text(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>) -> Saml2Result<String> {
    let end = e.to_end().into_owned();
    let mut out = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|err| Saml2Error::Malformed(format!("text unescape: {err}")))?;
                out.push_str(&text);
            }
            Event::CData(ref t) => out.push_str(&String::from_utf8_lossy(t.as_ref())),
            Event::End(ref end_ev) if end_ev.name() == end.name() => break,
            Event::Start(_) | Event::Empty(_) => {
                return Err(Saml2Error::Malformed(
                    "unexpected child element inside a text-only element".to_string(),
                ));
            }
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Skips an element and all of its content.
fn skip_element(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>) -> Saml2Result<()> {
    let end = e.to_end().into_owned();
    reader.read_to_end(end.name())?;
    Ok(())
}

fn parse_assertion(
    reader: &mut Reader<&[u8]>,
    root: &BytesStart<'_>,
    input: &str,
) -> Saml2Result<Assertion> {
    let id = require_attr(root, b"ID", "Assertion")?;
    let version = attr_value(root, b"Version")?.unwrap_or_else(|| SAML_VERSION.to_string());
    if version != SAML_VERSION {
        return Err(Saml2Error::Malformed(format!(
            "unsupported SAML version: {version}"
        )));
    }
    let issue_instant = parse_instant(&require_attr(root, b"IssueInstant", "Assertion")?)?;

    let mut assertion = Assertion::with_id(id, String::new());
    assertion.issue_instant = issue_instant;

    let end = root.to_end().into_owned();
    loop {
        let pos_before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"Issuer" => assertion.issuer = read_leaf_text(reader, e)?,
                b"Signature" => {
                    assertion.signature = Some(parse_signature(reader, e, input)?);
                }
                b"Subject" => assertion.subject = Some(parse_subject(reader, e)?),
                b"Conditions" => assertion.conditions = Some(parse_conditions(reader, e)?),
                b"Advice" => {
                    let advice_end = e.to_end().into_owned();
                    let inner = reader.read_text(advice_end.name())?;
                    assertion.advice = Some(inner.trim().to_string());
                }
                b"AttributeStatement" => {
                    assertion
                        .statements
                        .push(Statement::Attribute(parse_attribute_statement(reader, e)?));
                }
                b"AuthnStatement" => {
                    assertion
                        .statements
                        .push(Statement::Authn(parse_authn_statement(reader, e)?));
                }
                b"AuthzDecisionStatement" => {
                    assertion
                        .statements
                        .push(Statement::AuthzDecision(parse_authz_statement(reader, e)?));
                }
                _ => {
                    // Unknown statement variants are preserved verbatim.
                    skip_element(reader, e)?;
                    let pos_after = reader.buffer_position() as usize;
                    let raw = input[pos_before..pos_after].trim().to_string();
                    assertion.statements.push(Statement::Unknown { raw });
                }
            },
            Event::Empty(ref e) => match local_name(e) {
                b"Conditions" => assertion.conditions = Some(parse_conditions_attrs(e)?),
                _ => {
                    let pos_after = reader.buffer_position() as usize;
                    let raw = input[pos_before..pos_after].trim().to_string();
                    assertion.statements.push(Statement::Unknown { raw });
                }
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Assertion".to_string(),
                ));
            }
            _ => {}
        }
    }

    if assertion.issuer.trim().is_empty() {
        return Err(Saml2Error::Malformed(
            "assertion has no Issuer element".to_string(),
        ));
    }
    Ok(assertion)
}

fn parse_subject(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Saml2Result<Subject> {
    let end = start.to_end().into_owned();
    let mut subject = Subject::default();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"NameID" => {
                    let name_id = NameId {
                        format: attr_value(e, b"Format")?,
                        name_qualifier: attr_value(e, b"NameQualifier")?,
                        sp_name_qualifier: attr_value(e, b"SPNameQualifier")?,
                        sp_provided_id: attr_value(e, b"SPProvidedID")?,
                        value: read_leaf_text(reader, e)?,
                    };
                    if name_id.value.trim().is_empty() {
                        return Err(Saml2Error::Malformed("NameID has no value".to_string()));
                    }
                    subject.name_id = Some(name_id);
                }
                b"EncryptedID" => {
                    return Err(Saml2Error::Malformed(
                        "encrypted identifiers are not supported".to_string(),
                    ));
                }
                b"SubjectConfirmation" => {
                    subject
                        .subject_confirmations
                        .push(parse_subject_confirmation(reader, e)?);
                }
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Subject".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(subject)
}

fn parse_subject_confirmation(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<SubjectConfirmation> {
    let method = require_attr(start, b"Method", "SubjectConfirmation")?;
    let end = start.to_end().into_owned();
    let mut confirmation = SubjectConfirmation {
        method,
        confirmation_data: None,
    };

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"SubjectConfirmationData" => {
                let data = parse_confirmation_data_attrs(e)?;
                skip_element(reader, e)?;
                confirmation.confirmation_data = Some(data);
            }
            Event::Empty(ref e) if local_name(e) == b"SubjectConfirmationData" => {
                confirmation.confirmation_data = Some(parse_confirmation_data_attrs(e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside SubjectConfirmation".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(confirmation)
}

fn parse_confirmation_data_attrs(e: &BytesStart<'_>) -> Saml2Result<SubjectConfirmationData> {
    Ok(SubjectConfirmationData {
        not_before: parse_instant_attr(e, b"NotBefore")?,
        not_on_or_after: parse_instant_attr(e, b"NotOnOrAfter")?,
        in_response_to: attr_value(e, b"InResponseTo")?,
        recipient: attr_value(e, b"Recipient")?,
        address: attr_value(e, b"Address")?,
    })
}

fn parse_conditions_attrs(e: &BytesStart<'_>) -> Saml2Result<Conditions> {
    Ok(Conditions {
        not_before: parse_instant_attr(e, b"NotBefore")?,
        not_on_or_after: parse_instant_attr(e, b"NotOnOrAfter")?,
        audience_restrictions: Vec::new(),
        one_time_use: false,
        proxy_restriction: None,
    })
}

fn parse_conditions(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Saml2Result<Conditions> {
    let mut conditions = parse_conditions_attrs(start)?;
    let end = start.to_end().into_owned();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"AudienceRestriction" => {
                    conditions
                        .audience_restrictions
                        .push(parse_audience_restriction(reader, e)?);
                }
                b"OneTimeUse" => {
                    conditions.one_time_use = true;
                    skip_element(reader, e)?;
                }
                b"ProxyRestriction" => {
                    conditions.proxy_restriction = Some(parse_proxy_restriction(reader, e)?);
                }
                _ => {
                    tracing::warn!("skipping unrecognized condition element");
                    skip_element(reader, e)?;
                }
            },
            Event::Empty(ref e) => match local_name(e) {
                b"OneTimeUse" => conditions.one_time_use = true,
                b"ProxyRestriction" => {
                    conditions.proxy_restriction = Some(ProxyRestriction {
                        count: parse_count_attr(e)?,
                        audiences: Vec::new(),
                    });
                }
                b"AudienceRestriction" => {
                    conditions
                        .audience_restrictions
                        .push(AudienceRestriction::default());
                }
                _ => tracing::warn!("skipping unrecognized condition element"),
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Conditions".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(conditions)
}

fn parse_count_attr(e: &BytesStart<'_>) -> Saml2Result<Option<u32>> {
    match attr_value(e, b"Count")? {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Saml2Error::Malformed(format!("invalid ProxyRestriction count '{value}'"))),
        None => Ok(None),
    }
}

fn parse_audience_restriction(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<AudienceRestriction> {
    let end = start.to_end().into_owned();
    let mut restriction = AudienceRestriction::default();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"Audience" => {
                restriction.audiences.push(read_leaf_text(reader, e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside AudienceRestriction".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(restriction)
}

fn parse_proxy_restriction(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<ProxyRestriction> {
    let count = parse_count_attr(start)?;
    let end = start.to_end().into_owned();
    let mut restriction = ProxyRestriction {
        count,
        audiences: Vec::new(),
    };

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"Audience" => {
                restriction.audiences.push(read_leaf_text(reader, e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside ProxyRestriction".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(restriction)
}

fn parse_attribute_statement(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<AttributeStatement> {
    let end = start.to_end().into_owned();
    let mut statement = AttributeStatement::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"Attribute" => statement.attributes.push(parse_attribute(reader, e)?),
                b"EncryptedAttribute" => {
                    return Err(Saml2Error::Malformed(
                        "encrypted attributes are not supported".to_string(),
                    ));
                }
                _ => skip_element(reader, e)?,
            },
            Event::Empty(ref e) if local_name(e) == b"Attribute" => {
                statement.attributes.push(parse_empty_attribute(e)?);
            }
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside AttributeStatement".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(statement)
}

fn parse_attribute_attrs(e: &BytesStart<'_>) -> Saml2Result<Attribute> {
    Ok(Attribute {
        name: require_attr(e, b"Name", "Attribute")?,
        name_format: attr_value(e, b"NameFormat")?,
        friendly_name: attr_value(e, b"FriendlyName")?,
        xsi_type: None,
        original_issuer: attr_value(e, b"OriginalIssuer")?,
        values: Vec::new(),
    })
}

pub(crate) fn parse_empty_attribute(e: &BytesStart<'_>) -> Saml2Result<Attribute> {
    parse_attribute_attrs(e)
}

pub(crate) fn parse_attribute(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<Attribute> {
    let mut attribute = parse_attribute_attrs(start)?;
    let end = start.to_end().into_owned();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"AttributeValue" => {
                if attribute.xsi_type.is_none() {
                    attribute.xsi_type = parse_xsi_type(e)?;
                }
                attribute.values.push(read_leaf_text(reader, e)?);
            }
            Event::Empty(ref e) if local_name(e) == b"AttributeValue" => {
                if attribute.xsi_type.is_none() {
                    attribute.xsi_type = parse_xsi_type(e)?;
                }
                attribute.values.push(String::new());
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Attribute".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(attribute)
}

/// Resolves an `xsi:type` QName like `xs:string` into its URI form.
///
/// Only the conventional `xs`/`xsd` prefixes are resolved; anything else
/// is kept verbatim.
fn parse_xsi_type(e: &BytesStart<'_>) -> Saml2Result<Option<String>> {
    let Some(value) = attr_value(e, b"type")? else {
        return Ok(None);
    };
    let resolved = match value.split_once(':') {
        Some(("xs" | "xsd", local)) => format!("{XS_NS}#{local}"),
        _ => value,
    };
    Ok(Some(resolved))
}

fn parse_authn_statement(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<AuthnStatement> {
    let authn_instant = parse_instant(&require_attr(start, b"AuthnInstant", "AuthnStatement")?)?;
    let session_index = attr_value(start, b"SessionIndex")?;
    let session_not_on_or_after = parse_instant_attr(start, b"SessionNotOnOrAfter")?;
    let end = start.to_end().into_owned();

    let mut statement = AuthnStatement {
        authn_instant,
        session_index,
        session_not_on_or_after,
        authn_context: AuthnContext::default(),
        subject_locality: None,
    };

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"AuthnContext" => {
                    statement.authn_context = parse_authn_context(reader, e)?;
                }
                b"SubjectLocality" => {
                    statement.subject_locality = Some(parse_subject_locality(e)?);
                    skip_element(reader, e)?;
                }
                _ => skip_element(reader, e)?,
            },
            Event::Empty(ref e) if local_name(e) == b"SubjectLocality" => {
                statement.subject_locality = Some(parse_subject_locality(e)?);
            }
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside AuthnStatement".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(statement)
}

fn parse_subject_locality(e: &BytesStart<'_>) -> Saml2Result<SubjectLocality> {
    Ok(SubjectLocality {
        address: attr_value(e, b"Address")?,
        dns_name: attr_value(e, b"DNSName")?,
    })
}

fn parse_authn_context(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<AuthnContext> {
    let end = start.to_end().into_owned();
    let mut context = AuthnContext::default();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"AuthnContextClassRef" => {
                    context.class_reference = Some(read_leaf_text(reader, e)?);
                }
                b"AuthnContextDeclRef" => {
                    context.declaration_reference = Some(read_leaf_text(reader, e)?);
                }
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside AuthnContext".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(context)
}

fn parse_authz_statement(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Saml2Result<AuthzDecisionStatement> {
    let resource = require_attr(start, b"Resource", "AuthzDecisionStatement")?;
    let decision_token = require_attr(start, b"Decision", "AuthzDecisionStatement")?;
    let decision = AccessDecision::from_str_token(&decision_token).ok_or_else(|| {
        Saml2Error::Malformed(format!("invalid authorization decision '{decision_token}'"))
    })?;
    let end = start.to_end().into_owned();

    let mut statement = AuthzDecisionStatement {
        resource,
        decision,
        actions: Vec::new(),
    };

    loop {
        match reader.read_event()? {
            Event::Start(ref e) if local_name(e) == b"Action" => {
                statement.actions.push(AuthzAction {
                    namespace: attr_value(e, b"Namespace")?,
                    value: read_leaf_text(reader, e)?,
                });
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside AuthzDecisionStatement".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(statement)
}

fn parse_signature(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    input: &str,
) -> Saml2Result<Signature> {
    let end = start.to_end().into_owned();

    let mut signed_info: Option<SignedInfo> = None;
    let mut signature_value: Option<String> = None;
    let mut key_info: Option<KeyInfo> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"SignedInfo" => signed_info = Some(parse_signed_info(reader, e)?),
                b"SignatureValue" => {
                    signature_value = Some(read_leaf_text(reader, e)?);
                }
                b"KeyInfo" => key_info = Some(parse_key_info(reader, e)?),
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Signature".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(Signature {
        signed_info: signed_info
            .ok_or_else(|| Saml2Error::Malformed("Signature has no SignedInfo".to_string()))?,
        key_info,
        signature_value: signature_value
            .ok_or_else(|| Saml2Error::Malformed("Signature has no SignatureValue".to_string()))?,
        signed_xml: input.to_string(),
    })
}

fn parse_signed_info(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Saml2Result<SignedInfo> {
    let end = start.to_end().into_owned();

    let mut canonicalization: Option<String> = None;
    let mut signature_algorithm: Option<String> = None;
    let mut reference: Option<Reference> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e) == b"CanonicalizationMethod" =>
            {
                canonicalization = Some(require_attr(e, b"Algorithm", "CanonicalizationMethod")?);
            }
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e) == b"SignatureMethod" => {
                signature_algorithm = Some(require_attr(e, b"Algorithm", "SignatureMethod")?);
            }
            Event::Start(ref e) if local_name(e) == b"Reference" => {
                reference = Some(parse_reference(reader, e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside SignedInfo".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(SignedInfo {
        canonicalization: canonicalization.ok_or_else(|| {
            Saml2Error::Malformed("SignedInfo has no CanonicalizationMethod".to_string())
        })?,
        signature_algorithm: signature_algorithm.ok_or_else(|| {
            Saml2Error::Malformed("SignedInfo has no SignatureMethod".to_string())
        })?,
        reference: reference
            .ok_or_else(|| Saml2Error::Malformed("SignedInfo has no Reference".to_string()))?,
        transform_factory: None,
    })
}

fn parse_reference(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Saml2Result<Reference> {
    let uri = attr_value(start, b"URI")?.unwrap_or_default();
    let end = start.to_end().into_owned();

    let mut transforms: Vec<String> = Vec::new();
    let mut digest_algorithm: Option<String> = None;
    let mut digest_value: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e) == b"Transform" => {
                transforms.push(require_attr(e, b"Algorithm", "Transform")?);
            }
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e) == b"DigestMethod" => {
                digest_algorithm = Some(require_attr(e, b"Algorithm", "DigestMethod")?);
            }
            Event::Start(ref e) if local_name(e) == b"DigestValue" => {
                digest_value = Some(read_leaf_text(reader, e)?);
            }
            Event::Start(ref e) if local_name(e) == b"Transforms" => {
                // Transform children are collected by the arms above.
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside Reference".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(Reference {
        uri,
        transforms,
        digest_algorithm: digest_algorithm
            .ok_or_else(|| Saml2Error::Malformed("Reference has no DigestMethod".to_string()))?,
        digest_value: digest_value
            .ok_or_else(|| Saml2Error::Malformed("Reference has no DigestValue".to_string()))?,
    })
}

fn parse_key_info(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Saml2Result<KeyInfo> {
    let end = start.to_end().into_owned();
    let mut key_info = KeyInfo::default();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match local_name(e) {
                b"KeyName" => key_info.key_name = Some(read_leaf_text(reader, e)?),
                b"X509Certificate" => {
                    let cert: String = read_leaf_text(reader, e)?
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect();
                    key_info.x509_certificate = Some(cert);
                }
                b"X509Data" => {
                    // X509Certificate children are collected by the arm above.
                }
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name() == end.name() => break,
            Event::Eof => {
                return Err(Saml2Error::Malformed(
                    "unexpected end of document inside KeyInfo".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(key_info)
}

// ============================================================================
// Writing
// ============================================================================

pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn push_opt_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
    }
}

fn write_subject(out: &mut String, subject: &Subject) {
    out.push_str("\n<saml:Subject>");
    if let Some(name_id) = &subject.name_id {
        out.push_str("\n<saml:NameID");
        push_opt_attr(out, "Format", name_id.format.as_deref());
        push_opt_attr(out, "NameQualifier", name_id.name_qualifier.as_deref());
        push_opt_attr(out, "SPNameQualifier", name_id.sp_name_qualifier.as_deref());
        push_opt_attr(out, "SPProvidedID", name_id.sp_provided_id.as_deref());
        out.push_str(&format!(">{}</saml:NameID>", escape_text(&name_id.value)));
    }
    for confirmation in &subject.subject_confirmations {
        out.push_str(&format!(
            "\n<saml:SubjectConfirmation Method=\"{}\">",
            escape_attr(&confirmation.method)
        ));
        if let Some(data) = &confirmation.confirmation_data {
            out.push_str("\n<saml:SubjectConfirmationData");
            if let Some(t) = data.not_before {
                out.push_str(&format!(" NotBefore=\"{}\"", format_instant(t)));
            }
            if let Some(t) = data.not_on_or_after {
                out.push_str(&format!(" NotOnOrAfter=\"{}\"", format_instant(t)));
            }
            push_opt_attr(out, "InResponseTo", data.in_response_to.as_deref());
            push_opt_attr(out, "Recipient", data.recipient.as_deref());
            push_opt_attr(out, "Address", data.address.as_deref());
            out.push_str("/>");
        }
        out.push_str("\n</saml:SubjectConfirmation>");
    }
    out.push_str("\n</saml:Subject>");
}

fn write_conditions(out: &mut String, conditions: &Conditions) {
    out.push_str("\n<saml:Conditions");
    if let Some(t) = conditions.not_before {
        out.push_str(&format!(" NotBefore=\"{}\"", format_instant(t)));
    }
    if let Some(t) = conditions.not_on_or_after {
        out.push_str(&format!(" NotOnOrAfter=\"{}\"", format_instant(t)));
    }
    let has_children = !conditions.audience_restrictions.is_empty()
        || conditions.one_time_use
        || conditions.proxy_restriction.is_some();
    if !has_children {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for restriction in &conditions.audience_restrictions {
        out.push_str("\n<saml:AudienceRestriction>");
        for audience in &restriction.audiences {
            out.push_str(&format!(
                "\n<saml:Audience>{}</saml:Audience>",
                escape_text(audience)
            ));
        }
        out.push_str("\n</saml:AudienceRestriction>");
    }
    if conditions.one_time_use {
        out.push_str("\n<saml:OneTimeUse/>");
    }
    if let Some(proxy) = &conditions.proxy_restriction {
        out.push_str("\n<saml:ProxyRestriction");
        if let Some(count) = proxy.count {
            out.push_str(&format!(" Count=\"{count}\""));
        }
        if proxy.audiences.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            for audience in &proxy.audiences {
                out.push_str(&format!(
                    "\n<saml:Audience>{}</saml:Audience>",
                    escape_text(audience)
                ));
            }
            out.push_str("\n</saml:ProxyRestriction>");
        }
    }
    out.push_str("\n</saml:Conditions>");
}

fn write_attribute_statement(out: &mut String, statement: &AttributeStatement) {
    out.push_str("\n<saml:AttributeStatement>");
    for attribute in &statement.attributes {
        out.push('\n');
        write_attribute_xml(out, attribute);
    }
    out.push_str("\n</saml:AttributeStatement>");
}

pub(crate) fn write_attribute_xml(out: &mut String, attribute: &Attribute) {
    out.push_str(&format!(
        "<saml:Attribute Name=\"{}\"",
        escape_attr(&attribute.name)
    ));
    push_opt_attr(out, "NameFormat", attribute.name_format.as_deref());
    push_opt_attr(out, "FriendlyName", attribute.friendly_name.as_deref());
    push_opt_attr(out, "OriginalIssuer", attribute.original_issuer.as_deref());
    out.push('>');

    let xsi_type = attribute
        .xsi_type
        .as_deref()
        .and_then(|uri| uri.strip_prefix(&format!("{XS_NS}#")).map(str::to_string));
    for value in &attribute.values {
        match &xsi_type {
            Some(local) => out.push_str(&format!(
                "\n<saml:AttributeValue xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
                 xmlns:xs=\"{XS_NS}\" xsi:type=\"xs:{local}\">{}</saml:AttributeValue>",
                escape_text(value)
            )),
            None => out.push_str(&format!(
                "\n<saml:AttributeValue>{}</saml:AttributeValue>",
                escape_text(value)
            )),
        }
    }
    out.push_str("\n</saml:Attribute>");
}

fn write_authn_statement(out: &mut String, statement: &AuthnStatement) {
    out.push_str(&format!(
        "\n<saml:AuthnStatement AuthnInstant=\"{}\"",
        format_instant(statement.authn_instant)
    ));
    push_opt_attr(out, "SessionIndex", statement.session_index.as_deref());
    if let Some(t) = statement.session_not_on_or_after {
        out.push_str(&format!(" SessionNotOnOrAfter=\"{}\"", format_instant(t)));
    }
    out.push('>');
    if let Some(locality) = &statement.subject_locality {
        out.push_str("\n<saml:SubjectLocality");
        push_opt_attr(out, "Address", locality.address.as_deref());
        push_opt_attr(out, "DNSName", locality.dns_name.as_deref());
        out.push_str("/>");
    }
    out.push_str("\n<saml:AuthnContext>");
    if let Some(class_ref) = &statement.authn_context.class_reference {
        out.push_str(&format!(
            "\n<saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef>",
            escape_text(class_ref)
        ));
    }
    if let Some(decl_ref) = &statement.authn_context.declaration_reference {
        out.push_str(&format!(
            "\n<saml:AuthnContextDeclRef>{}</saml:AuthnContextDeclRef>",
            escape_text(decl_ref)
        ));
    }
    out.push_str("\n</saml:AuthnContext>");
    out.push_str("\n</saml:AuthnStatement>");
}

fn write_authz_statement(out: &mut String, statement: &AuthzDecisionStatement) {
    out.push_str(&format!(
        "\n<saml:AuthzDecisionStatement Resource=\"{}\" Decision=\"{}\">",
        escape_attr(&statement.resource),
        statement.decision.as_str()
    ));
    for action in &statement.actions {
        out.push_str("\n<saml:Action");
        push_opt_attr(out, "Namespace", action.namespace.as_deref());
        out.push_str(&format!(">{}</saml:Action>", escape_text(&action.value)));
    }
    out.push_str("\n</saml:AuthzDecisionStatement>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::constants::claim_value_types;

    fn sample_assertion() -> Assertion {
        let mut assertion = Assertion::with_id("_id1", "https://idp.example/");
        assertion.issue_instant = "2024-01-01T00:00:00Z".parse().unwrap();
        assertion.subject = Some(
            Subject::new(NameId::email("alice@example"))
                .with_confirmation(SubjectConfirmation::bearer()),
        );
        assertion.conditions = Some(
            Conditions::over(
                Some("2024-01-01T00:00:00Z".parse().unwrap()),
                Some("2024-01-01T01:00:00Z".parse().unwrap()),
            )
            .with_audience("urn:rp:test"),
        );
        assertion.statements.push(Statement::Attribute(
            AttributeStatement::new()
                .with_attribute(Attribute::single("email", "alice@example"))
                .with_attribute(Attribute::multi(
                    "role",
                    vec!["admin".to_string(), "reader".to_string()],
                )),
        ));
        assertion
    }

    #[test]
    fn write_read_roundtrip() {
        let serializer = Saml2Serializer::new();
        let assertion = sample_assertion();
        let xml = serializer.write_assertion(&assertion).unwrap();
        let parsed = serializer.read_assertion(&xml).unwrap();

        assert_eq!(parsed.id, "_id1");
        assert_eq!(parsed.issuer, "https://idp.example/");
        let subject = parsed.subject.expect("subject");
        assert_eq!(subject.name_id.unwrap().value, "alice@example");
        assert_eq!(subject.subject_confirmations.len(), 1);
        let conditions = parsed.conditions.expect("conditions");
        assert_eq!(conditions.audience_restrictions.len(), 1);
        assert_eq!(conditions.audience_restrictions[0].audiences, ["urn:rp:test"]);
        assert_eq!(parsed.statements.len(), 1);
        match &parsed.statements[0] {
            Statement::Attribute(stmt) => {
                assert_eq!(stmt.attributes.len(), 2);
                assert_eq!(stmt.attributes[1].values, ["admin", "reader"]);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn read_rejects_non_assertion_root() {
        let serializer = Saml2Serializer::new();
        let err = serializer.read_assertion("<Other/>").unwrap_err();
        assert!(matches!(err, Saml2Error::Malformed(_)));
    }

    #[test]
    fn read_requires_issuer() {
        let serializer = Saml2Serializer::new();
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
            ID="_x" IssueInstant="2024-01-01T00:00:00Z" Version="2.0"></saml:Assertion>"#;
        let err = serializer.read_assertion(xml).unwrap_err();
        assert!(matches!(err, Saml2Error::Malformed(_)));
    }

    #[test]
    fn read_rejects_wrong_version() {
        let serializer = Saml2Serializer::new();
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
            ID="_x" IssueInstant="2024-01-01T00:00:00Z" Version="1.1">
            <saml:Issuer>idp</saml:Issuer></saml:Assertion>"#;
        let err = serializer.read_assertion(xml).unwrap_err();
        assert!(matches!(err, Saml2Error::Malformed(_)));
    }

    #[test]
    fn escaped_values_survive_roundtrip() {
        let serializer = Saml2Serializer::new();
        let mut assertion = sample_assertion();
        assertion.statements = vec![Statement::Attribute(
            AttributeStatement::new()
                .with_attribute(Attribute::single("note", "a<b & \"c\" > d")),
        )];

        let xml = serializer.write_assertion(&assertion).unwrap();
        let parsed = serializer.read_assertion(&xml).unwrap();
        match &parsed.statements[0] {
            Statement::Attribute(stmt) => {
                assert_eq!(stmt.attributes[0].values[0], "a<b & \"c\" > d");
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn one_time_use_and_proxy_restriction_parse() {
        let serializer = Saml2Serializer::new();
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
            ID="_x" IssueInstant="2024-01-01T00:00:00Z" Version="2.0">
            <saml:Issuer>idp</saml:Issuer>
            <saml:Conditions>
              <saml:OneTimeUse/>
              <saml:ProxyRestriction Count="2"><saml:Audience>urn:a</saml:Audience></saml:ProxyRestriction>
            </saml:Conditions>
            </saml:Assertion>"#;
        let parsed = serializer.read_assertion(xml).unwrap();
        let conditions = parsed.conditions.expect("conditions");
        assert!(conditions.one_time_use);
        let proxy = conditions.proxy_restriction.expect("proxy restriction");
        assert_eq!(proxy.count, Some(2));
        assert_eq!(proxy.audiences, ["urn:a"]);
    }

    #[test]
    fn xsi_type_resolves_to_schema_uri() {
        let serializer = Saml2Serializer::new();
        let xml = r#"<saml:Attribute xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" Name="when">
            <saml:AttributeValue xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
              xmlns:xs="http://www.w3.org/2001/XMLSchema"
              xsi:type="xs:dateTime">2024-01-01T00:00:00Z</saml:AttributeValue>
            </saml:Attribute>"#;
        let attribute = serializer.read_attribute(xml).unwrap();
        assert_eq!(attribute.xsi_type.as_deref(), Some(claim_value_types::DATE_TIME));
        assert_eq!(attribute.values, ["2024-01-01T00:00:00Z"]);
    }

    #[test]
    fn attribute_fragment_roundtrip() {
        let serializer = Saml2Serializer::new();
        let mut attribute = Attribute::multi("role", vec!["a".into(), "b".into()]);
        attribute.original_issuer = Some("https://upstream.example/".to_string());
        attribute.friendly_name = Some("Role".to_string());

        let xml = serializer.write_attribute(&attribute);
        let parsed = serializer.read_attribute(&xml).unwrap();
        assert_eq!(parsed, attribute);
    }

    #[test]
    fn unknown_statement_is_preserved() {
        let serializer = Saml2Serializer::new();
        let xml = "<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" \
            ID=\"_x\" IssueInstant=\"2024-01-01T00:00:00Z\" Version=\"2.0\">\
            <saml:Issuer>idp</saml:Issuer>\
            <saml:Statement Custom=\"1\"><saml:Inner>x</saml:Inner></saml:Statement>\
            </saml:Assertion>";
        let parsed = serializer.read_assertion(xml).unwrap();
        assert_eq!(parsed.statements.len(), 1);
        match &parsed.statements[0] {
            Statement::Unknown { raw } => {
                assert!(raw.starts_with("<saml:Statement"));
                assert!(raw.ends_with("</saml:Statement>"));
                assert!(raw.contains("<saml:Inner>x</saml:Inner>"));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn root_probe_accepts_declaration_and_whitespace() {
        let xml = "<?xml version=\"1.0\"?>\n<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" ID=\"_x\"/>";
        assert!(root_is_assertion(xml));

        let xml = "  \n<saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" ID=\"_x\"/>";
        assert!(root_is_assertion(xml));
    }

    #[test]
    fn root_probe_rejects_other_namespaces() {
        assert!(!root_is_assertion(
            "<Assertion xmlns=\"urn:oasis:names:tc:SAML:1.0:assertion\"/>"
        ));
        assert!(!root_is_assertion("<Response/>"));
        assert!(!root_is_assertion("   "));
        assert!(!root_is_assertion("not xml"));
    }

    #[test]
    fn signature_element_parses() {
        let serializer = Saml2Serializer::new();
        let xml = r##"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
            ID="_x" IssueInstant="2024-01-01T00:00:00Z" Version="2.0">
            <saml:Issuer>idp</saml:Issuer>
            <ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
              <ds:SignedInfo>
                <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
                <ds:Reference URI="#_x">
                  <ds:Transforms>
                    <ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>
                    <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
                  </ds:Transforms>
                  <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
                  <ds:DigestValue>AAAA</ds:DigestValue>
                </ds:Reference>
              </ds:SignedInfo>
              <ds:SignatureValue>BBBB</ds:SignatureValue>
              <ds:KeyInfo><ds:KeyName>k1</ds:KeyName></ds:KeyInfo>
            </ds:Signature>
            </saml:Assertion>"##;

        let parsed = serializer.read_assertion(xml).unwrap();
        let signature = parsed.signature.expect("signature");
        assert_eq!(signature.kid(), Some("k1"));
        assert_eq!(signature.signed_info.reference.uri, "#_x");
        assert_eq!(signature.signed_info.reference.transforms.len(), 2);
        assert_eq!(signature.signature_value, "BBBB");
        assert!(signature.signed_xml.contains("<saml:Issuer>idp</saml:Issuer>"));
    }
}
