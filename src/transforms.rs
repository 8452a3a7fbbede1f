//! Canonicalization and signature transforms.
//!
//! A verified signature's `SignedInfo` names a chain of transforms that
//! turn the signed sub-tree into the exact bytes the digest was computed
//! over. The handler installs a [`TransformFactory`] on each signature it
//! verifies; [`DefaultTransformFactory`] covers the enveloped-signature
//! transform and exclusive C14N.

use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Saml2Error, Saml2Result};
use crate::types::constants::transform_algorithms;

/// Data flowing through a transform chain.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// An XML fragment (for XML-aware transforms like C14N).
    Xml(String),
    /// Raw octets, the terminal form digests are computed over.
    Bytes(Vec<u8>),
}

impl TransformData {
    /// Converts to octets, canonicalizing first when still in XML form.
    pub fn into_bytes(self) -> Saml2Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Xml(xml) => Ok(canonicalize(&xml)?.into_bytes()),
        }
    }
}

/// A single signature transform.
pub trait Transform: fmt::Debug + Send + Sync {
    /// The algorithm URI this transform implements.
    fn uri(&self) -> &'static str;

    /// Executes the transform.
    fn apply(&self, input: TransformData) -> Saml2Result<TransformData>;
}

/// Creates transforms from their algorithm URIs.
pub trait TransformFactory: fmt::Debug + Send + Sync {
    /// Creates the transform named by `uri`.
    ///
    /// # Errors
    ///
    /// [`Saml2Error::UnsupportedAlgorithm`] for URIs the factory does not
    /// recognize.
    fn create_transform(&self, uri: &str) -> Saml2Result<Box<dyn Transform>>;
}

/// The transform factory installed by default: enveloped-signature
/// removal plus C14N (exclusive and inclusive map to the same
/// canonicalizer).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransformFactory;

impl TransformFactory for DefaultTransformFactory {
    fn create_transform(&self, uri: &str) -> Saml2Result<Box<dyn Transform>> {
        match uri {
            transform_algorithms::ENVELOPED_SIGNATURE => Ok(Box::new(EnvelopedSignatureTransform)),
            transform_algorithms::EXCLUSIVE_C14N | transform_algorithms::C14N => {
                Ok(Box::new(C14nTransform))
            }
            other => Err(Saml2Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Removes the enveloped `<ds:Signature>` element from the signed
/// sub-tree.
#[derive(Debug)]
pub struct EnvelopedSignatureTransform;

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &'static str {
        transform_algorithms::ENVELOPED_SIGNATURE
    }

    fn apply(&self, input: TransformData) -> Saml2Result<TransformData> {
        match input {
            TransformData::Xml(xml) => Ok(TransformData::Xml(remove_signature_element(&xml))),
            TransformData::Bytes(_) => Err(Saml2Error::Malformed(
                "enveloped-signature transform requires XML input".to_string(),
            )),
        }
    }
}

/// Canonicalizes an XML fragment into its byte form.
#[derive(Debug)]
pub struct C14nTransform;

impl Transform for C14nTransform {
    fn uri(&self) -> &'static str {
        transform_algorithms::EXCLUSIVE_C14N
    }

    fn apply(&self, input: TransformData) -> Saml2Result<TransformData> {
        match input {
            TransformData::Xml(xml) => Ok(TransformData::Bytes(canonicalize(&xml)?.into_bytes())),
            bytes @ TransformData::Bytes(_) => Ok(bytes),
        }
    }
}

/// Removes the first `Signature` element (with or without the `ds:`
/// prefix) from an XML string.
fn remove_signature_element(xml: &str) -> String {
    for (open, close) in [
        ("<ds:Signature", "</ds:Signature>"),
        ("<Signature", "</Signature>"),
    ] {
        if let Some(start) = xml.find(open) {
            if let Some(end_offset) = xml[start..].find(close) {
                let end = start + end_offset + close.len();
                return format!("{}{}", &xml[..start], &xml[end..]);
            }
        }
    }
    xml.to_string()
}

/// Canonical serialization of an XML fragment.
///
/// Streams the document, dropping the XML declaration, comments,
/// processing instructions and DOCTYPE, sorting attributes (namespace
/// declarations first) and expanding empty-element tags, with entity
/// escaping normalized. Both the signing and the verifying side run the
/// same serialization, so digests computed here compare exactly.
pub fn canonicalize(xml: &str) -> Saml2Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::with_capacity(xml.len());

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                write_element_open(&mut out, e)?;
            }
            Ok(Event::Empty(ref e)) => {
                // C14N expands empty-element tags into start/end pairs.
                write_element_open(&mut out, e)?;
                let name = qname_str(e.name().as_ref())?;
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
            Ok(Event::End(ref e)) => {
                let name = qname_str(e.name().as_ref())?;
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| Saml2Error::Malformed(format!("text unescape error: {e}")))?;
                escape_text(&mut out, &text);
            }
            Ok(Event::CData(ref t)) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                escape_text(&mut out, &text);
            }
            Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => return Err(Saml2Error::Malformed(format!("XML parse error: {e}"))),
        }
    }

    Ok(out)
}

fn write_element_open(out: &mut String, e: &quick_xml::events::BytesStart<'_>) -> Saml2Result<()> {
    let name = qname_str(e.name().as_ref())?;
    out.push('<');
    out.push_str(&name);

    let mut attrs: Vec<(String, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Saml2Error::Malformed(format!("attribute error: {e}")))?;
        let key = qname_str(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| Saml2Error::Malformed(format!("attribute unescape error: {e}")))?
            .into_owned();
        attrs.push((key, value));
    }
    // Namespace declarations sort before ordinary attributes, each group
    // lexicographically.
    attrs.sort_by(|(a, _), (b, _)| {
        let a_ns = a == "xmlns" || a.starts_with("xmlns:");
        let b_ns = b == "xmlns" || b.starts_with("xmlns:");
        b_ns.cmp(&a_ns).then_with(|| a.cmp(b))
    });

    for (key, value) in attrs {
        out.push(' ');
        out.push_str(&key);
        out.push_str("=\"");
        escape_attribute(out, &value);
        out.push('"');
    }
    out.push('>');
    Ok(())
}

fn qname_str(bytes: &[u8]) -> Saml2Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Saml2Error::Malformed(format!("invalid UTF-8 in element name: {e}")))
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}
