//! XML signature model, verification and creation.
//!
//! A parsed assertion's signature retains the raw XML it was read from;
//! verification replays the declared transform chain over that raw text,
//! compares the reference digest, then checks the signature value over
//! the canonicalized `SignedInfo`. Creation runs the same pipeline in
//! reverse and splices the `<ds:Signature>` element in after the issuer.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{Saml2Error, Saml2Result};
use crate::keys::{SecurityKey, SigningCredentials};
use crate::transforms::{TransformData, TransformFactory};
use crate::types::constants::{digest_algorithms, transform_algorithms, XMLDSIG_NS};

/// Key identification data carried inside a signature.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    /// The key name, used as the key identifier (`kid`).
    pub key_name: Option<String>,

    /// Base64-encoded DER certificate, when embedded.
    pub x509_certificate: Option<String>,
}

impl KeyInfo {
    /// The key identifier used to select a candidate verification key.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.key_name.as_deref()
    }
}

/// A `Reference` within `SignedInfo`: what was digested, and how.
#[derive(Debug, Clone)]
pub struct Reference {
    /// The reference URI, usually `#` followed by the assertion ID.
    pub uri: String,

    /// Transform algorithm URIs, applied in order.
    pub transforms: Vec<String>,

    /// Digest algorithm URI.
    pub digest_algorithm: String,

    /// Base64-encoded digest value.
    pub digest_value: String,
}

/// The signed portion of a signature.
#[derive(Debug, Clone)]
pub struct SignedInfo {
    /// Canonicalization algorithm URI for `SignedInfo` itself.
    pub canonicalization: String,

    /// Signature algorithm URI.
    pub signature_algorithm: String,

    /// The single reference over the enclosing assertion.
    pub reference: Reference,

    /// The transform factory used to materialize the transform chain.
    ///
    /// Installed by the handler before verification.
    pub transform_factory: Option<Arc<dyn TransformFactory>>,
}

/// An enveloped XML signature, parsed from a signed assertion or built
/// on the signing path.
#[derive(Debug, Clone)]
pub struct Signature {
    /// The signed-info block.
    pub signed_info: SignedInfo,

    /// Key identification data, when present.
    pub key_info: Option<KeyInfo>,

    /// Base64-encoded signature value.
    pub signature_value: String,

    /// Raw XML of the signed assertion element, captured at parse time.
    pub(crate) signed_xml: String,
}

impl Signature {
    /// The key identifier named by this signature, when any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.key_info.as_ref().and_then(KeyInfo::kid)
    }

    /// Installs the transform factory used to verify this signature.
    pub fn install_transform_factory(&mut self, factory: Arc<dyn TransformFactory>) {
        self.signed_info.transform_factory = Some(factory);
    }

    /// Verifies this signature against a single candidate key.
    ///
    /// Replays the reference transform chain over the captured raw XML,
    /// compares the declared digest, then verifies the signature value
    /// over the canonicalized `SignedInfo`.
    pub(crate) fn verify(&self, key: &dyn SecurityKey) -> Saml2Result<()> {
        let factory = self.signed_info.transform_factory.as_ref().ok_or_else(|| {
            Saml2Error::InvalidConfiguration(
                "no transform factory installed on SignedInfo".to_string(),
            )
        })?;

        let mut data = TransformData::Xml(self.signed_xml.clone());
        for uri in &self.signed_info.reference.transforms {
            data = factory.create_transform(uri)?.apply(data)?;
        }
        let canonical = data.into_bytes()?;

        let computed = compute_digest(&self.signed_info.reference.digest_algorithm, &canonical)?;
        let declared = BASE64.decode(strip_whitespace(&self.signed_info.reference.digest_value))?;
        if computed != declared {
            return Err(Saml2Error::invalid_signature("reference digest mismatch"));
        }

        let signed_info_xml = build_signed_info_xml(&self.signed_info);
        let signed_info_canonical = factory
            .create_transform(&self.signed_info.canonicalization)?
            .apply(TransformData::Xml(signed_info_xml))?
            .into_bytes()?;

        let signature_bytes = BASE64.decode(strip_whitespace(&self.signature_value))?;
        if key.verify(
            &self.signed_info.signature_algorithm,
            &signed_info_canonical,
            &signature_bytes,
        )? {
            Ok(())
        } else {
            Err(Saml2Error::invalid_signature(
                "signature value does not verify under this key",
            ))
        }
    }
}

/// Computes the digest of `data` under the given digest algorithm URI.
pub(crate) fn compute_digest(algorithm: &str, data: &[u8]) -> Saml2Result<Vec<u8>> {
    match algorithm {
        digest_algorithms::SHA256 => Ok(Sha256::digest(data).to_vec()),
        digest_algorithms::SHA384 => Ok(Sha384::digest(data).to_vec()),
        digest_algorithms::SHA512 => Ok(Sha512::digest(data).to_vec()),
        other => Err(Saml2Error::UnsupportedAlgorithm(other.to_string())),
    }
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Serializes a `SignedInfo` block.
///
/// Used identically by the signing path and the verification rebuild, so
/// a parse/rebuild round-trip is canonical-form stable.
pub(crate) fn build_signed_info_xml(signed_info: &SignedInfo) -> String {
    let mut transforms = String::new();
    for uri in &signed_info.reference.transforms {
        transforms.push_str(&format!("<ds:Transform Algorithm=\"{uri}\"/>\n"));
    }
    format!(
        "<ds:SignedInfo xmlns:ds=\"{ns}\">\n\
         <ds:CanonicalizationMethod Algorithm=\"{c14n}\"/>\n\
         <ds:SignatureMethod Algorithm=\"{sig}\"/>\n\
         <ds:Reference URI=\"{uri}\">\n\
         <ds:Transforms>\n\
         {transforms}\
         </ds:Transforms>\n\
         <ds:DigestMethod Algorithm=\"{digest}\"/>\n\
         <ds:DigestValue>{value}</ds:DigestValue>\n\
         </ds:Reference>\n\
         </ds:SignedInfo>",
        ns = XMLDSIG_NS,
        c14n = signed_info.canonicalization,
        sig = signed_info.signature_algorithm,
        uri = signed_info.reference.uri,
        transforms = transforms,
        digest = signed_info.reference.digest_algorithm,
        value = signed_info.reference.digest_value,
    )
}

/// Signs a serialized, unsigned assertion and returns the XML with the
/// `<ds:Signature>` element spliced in after the issuer.
pub(crate) fn sign_assertion_xml(
    unsigned_xml: &str,
    assertion_id: &str,
    credentials: &SigningCredentials,
    factory: &dyn TransformFactory,
) -> Saml2Result<String> {
    let transforms = vec![
        transform_algorithms::ENVELOPED_SIGNATURE.to_string(),
        transform_algorithms::EXCLUSIVE_C14N.to_string(),
    ];

    // Enveloped removal is a no-op here; run the declared chain anyway so
    // the verifying side replays the exact same pipeline.
    let mut data = TransformData::Xml(unsigned_xml.to_string());
    for uri in &transforms {
        data = factory.create_transform(uri)?.apply(data)?;
    }
    let canonical = data.into_bytes()?;

    let digest_uri = credentials.algorithm.digest_uri();
    let digest_value = BASE64.encode(compute_digest(digest_uri, &canonical)?);

    let signed_info = SignedInfo {
        canonicalization: transform_algorithms::EXCLUSIVE_C14N.to_string(),
        signature_algorithm: credentials.algorithm.uri().to_string(),
        reference: Reference {
            uri: format!("#{assertion_id}"),
            transforms,
            digest_algorithm: digest_uri.to_string(),
            digest_value,
        },
        transform_factory: None,
    };

    let signed_info_xml = build_signed_info_xml(&signed_info);
    let signed_info_canonical = factory
        .create_transform(&signed_info.canonicalization)?
        .apply(TransformData::Xml(signed_info_xml.clone()))?
        .into_bytes()?;

    let signature_value = BASE64.encode(
        credentials
            .key
            .sign(&signed_info.signature_algorithm, &signed_info_canonical)?,
    );

    let mut key_info = String::new();
    if credentials.key.key_id().is_some() || credentials.certificate.is_some() {
        key_info.push_str("\n<ds:KeyInfo>");
        if let Some(kid) = credentials.key.key_id() {
            key_info.push_str(&format!("\n<ds:KeyName>{kid}</ds:KeyName>"));
        }
        if let Some(cert) = &credentials.certificate {
            key_info.push_str(&format!(
                "\n<ds:X509Data>\n<ds:X509Certificate>{cert}</ds:X509Certificate>\n</ds:X509Data>"
            ));
        }
        key_info.push_str("\n</ds:KeyInfo>");
    }

    let signature_element = format!(
        "<ds:Signature xmlns:ds=\"{XMLDSIG_NS}\">\n\
         {signed_info_xml}\n\
         <ds:SignatureValue>{signature_value}</ds:SignatureValue>\
         {key_info}\n\
         </ds:Signature>"
    );

    insert_after_issuer(unsigned_xml, &signature_element)
}

/// Splices a signature element immediately after the closing issuer tag,
/// where the SAML schema places it.
fn insert_after_issuer(xml: &str, signature: &str) -> Saml2Result<String> {
    for close in ["</saml:Issuer>", "</Issuer>", "</saml2:Issuer>"] {
        if let Some(pos) = xml.find(close) {
            let insert = pos + close.len();
            return Ok(format!("{}{}{}", &xml[..insert], signature, &xml[insert..]));
        }
    }
    Err(Saml2Error::Malformed(
        "assertion has no Issuer element to anchor the signature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signed_info() -> SignedInfo {
        SignedInfo {
            canonicalization: transform_algorithms::EXCLUSIVE_C14N.to_string(),
            signature_algorithm: "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".to_string(),
            reference: Reference {
                uri: "#_id1".to_string(),
                transforms: vec![
                    transform_algorithms::ENVELOPED_SIGNATURE.to_string(),
                    transform_algorithms::EXCLUSIVE_C14N.to_string(),
                ],
                digest_algorithm: digest_algorithms::SHA256.to_string(),
                digest_value: "AAAA".to_string(),
            },
            transform_factory: None,
        }
    }

    #[test]
    fn signed_info_xml_is_deterministic() {
        let si = sample_signed_info();
        assert_eq!(build_signed_info_xml(&si), build_signed_info_xml(&si));
        let xml = build_signed_info_xml(&si);
        assert!(xml.contains("URI=\"#_id1\""));
        assert!(xml.contains("enveloped-signature"));
        assert!(xml.contains("<ds:DigestValue>AAAA</ds:DigestValue>"));
    }

    #[test]
    fn digest_uri_dispatch() {
        let d256 = compute_digest(digest_algorithms::SHA256, b"data").unwrap();
        let d384 = compute_digest(digest_algorithms::SHA384, b"data").unwrap();
        let d512 = compute_digest(digest_algorithms::SHA512, b"data").unwrap();
        assert_eq!(d256.len(), 32);
        assert_eq!(d384.len(), 48);
        assert_eq!(d512.len(), 64);
        assert!(compute_digest("urn:bogus", b"data").is_err());
    }

    #[test]
    fn insert_after_issuer_splices_in_place() {
        let xml = "<saml:Assertion><saml:Issuer>idp</saml:Issuer><saml:Subject/></saml:Assertion>";
        let out = insert_after_issuer(xml, "<SIG/>").unwrap();
        assert_eq!(
            out,
            "<saml:Assertion><saml:Issuer>idp</saml:Issuer><SIG/><saml:Subject/></saml:Assertion>"
        );
    }

    #[test]
    fn insert_requires_issuer() {
        assert!(insert_after_issuer("<saml:Assertion/>", "<SIG/>").is_err());
    }

    #[test]
    fn verify_without_factory_is_a_configuration_error() {
        let signature = Signature {
            signed_info: sample_signed_info(),
            key_info: None,
            signature_value: String::new(),
            signed_xml: String::new(),
        };

        #[derive(Debug)]
        struct NeverKey;
        impl SecurityKey for NeverKey {
            fn key_id(&self) -> Option<&str> {
                None
            }
            fn verify(&self, _: &str, _: &[u8], _: &[u8]) -> Saml2Result<bool> {
                Ok(false)
            }
        }

        let err = signature.verify(&NeverKey).unwrap_err();
        assert!(matches!(err, Saml2Error::InvalidConfiguration(_)));
    }
}
