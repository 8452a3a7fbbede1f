//! SAML 2.0 security token handling.
//!
//! This crate creates signed SAML 2.0 assertions from a description of an
//! authenticated principal, and reads, verifies and validates incoming
//! assertions into a claims-principal representation:
//!
//! - **Token reading** - size-gated parsing of assertion XML into an
//!   in-memory model
//! - **Signature verification** - trial verification against an ordered
//!   candidate key set with precise failure diagnostics
//! - **Condition validation** - lifetime, audience restriction,
//!   one-time-use and proxy-restriction policy
//! - **Claims translation** - subjects and statements become claims;
//!   delegation chains ride along as nested actor identities
//! - **Token creation** - the reverse path, from a token descriptor to a
//!   signed assertion
//!
//! # Architecture
//!
//! - [`handler`] - the [`Saml2TokenHandler`] validation/creation pipeline
//! - [`types`] - the SAML assertion data model and constants
//! - [`claims`] - the claims-principal model validation produces
//! - [`validation`] - validation parameters and default validator stages
//! - [`keys`] - the [`SecurityKey`] capability and RSA implementation
//! - [`signature`] / [`transforms`] - XML-DSig verification plumbing
//! - [`serializer`] - assertion XML reading and writing
//! - [`error`] - error types for all token operations
//!
//! # Example
//!
//! ```rust,ignore
//! use saml2_token::{Saml2TokenHandler, SecurityTokenDescriptor, ValidationParameters};
//!
//! let handler = Saml2TokenHandler::new();
//! let token = handler.create_token(&descriptor)?;
//! let xml = handler.write_token(&token)?;
//!
//! let (principal, validated) = handler.validate_token(xml.as_bytes(), &params)?;
//! ```
//!
//! # SAML Specifications
//!
//! This implementation follows these specifications:
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod actor;
mod attributes;
pub mod claims;
pub mod error;
pub mod handler;
pub mod keys;
pub mod serializer;
pub mod signature;
pub mod transforms;
pub mod types;
pub mod validation;

pub use claims::{Claim, ClaimsIdentity, ClaimsPrincipal};
pub use error::{Saml2Error, Saml2Result, SignatureDiagnostics};
pub use handler::{
    Saml2SecurityToken, Saml2TokenHandler, SecurityTokenDescriptor, DEFAULT_MAXIMUM_TOKEN_SIZE,
};
pub use keys::{EncryptingCredentials, RsaSecurityKey, SecurityKey, SigningCredentials};
pub use serializer::Saml2Serializer;
pub use transforms::{DefaultTransformFactory, Transform, TransformData, TransformFactory};
pub use types::*;
pub use validation::ValidationParameters;
