//! SAML 2.0 types and data structures.
//!
//! This module contains the core SAML assertion data model together with
//! the constants defined by the SAML 2.0 and XML Signature specifications.

mod assertion;
pub mod constants;
mod name_id;

pub use assertion::*;
pub use constants::{NameIdFormat, SignatureAlgorithm};
pub use name_id::*;
