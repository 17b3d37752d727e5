//! SAML 2.0 vocabulary: namespaces, URIs and timestamps.

mod constants;
mod instant;

pub use constants::*;
pub use instant::*;
