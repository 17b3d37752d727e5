//! End-to-end integration tests.
//!
//! These tests run complete SSO and logout exchanges between an identity
//! provider and a service provider that only know each other through
//! published metadata.

mod bindings;
mod common;
mod logout_flow;
mod metadata_exchange;
mod sso_flow;
