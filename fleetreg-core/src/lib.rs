//! # fleetreg-core
//!
//! Substrate-agnostic core of the fleetreg service registry.
//!
//! ## What this crate provides
//!
//! - [`kv`] - the replicated key/value substrate contract (ranges,
//!   transactions, leases, prefix watches) that the registry data plane
//!   is written against. Adaptors live in `fleetreg-server`.
//! - [`keys`] - the catalog key grammar: namespaces, key builders and
//!   parsers, prefix arithmetic.
//! - [`schemas`] - persisted record shapes (`NodeRecord`) and the node
//!   role vocabulary carried in certificate OUs.
//! - [`secrets`] - the 32-byte cluster secret, the shareable bootstrap
//!   token codec and domain-separated key derivation.
//! - [`ca`] - the internal certificate authority: deterministic root and
//!   node CAs, per-peer server certificates, short-lived node
//!   certificates and the renewal arithmetic.
//! - [`config`] - registry peer configuration.
//!
//! Everything here is deliberately free of networking and storage so the
//! full data plane can be exercised against an in-memory substrate.

mod errors;
pub mod keys;
mod schemas;

pub mod ca;
pub mod config;
pub mod kv;
pub mod secrets;

pub use errors::*;
pub use schemas::*;

#[cfg(test)]
mod ca_test;
#[cfg(test)]
mod keys_test;
