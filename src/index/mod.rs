//! Index Service Module
//!
//! Authoritative registry mapping every partition key to the ordered list of
//! storage units serving it. Lists are append-only: units are never removed
//! or merged, and the newest unit of a key is its write target.

pub mod handlers;
pub mod protocol;
pub mod service;
