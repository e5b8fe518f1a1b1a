//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are plain integers; maps keyed by ID use their decimal string form.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod ballot;
pub mod election;
pub mod receipt;
