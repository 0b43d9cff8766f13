//! Preference domain model and wire codec.
//!
//! # Responsibility
//! - Define the canonical preference record shared by every window replica.
//! - Own the JSON wire shape used by durable storage and the event bus.
//!
//! # Invariants
//! - Field wire names (`fontSize`, `wordWrap`) are stable across releases.
//! - Payloads are accepted or rejected as a whole, never half-applied.

pub mod preferences;
