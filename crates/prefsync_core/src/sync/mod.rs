//! Cross-window preference synchronization.
//!
//! # Responsibility
//! - Wire one window's replica to durable storage and the event bus.
//! - Own the echo-suppression boundary between local and inbound changes.

pub mod controller;
