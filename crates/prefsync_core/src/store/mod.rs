//! Reactive state containers.
//!
//! # Responsibility
//! - Provide the per-window replica that UI code reads and mutates.
//! - Stay free of storage and transport concerns.

pub mod settings_store;
