//! Domain records for documented data structures.
//!
//! # Responsibility
//! - Define the plain data shapes exchanged between repositories, services
//!   and the request surface.
//! - Keep JSON field naming (`camelCase`, `type`) in one place.
//!
//! # Invariants
//! - Records are identified by database-assigned integer ids.
//! - Entity deletion is a `deleted_at` tombstone; property deletion is physical.

pub mod audit;
pub mod catalog;
pub mod entity;
pub mod property;
pub mod user;

/// Unix epoch milliseconds, the unit of every persisted timestamp.
pub type EpochMillis = i64;
