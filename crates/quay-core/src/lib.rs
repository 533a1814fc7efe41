//! # quay-core
//!
//! Core types, collaborator traits, and error types for Quay.
//!
//! This crate provides the foundational types shared across all Quay crates:
//! - Entity structs for content, staging zones, deal queue rows, the backfill
//!   tracker, and storage providers
//! - Zone status enum with state machine transitions
//! - Id aliases and padded piece size math
//! - Storage provider asks and price ceilings
//! - Store traits implemented by `quay-db` (and in-memory fakes in tests)
//! - `StorageClient` / `ZoneFinalizer` collaborator traits
//! - Cross-cutting error types

pub mod ask;
pub mod client;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
pub mod store;
