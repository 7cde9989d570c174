//! # Family Tree Core
//!
//! Shared, I/O-free logic for Family Tree: the person model, input
//! adapters, relationship normalization, tree presentation, profile views,
//! JSON recovery for completion output, the store abstraction, and the
//! CRUD gateway and import pipeline built on top of it.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem code.
//! Native concerns live in the `family-tree` application crate.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │ FamilyStore  │──▶│ SourceTables │──▶│ normalize  │──▶│ tree/    │
//! │ rows + edges │   │  (adapter)   │   │            │   │ views    │
//! └──────▲───────┘   └──────────────┘   └────────────┘   └──────────┘
//!        │
//!  FamilyService (create / update / import) ── invalidates ──▶ TreeCache
//! ```

pub mod adapter;
pub mod cache;
pub mod error;
pub mod import;
pub mod json;
pub mod models;
pub mod normalize;
pub mod service;
pub mod store;
pub mod text;
pub mod tree;
pub mod views;
