//! Skin Edit Core - Shared types library.
//!
//! This crate provides the domain types used across the Skin Edit components:
//! - `assistant` - Chat assistant server (websocket transport + order API)
//! - `cli` - Command-line tools for migrations, catalog seeding and orders
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. The optional `postgres` feature adds `sqlx`
//! encode/decode support so the types can be bound directly in queries.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, order status and chat roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
