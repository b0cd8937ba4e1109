//! Core types for Skin Edit.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::*;
pub use price::{CURRENCY_CODE, Price};
pub use status::*;
