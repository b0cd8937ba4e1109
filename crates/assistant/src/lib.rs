//! Skin Edit shopping assistant library.
//!
//! A conversational commerce assistant: each websocket connection is a chat
//! session with its own cart, profile and history. User messages drive a
//! tool-calling loop against an OpenAI-compatible model; tools search the
//! catalog, manage the cart and start checkout, which then collects delivery
//! details and places the order atomically.
//!
//! # Layout
//!
//! - [`session`] - per-connection state and the live connection registry
//! - [`tools`] - tool schemas, typed arguments and the executor
//! - [`services`] - the chat loop and the checkout flow
//! - [`llm`] - model gateway
//! - [`db`] - catalog and order store (`PostgreSQL` and in-memory)
//! - [`routes`] - websocket endpoint and JSON API

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
