//! # Skiff Transport
//!
//! Network transports implementing [`skiff_core::Transport`].
//!
//! ## Features
//!
//! - `http-client`: [`HttpTransport`], a reqwest client for the bot HTTP API
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  skiff-runtime      │  (poll loop, handlers)
//! ├─────────────────────┤
//! │  skiff-core         │  (Transport trait)
//! ├─────────────────────┤
//! │  skiff-transport    │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (HTTP)     │
//! └─────────────────────┘
//! ```
//!
//! Response classification and User-Agent formatting live in [`http`] and
//! are available without any feature enabled.

pub mod http;

#[cfg(feature = "http-client")]
pub use http::{HttpConfig, HttpTransport};
pub use http::{classify_response, user_agent};
