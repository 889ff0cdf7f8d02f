//! Single-request HTTP transport.
//!
//! This module has no retry logic of its own:
//! - [`HttpClient`] - one pooled `reqwest` client for JSON calls and payload streams
//! - [`TransportError`] - classified failures of one exchange

mod client;
mod error;

pub use client::{Access, HttpClient};
pub use error::TransportError;
