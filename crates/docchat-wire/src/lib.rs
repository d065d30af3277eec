//! docchat-wire: Wire protocol for the docchat backend
//!
//! This crate provides the message and citation types exchanged with the
//! backend, the incremental decoder for its newline-delimited JSON stream,
//! and an HTTP client implementing the `ChatBackend` trait.

pub mod client;
pub mod error;
pub mod frame;
pub mod types;

pub use client::{ChatBackend, FrameStream, HttpBackend};
pub use error::{Error, Result};
pub use frame::FrameDecoder;
pub use types::*;
