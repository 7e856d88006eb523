//! # Service Layer
//!
//! The endpoint roles built on top of the transport: an encrypted
//! connection wrapper, the request-serving loop, the retrying client, and
//! the [`SecureBridge`](bridge::SecureBridge) that ties both roles together.

pub mod bridge;
pub mod client;
pub mod secure;
pub mod server;
