//! # Transport Layer
//!
//! TCP dialing and accepting, each ending in an authenticated
//! [`SecureConnection`](crate::service::secure::SecureConnection).

pub mod tcp;
