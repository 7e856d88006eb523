//! # Protocol Layer
//!
//! What the endpoints say to each other: the handshake that authenticates a
//! connection, the request/response messages, the tokens that authorize each
//! request, and the registry that routes a request to its handler.

pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod token;

#[cfg(test)]
mod tests;
