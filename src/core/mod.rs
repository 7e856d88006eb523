//! # Core Protocol Components
//!
//! Low-level packet handling, codecs, and message serialization.
//!
//! ## Components
//! - **Packet**: Binary frame with magic bytes and length prefix
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Serialization**: JSON, MessagePack and schema-binary message encodings
//! - **Schema**: Typed value model behind the schema-binary format
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum packet size: 16MB (prevents memory exhaustion)
//! - Length validation before allocation

pub mod codec;
pub mod packet;
pub mod schema;
pub mod serialization;
