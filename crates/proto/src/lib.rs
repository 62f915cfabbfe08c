//! # Kwik Proto
//!
//! Wire messages for the KwikMedical dispatch core.
//!
//! Contains:
//! - Protobuf message and enum types (`pb` module)
//! - Conversions to and from `kwik-core` entities (`convert` module)
//!
//! The messages are declared with `prost` derives directly, so building this crate needs no
//! `protoc`.

pub mod convert;
pub mod pb;

pub use convert::{WireError, WireResult};
pub use prost::Message;
