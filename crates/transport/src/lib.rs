//! Wire protocol for ring traffic.
//!
//! This crate provides the pieces every listening process shares:
//! - A length-prefixed bincode frame codec
//! - The typed request / response schema, one variant per ring command
//! - `TcpRpc`, the TCP implementation of [`corelib::RingRpc`]

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;

pub use client::TcpRpc;
pub use codec::{read_message, write_message, MessageCodec, MAX_FRAME_SIZE};
pub use error::{Result, TransportError};
pub use protocol::{ClientReply, PublishRequest, Request, Response, RingParams, SubscribeRequest};
