//! Backend line-protocol client: reply parsing and typed commands.

pub mod client;
pub mod reply;

pub use client::{ClientIdentity, ProtocolClient, ProtocolError, ServerInfo, WhoEntry, BASE_ROOM};
pub use reply::{Reply, ReplyClass, LISTING_END};
