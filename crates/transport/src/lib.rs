//! Seam to the messaging-network transport collaborator.
//!
//! The live connection (handshake, login, media download) lives outside this
//! system; the pipeline consumes it as an event source plus a send facility.
//! This crate defines the inbound event shape, the per-bot session registry
//! (lookup by key only), and the exhaustive mapping from a send request to
//! the transport's wire payload.

pub mod event;
pub mod registry;
pub mod send;

pub use {
    event::InboundEvent,
    registry::{Transport, TransportRegistry},
    send::{MediaRef, SendError, SendPayload, SendRequest, normalize_address},
};
