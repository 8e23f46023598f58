//! Shared types and error utilities used across all courier crates.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{ClientStatus, ConversationStatus, MessageKind},
};
