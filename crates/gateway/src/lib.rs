//! HTTP surface: ingestion webhook, outbound send, health.

pub mod send_routes;
pub mod server;
pub mod webhook_routes;

pub use server::{AppState, build_app, serve};
