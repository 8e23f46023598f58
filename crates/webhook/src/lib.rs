//! Stateless webhook poster shared by single-message and batch delivery.
//!
//! Encapsulates the retry/backoff/error-classification policy: 2xx is
//! delivered, 4xx is a terminal rejection, everything else (5xx, network
//! error, timeout) is retried with exponential backoff before being
//! surfaced as a retryable failure.

pub mod poster;

pub use poster::{Delivery, Poster, PosterConfig};
