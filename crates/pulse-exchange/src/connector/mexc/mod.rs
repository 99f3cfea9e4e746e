//! MEXC 커넥터.

mod client;

pub use client::{MexcClient, MexcConfig, RateLimitStatus, REQUEST_WEIGHT_CAPACITY};
