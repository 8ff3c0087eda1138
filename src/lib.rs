#![allow(missing_docs)]
#![deny(unsafe_code)]

pub mod arena;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod rate_limit;
pub mod retry;
pub mod signer;
pub mod types;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use arena::{ArenaManager, ArenaStats};
pub use client::FarcasterClient;
pub use config::ClientConfig;
pub use error::{ErrorKind, FarcasterError, Result};
pub use message::{MessageBody, MessageData, UserDataType};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use signer::SigningEngine;
pub use types::{Cast, CastId, ClientStats, Fid, User};

pub fn create_client_from_env() -> Result<FarcasterClient> {
    let config = ClientConfig::from_env()?;
    FarcasterClient::new(config)
}

pub const PLUGIN_NAME: &str = "farcaster-hub";
pub const PLUGIN_DESCRIPTION: &str =
    "Farcaster hub client for elizaOS - signed casts, reactions and links over the hub HTTP API";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod defaults {
    pub const HUB_URL: &str = "https://hub.pinata.cloud";
    pub const TIMEOUT_MS: u64 = 30_000;
    pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

    pub const RATE_LIMIT_MAX_REQUESTS: u32 = 100;
    pub const RATE_LIMIT_WINDOW_MS: u64 = 60_000;

    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 100;
    pub const RETRY_MAX_DELAY_MS: u64 = 5_000;
    pub const RETRY_EXPONENTIAL_BASE: f64 = 2.0;

    pub const MAX_CAST_LENGTH: usize = 320;
    pub const MAX_EMBEDS: usize = 2;
}
