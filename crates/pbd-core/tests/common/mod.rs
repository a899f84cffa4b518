//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod media_server;

use pbd_core::config::{FetchConfig, ProxyConfig};

/// Proxy settings pointing at a local test server.
pub fn proxy_config(port: u16) -> ProxyConfig {
    ProxyConfig {
        host: "127.0.0.1".to_string(),
        port,
        username: Some("brd-customer-test".to_string()),
        password: Some("pw".to_string()),
        ..ProxyConfig::default()
    }
}

/// Fetch settings with a small minimum payload so test bodies stay short.
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        timeout_secs: 5,
        min_payload_bytes: 1_000,
        ..FetchConfig::default()
    }
}

/// Deterministic payload of `len` bytes.
pub fn media_body(len: usize) -> Vec<u8> {
    (0u8..251).cycle().take(len).collect()
}
