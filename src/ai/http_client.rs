//! Shared HTTP Client Module
//!
//! Provides global, lazy-initialized HTTP clients with connection pooling.
//! This eliminates the overhead of creating new clients per request and
//! enables connection reuse across all AI API calls.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Global HTTP client for OpenAI chat/vision calls
///
/// Configuration:
/// - 90s timeout covers slow vision responses
/// - 20 idle connections per host for parallel pipelines
/// - 90s idle timeout to balance resource usage and performance
pub static OPENAI_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create OpenAI HTTP client")
});

/// Global HTTP client for audio transcription uploads
///
/// Longer timeout: transcription requests carry the whole audio file.
pub static TRANSCRIPTION_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(300))
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("Failed to create transcription HTTP client")
});

/// Get the global OpenAI HTTP client
#[inline]
pub fn openai_client() -> &'static Client {
    &OPENAI_CLIENT
}

/// Get the global transcription HTTP client
#[inline]
pub fn transcription_client() -> &'static Client {
    &TRANSCRIPTION_CLIENT
}
