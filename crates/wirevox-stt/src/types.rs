//! Core types for the streaming STT session layer

use std::time::Duration;

/// Default audio sample rate: 16 kHz mono S16LE PCM.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Default language code passed to providers.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Immutable per-session configuration handed to an adapter by the factory.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Provider credential. The factory guarantees this is non-empty before
    /// an adapter ever sees it.
    pub api_key: String,
    /// Input sample rate in Hz
    pub sample_rate: u32,
    /// Language code (ISO 639-1)
    pub language: String,
    /// Provider-specific model identifier override
    pub model: Option<String>,
    /// Geographic routing region (provider-specific subdomain)
    pub region: Option<String>,
    /// Full endpoint URL override, used for staging and test servers
    pub endpoint_override: Option<String>,
    /// Keep-alive ping interval override for providers that need one;
    /// `None` uses the provider default
    pub keepalive_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            language: DEFAULT_LANGUAGE.to_string(),
            model: None,
            region: None,
            endpoint_override: None,
            keepalive_interval: None,
        }
    }
}

/// A single recognized unit, interim or final.
///
/// Interim events carry a preview (committed buffer + pending text); final
/// events carry the full committed buffer after the segment was appended.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Confidence score (0.0-1.0) when the provider reports one
    pub confidence: Option<f32>,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: None,
        }
    }

    pub fn final_with(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence,
        }
    }
}

/// Session counters, kept by each adapter instance
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    /// Audio chunks handed to the transport
    pub chunks_sent: u64,
    /// Audio chunks dropped because the session was not connected
    pub chunks_dropped: u64,
    /// Interim transcript events emitted
    pub partial_count: u64,
    /// Final transcript events emitted
    pub final_count: u64,
    /// Error events emitted
    pub error_count: u64,
}
