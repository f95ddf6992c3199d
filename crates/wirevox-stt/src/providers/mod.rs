//! Provider adapters and the selection factory
//!
//! The factory is the single point of adapter construction: call sites stay
//! polymorphic over the [`SttSession`] contract and never name a concrete
//! provider type. Construction is pure — no network I/O happens until
//! `start()`.

mod common;
pub mod deepgram;
pub mod elevenlabs;

use std::str::FromStr;

use tracing::info;

use crate::session::SttSession;
use crate::types::{SessionConfig, DEFAULT_LANGUAGE, DEFAULT_SAMPLE_RATE};

pub use deepgram::DeepgramSession;
pub use elevenlabs::ElevenLabsSession;

/// The closed set of provider kinds this layer knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Commit-acknowledged segment protocol
    ElevenLabs,
    /// Continuous protocol with server-side end-of-utterance detection
    Deepgram,
    /// Batch-only transcription; not representable as a streaming session
    Whisper,
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "elevenlabs" => Ok(ProviderKind::ElevenLabs),
            "deepgram" => Ok(ProviderKind::Deepgram),
            "whisper" => Ok(ProviderKind::Whisper),
            _ => Err(()),
        }
    }
}

/// Inbound construction request: requested provider plus the credential and
/// audio parameters for the session.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub provider: String,
    pub api_key: String,
    pub sample_rate: Option<u32>,
    pub language: Option<String>,
    pub model: Option<String>,
    pub region: Option<String>,
}

impl SessionRequest {
    fn to_config(&self) -> SessionConfig {
        SessionConfig {
            api_key: self.api_key.clone(),
            sample_rate: self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            language: self
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            model: self.model.clone(),
            region: self.region.clone(),
            endpoint_override: None,
            keepalive_interval: None,
        }
    }
}

/// Construct the streaming adapter for the requested provider, or `None`
/// when the provider is unrecognized, its credential is missing, or it is a
/// batch-only mode. Connection failures surface later, from `start()`.
pub fn create_session(request: &SessionRequest) -> Option<Box<dyn SttSession>> {
    let Ok(kind) = request.provider.parse::<ProviderKind>() else {
        info!(provider = %request.provider, "Unrecognized STT provider, no session created");
        return None;
    };
    if request.api_key.trim().is_empty() {
        info!(provider = %request.provider, "Missing credential for STT provider, no session created");
        return None;
    }
    match kind {
        ProviderKind::ElevenLabs => Some(Box::new(ElevenLabsSession::new(request.to_config()))),
        ProviderKind::Deepgram => Some(Box::new(DeepgramSession::new(request.to_config()))),
        ProviderKind::Whisper => {
            info!("Whisper is batch-only and has no streaming session, no session created");
            None
        }
    }
}
