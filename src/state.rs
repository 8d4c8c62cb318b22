//! Shared session state backing the public engine surface
//!
//! One [`SharedState`] instance lives for the lifetime of a
//! [`SessionController`](crate::session::SessionController). The session
//! event loop and the audio callbacks write into it; UI-facing getters read
//! from it. Scalar signals use atomics so the capture callback never blocks.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Connection status of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No session; initial and terminal state for a clean stop
    Disconnected,
    /// Acquiring microphone and opening the transport
    Connecting,
    /// Duplex stream open, audio flowing
    Connected,
    /// Terminated by a permission or transport fault
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl Status {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
        }
    }
}

/// Citation attached by the remote service to ground a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// Kind of media the remote side asked the host to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Text,
    Music,
}

/// The most recent display instruction from the remote side
///
/// At most one is current at a time; a new one replaces the old.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Session-visible shared state
#[derive(Debug)]
pub struct SharedState {
    status: AtomicU8,
    /// Input RMS loudness, f32 bits, clamped to [0, 1]
    loudness: AtomicU32,
    /// Output gain, f32 bits, clamped to [0, 1]; persists across sessions
    gain: AtomicU32,
    citations: Mutex<Vec<GroundingSource>>,
    display: Mutex<Option<MediaContent>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(Status::Disconnected.as_u8()),
            loudness: AtomicU32::new(0.0f32.to_bits()),
            gain: AtomicU32::new(1.0f32.to_bits()),
            citations: Mutex::new(Vec::new()),
            display: Mutex::new(None),
        }
    }
}

impl SharedState {
    /// Current connection status
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status.as_u8(), Ordering::Release);
        tracing::debug!(%status, "session status");
    }

    /// Current input loudness in [0, 1]
    #[must_use]
    pub fn input_loudness(&self) -> f32 {
        f32::from_bits(self.loudness.load(Ordering::Relaxed))
    }

    pub(crate) fn set_input_loudness(&self, loudness: f32) {
        self.loudness
            .store(loudness.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Current output gain in [0, 1]
    #[must_use]
    pub fn output_gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub(crate) fn set_output_gain(&self, gain: f32) {
        self.gain
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Snapshot of accumulated citations, deduplicated by URI
    #[must_use]
    pub fn citations(&self) -> Vec<GroundingSource> {
        self.citations.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Merge new citations into the set, skipping URIs already present
    pub(crate) fn merge_citations(&self, sources: Vec<GroundingSource>) {
        if let Ok(mut citations) = self.citations.lock() {
            for source in sources {
                if !citations.iter().any(|c| c.uri == source.uri) {
                    citations.push(source);
                }
            }
        }
    }

    /// Clear all citations (a fresh utterance invalidates prior ones)
    pub(crate) fn clear_citations(&self) {
        if let Ok(mut citations) = self.citations.lock() {
            citations.clear();
        }
    }

    /// The current display instruction, if any
    #[must_use]
    pub fn current_display(&self) -> Option<MediaContent> {
        self.display.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub(crate) fn set_display(&self, content: Option<MediaContent>) {
        if let Ok(mut display) = self.display.lock() {
            *display = content;
        }
    }

    /// Reset per-session signals ahead of a new connection
    ///
    /// Output gain survives; everything else starts fresh.
    pub(crate) fn reset_for_connect(&self) {
        self.set_input_loudness(0.0);
        self.clear_citations();
        self.set_display(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(uri: &str) -> GroundingSource {
        GroundingSource {
            title: format!("title for {uri}"),
            uri: uri.to_string(),
        }
    }

    #[test]
    fn citations_dedupe_by_uri() {
        let state = SharedState::default();
        state.merge_citations(vec![source("https://a"), source("https://b")]);
        state.merge_citations(vec![source("https://a"), source("https://c")]);

        let uris: Vec<_> = state.citations().into_iter().map(|c| c.uri).collect();
        assert_eq!(uris, ["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn loudness_is_clamped() {
        let state = SharedState::default();
        state.set_input_loudness(3.5);
        assert!((state.input_loudness() - 1.0).abs() < f32::EPSILON);
        state.set_input_loudness(-0.2);
        assert!(state.input_loudness().abs() < f32::EPSILON);
    }

    #[test]
    fn gain_survives_reset() {
        let state = SharedState::default();
        state.set_output_gain(0.4);
        state.merge_citations(vec![source("https://a")]);
        state.set_display(Some(MediaContent {
            kind: MediaKind::Text,
            url: None,
            content: Some("hi".into()),
            title: None,
        }));

        state.reset_for_connect();

        assert!((state.output_gain() - 0.4).abs() < f32::EPSILON);
        assert!(state.citations().is_empty());
        assert!(state.current_display().is_none());
    }

    #[test]
    fn status_roundtrip() {
        let state = SharedState::default();
        assert_eq!(state.status(), Status::Disconnected);
        for status in [
            Status::Connecting,
            Status::Connected,
            Status::Error,
            Status::Disconnected,
        ] {
            state.set_status(status);
            assert_eq!(state.status(), status);
        }
    }
}
