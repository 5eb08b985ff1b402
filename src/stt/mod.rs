//! Speech-to-text transports.
//!
//! Two interchangeable capture paths: a persistent realtime streaming
//! session and a buffer-everything batch request, behind a selector that
//! falls back from realtime to batch on recoverable startup failures.

pub mod batch;
pub mod models;
pub mod realtime;
pub mod selector;

use serde::Serialize;

pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;
const BYTES_PER_MS: usize = SAMPLE_RATE as usize * BYTES_PER_SAMPLE / 1000;

/// Smallest buffer the service will accept for a commit.
pub const MIN_BUFFER_MS: usize = 100;
pub const MIN_BUFFER_BYTES: usize = MIN_BUFFER_MS * BYTES_PER_MS;

/// Recordings shorter than this are rejected before any upload.
pub const MIN_RECORDING_MS: usize = 600;
pub const MIN_RECORDING_BYTES: usize = MIN_RECORDING_MS * BYTES_PER_MS;

pub const COMMIT_INTERVAL_MS: u64 = 900;
pub const CLOSE_WAIT_MS: u64 = 900;
pub const STARTUP_GRACE_MS: u64 = 600;

pub const TOO_SHORT_MESSAGE: &str = "Recording too short (min 0.6s). Please speak a bit longer.";

/// Which transport is carrying the current session.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Batch,
    Realtime,
}

/// Callbacks surfaced to the host while a session is live.
///
/// Delivered from the transport's event handling; implementations must be
/// cheap and non-blocking.
pub trait SttEvents: Send + Sync {
    /// Incremental transcription fragment from the live session.
    fn on_delta(&self, delta: &str);
    /// Full live text so far (committed transcript plus uncommitted suffix).
    fn on_live(&self, live_text: &str);
    /// Transport error after startup; reported at most once per session.
    fn on_error(&self, message: &str);
}

/// Host that ignores live updates (batch-style consumers).
pub struct NullEvents;

impl SttEvents for NullEvents {
    fn on_delta(&self, _delta: &str) {}
    fn on_live(&self, _live_text: &str) {}
    fn on_error(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_derive_from_sample_rate() {
        // 24 kHz, 16-bit mono: 48 bytes per millisecond.
        assert_eq!(BYTES_PER_MS, 48);
        assert_eq!(MIN_BUFFER_BYTES, 4_800);
        assert_eq!(MIN_RECORDING_BYTES, 28_800);
    }

    #[test]
    fn transport_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransportKind::Realtime).unwrap(),
            "\"realtime\""
        );
        assert_eq!(
            serde_json::to_string(&TransportKind::Batch).unwrap(),
            "\"batch\""
        );
    }
}
