//! Transport selection and realtime-to-batch fallback.

use super::batch::BatchSttClient;
use super::realtime::RealtimeSttClient;
use super::{SttEvents, TransportKind};
use crate::settings::{AppSettings, TranscriptionTransport};
use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, Clone)]
pub struct StartOutcome {
    pub transport: TransportKind,
    pub notice: Option<String>,
}

/// Facade over the two capture transports. Picks one per the user's
/// preference on `start()`; after that, frames and `stop()` route to
/// whichever transport is active. There is no mid-session switch.
pub struct SttClient {
    events: Arc<dyn SttEvents>,
    batch: BatchSttClient,
    realtime: Option<RealtimeSttClient>,
    active: TransportKind,
}

impl SttClient {
    pub fn new(events: Arc<dyn SttEvents>) -> Self {
        Self {
            batch: BatchSttClient::new(events.clone()),
            events,
            realtime: None,
            active: TransportKind::Batch,
        }
    }

    pub fn active_transport(&self) -> TransportKind {
        self.active
    }

    /// Start a capture session on the preferred transport. A realtime
    /// startup failure that looks recoverable (network trouble or missing
    /// realtime access) silently restarts on batch and returns a notice;
    /// anything else propagates.
    pub async fn start(&mut self, settings: &AppSettings) -> Result<StartOutcome> {
        if settings.stt_transport == TranscriptionTransport::Realtime {
            self.active = TransportKind::Realtime;
            let mut realtime = RealtimeSttClient::new(self.events.clone());
            match realtime.start(settings).await {
                Ok(()) => {
                    info!("Capture session started on realtime transport");
                    self.realtime = Some(realtime);
                    return Ok(StartOutcome {
                        transport: TransportKind::Realtime,
                        notice: None,
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    if !should_fallback_to_batch(&message) {
                        self.realtime = None;
                        self.active = TransportKind::Batch;
                        return Err(err);
                    }
                    warn!("Realtime start failed ({}), falling back to batch", message);
                    self.realtime = None;
                    self.active = TransportKind::Batch;
                    self.batch.start(settings)?;
                    return Ok(StartOutcome {
                        transport: TransportKind::Batch,
                        notice: Some(format!(
                            "Realtime unavailable ({}). Using Batch instead.",
                            format_realtime_notice(&message)
                        )),
                    });
                }
            }
        }

        self.active = TransportKind::Batch;
        self.batch.start(settings)?;
        info!("Capture session started on batch transport");
        Ok(StartOutcome {
            transport: TransportKind::Batch,
            notice: None,
        })
    }

    pub fn append_audio(&mut self, frame: &[u8]) {
        match self.active {
            TransportKind::Realtime => {
                if let Some(realtime) = &self.realtime {
                    realtime.append_audio(frame);
                }
            }
            TransportKind::Batch => self.batch.append_audio(frame),
        }
    }

    pub async fn stop(&mut self, settings: &AppSettings) -> Result<String> {
        match self.active {
            TransportKind::Realtime => {
                let transcript = match self.realtime.as_mut() {
                    Some(realtime) => realtime.stop().await,
                    None => Ok(String::new()),
                };
                self.realtime = None;
                transcript
            }
            TransportKind::Batch => self.batch.stop(settings).await,
        }
    }
}

/// Heuristic classification of realtime startup failures. Network trouble
/// and access denials both restart on batch; everything else is fatal.
fn should_fallback_to_batch(message: &str) -> bool {
    let normalized = message.to_lowercase();
    [
        "not supported in realtime",
        "realtime mode",
        "not permitted",
        "not available",
        "access",
        "dns",
        "failed to lookup",
        "network",
        "socket",
        "timeout",
        "timed out",
        "connect",
    ]
    .iter()
    .any(|pattern| normalized.contains(pattern))
}

fn format_realtime_notice(message: &str) -> String {
    let normalized = message.to_lowercase();
    if normalized.contains("not supported in realtime")
        || normalized.contains("not permitted")
        || normalized.contains("access")
    {
        return "This key/model does not have Realtime access".to_string();
    }
    if normalized.contains("dns") || normalized.contains("failed to lookup") {
        return "Network/DNS error reaching api.openai.com".to_string();
    }
    if normalized.contains("timeout") || normalized.contains("timed out") {
        return "Network timeout reaching api.openai.com".to_string();
    }
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::NullEvents;

    #[test]
    fn access_denial_is_recoverable() {
        assert!(should_fallback_to_batch(
            "Realtime access is not enabled for this key/model."
        ));
        assert!(should_fallback_to_batch(
            "Model whisper-1 is not supported in realtime mode"
        ));
    }

    #[test]
    fn network_failures_are_recoverable() {
        assert!(should_fallback_to_batch("dns error: failed to lookup address"));
        assert!(should_fallback_to_batch("connection timed out"));
        assert!(should_fallback_to_batch("Realtime connection failed: socket hang up"));
    }

    #[test]
    fn unrelated_errors_are_fatal() {
        assert!(!should_fallback_to_batch("Enrichment JSON did not match schema."));
        assert!(!should_fallback_to_batch("invalid session configuration"));
    }

    #[test]
    fn notice_names_the_reason() {
        let notice = format_realtime_notice("Realtime access is not enabled for this key/model.");
        assert_eq!(notice, "This key/model does not have Realtime access");

        let notice = format_realtime_notice("connection timed out");
        assert_eq!(notice, "Network timeout reaching api.openai.com");

        // Unclassified messages pass through verbatim.
        assert_eq!(format_realtime_notice("socket hang up"), "socket hang up");
    }

    #[tokio::test]
    async fn batch_preference_skips_realtime_entirely() {
        let settings = AppSettings {
            api_key: "sk-test".to_string(),
            ..AppSettings::default()
        };
        let mut client = SttClient::new(Arc::new(NullEvents));
        let outcome = client.start(&settings).await.unwrap();
        assert_eq!(outcome.transport, TransportKind::Batch);
        assert!(outcome.notice.is_none());
        assert_eq!(client.active_transport(), TransportKind::Batch);
    }

    #[tokio::test]
    async fn batch_session_after_start_accepts_frames_and_enforces_duration() {
        let settings = AppSettings {
            api_key: "sk-test".to_string(),
            ..AppSettings::default()
        };
        let mut client = SttClient::new(Arc::new(NullEvents));
        client.start(&settings).await.unwrap();
        client.append_audio(&[0u8; 2048]);
        let err = client.stop(&settings).await.unwrap_err();
        assert!(err.to_string().contains("too short"));
    }
}
