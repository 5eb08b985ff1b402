//! Realtime streaming transcription transport.
//!
//! Holds one persistent WebSocket session against the realtime endpoint and
//! drives its own buffering/commit cadence; server-side turn detection is
//! disabled so the commit timer, not voice activity, decides segmentation.
//! Inbound delta/completed events rebuild the transcript incrementally.

use super::models::{is_realtime_model, resolve_realtime_model, transcription_prompt};
use super::{
    SttEvents, CLOSE_WAIT_MS, COMMIT_INTERVAL_MS, MIN_BUFFER_BYTES, MIN_RECORDING_BYTES,
    STARTUP_GRACE_MS, TOO_SHORT_MESSAGE,
};
use crate::settings::AppSettings;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

const REALTIME_WS_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";

const DELTA_EVENT: &str = "conversation.item.input_audio_transcription.delta";
const COMPLETED_EVENT: &str = "conversation.item.input_audio_transcription.completed";
const COMMITTED_EVENT: &str = "input_audio_buffer.committed";
const ERROR_EVENT: &str = "error";

const PROBE_LEAD_MS: u64 = 200;
const PROBE_TIMEOUT_MS: u64 = 2200;
const TASK_DRAIN_MS: u64 = 500;

#[derive(Deserialize, Debug)]
struct InboundEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<InboundError>,
}

#[derive(Deserialize, Debug)]
struct InboundError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AccessCheck {
    pub ok: bool,
    pub message: String,
}

/// Live session counters and transcript accumulation.
///
/// Mutated only under its mutex, from one event at a time; the transition
/// methods are pure enough to test without a connection.
#[derive(Debug, Default)]
struct SessionState {
    final_transcript: String,
    live_suffix: String,
    buffered_bytes: usize,
    total_bytes: usize,
    closing: bool,
    errored: bool,
    last_error: String,
}

impl SessionState {
    fn apply_delta(&mut self, delta: &str) -> String {
        self.live_suffix.push_str(delta);
        format!("{}{}", self.final_transcript, self.live_suffix)
    }

    fn apply_completed(&mut self, transcript: &str) -> String {
        self.final_transcript = join_text(&self.final_transcript, transcript);
        self.live_suffix.clear();
        self.final_transcript.clone()
    }

    fn record_append(&mut self, len: usize) {
        self.buffered_bytes += len;
        self.total_bytes += len;
    }

    /// True when enough audio is buffered for a commit; resets the counter.
    fn take_commit(&mut self) -> bool {
        if self.buffered_bytes < MIN_BUFFER_BYTES {
            return false;
        }
        self.buffered_bytes = 0;
        true
    }

    /// Records the message and reports whether it is the first error.
    fn first_error(&mut self, message: &str) -> bool {
        self.last_error = message.to_string();
        if self.errored {
            return false;
        }
        self.errored = true;
        true
    }
}

fn join_text(base: &str, next: &str) -> String {
    if base.is_empty() {
        return next.trim().to_string();
    }
    if next.is_empty() {
        return base.trim().to_string();
    }
    format!("{} {}", base.trim(), next.trim())
}

/// One-shot settlement latch for the startup promise. Whoever takes the
/// sender first wins; everyone else routes to the ongoing-error callback.
type ReadyLatch = Arc<Mutex<Option<oneshot::Sender<Result<(), String>>>>>;

fn settle(latch: &ReadyLatch, result: Result<(), String>) -> bool {
    if let Some(sender) = latch.lock().unwrap().take() {
        let _ = sender.send(result);
        return true;
    }
    false
}

pub struct RealtimeSttClient {
    events: Arc<dyn SttEvents>,
    state: Arc<Mutex<SessionState>>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    commit_timer: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl RealtimeSttClient {
    pub fn new(events: Arc<dyn SttEvents>) -> Self {
        Self {
            events,
            state: Arc::new(Mutex::new(SessionState::default())),
            outbound: None,
            commit_timer: None,
            reader_task: None,
            writer_task: None,
        }
    }

    /// Open the streaming session. Resolves once the session is ready
    /// (explicit acks are not guaranteed, so a short grace window without
    /// errors also counts) and starts the periodic commit timer.
    pub async fn start(&mut self, settings: &AppSettings) -> Result<()> {
        let api_key = settings.require_api_key()?.to_string();
        *self.state.lock().unwrap() = SessionState::default();

        let mut request = REALTIME_WS_URL.into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key))?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| anyhow!("Realtime connection failed: {}", e))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let was_close = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() {
                    break;
                }
                if was_close {
                    break;
                }
            }
        });

        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let latch: ReadyLatch = Arc::new(Mutex::new(Some(ready_tx)));

        let reader = {
            let state = self.state.clone();
            let events = self.events.clone();
            let latch = latch.clone();
            tokio::spawn(async move {
                let mut notified = false;
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            handle_inbound(&state, events.as_ref(), &latch, &text);
                        }
                        Ok(Message::Close(frame)) => {
                            let detail = frame
                                .map(|f| {
                                    format!(
                                        "Realtime connection closed (code {}) ({}).",
                                        f.code, f.reason
                                    )
                                })
                                .unwrap_or_else(|| "Realtime connection closed.".to_string());
                            handle_closed(&state, events.as_ref(), &latch, &detail);
                            notified = true;
                            break;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            if settle(&latch, Err(err.to_string())) {
                                debug!("Realtime startup failed: {}", err);
                            }
                            report_error(&state, events.as_ref(), "Realtime connection error.");
                            notified = true;
                            break;
                        }
                    }
                }
                if !notified {
                    handle_closed(
                        &state,
                        events.as_ref(),
                        &latch,
                        "Realtime connection closed.",
                    );
                }
            })
        };

        if outbound_tx
            .send(Message::Text(session_update_message(settings)))
            .is_err()
        {
            reader.abort();
            return Err(anyhow!("Realtime connection closed before configuration."));
        }

        {
            let latch = latch.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(STARTUP_GRACE_MS)).await;
                if settle(&latch, Ok(())) {
                    debug!("Realtime session ready (grace window elapsed without errors)");
                }
            });
        }

        self.outbound = Some(outbound_tx.clone());
        self.reader_task = Some(reader);
        self.writer_task = Some(writer);

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                self.teardown().await;
                return Err(anyhow!(message));
            }
            Err(_) => {
                self.teardown().await;
                return Err(anyhow!("Realtime connection closed before ready."));
            }
        }

        let timer = {
            let state = self.state.clone();
            let tx = outbound_tx;
            tokio::spawn(async move {
                let period = Duration::from_millis(COMMIT_INTERVAL_MS);
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let due = {
                        let mut state = state.lock().unwrap();
                        if state.closing {
                            break;
                        }
                        state.take_commit()
                    };
                    if due {
                        if tx.send(Message::Text(commit_message())).is_err() {
                            break;
                        }
                        let _ = tx.send(Message::Text(clear_message()));
                    }
                }
            })
        };
        self.commit_timer = Some(timer);

        Ok(())
    }

    /// Forward one PCM frame. No-op once the connection is down or closing;
    /// never blocks the frame producer.
    pub fn append_audio(&self, frame: &[u8]) {
        if frame.is_empty() {
            return;
        }
        let Some(outbound) = &self.outbound else {
            return;
        };
        if self.state.lock().unwrap().closing {
            return;
        }
        let audio = STANDARD.encode(frame);
        if outbound.send(Message::Text(append_message(&audio))).is_ok() {
            self.state.lock().unwrap().record_append(frame.len());
        }
    }

    /// Finish the session and return the committed transcript. The timer is
    /// torn down before any connection state is touched so a late tick
    /// cannot send after close.
    pub async fn stop(&mut self) -> Result<String> {
        if let Some(timer) = self.commit_timer.take() {
            timer.abort();
        }

        let total_bytes = self.state.lock().unwrap().total_bytes;
        if total_bytes < MIN_RECORDING_BYTES {
            self.state.lock().unwrap().closing = true;
            if let Some(outbound) = self.outbound.take() {
                let _ = outbound.send(Message::Text(clear_message()));
                let _ = outbound.send(Message::Close(None));
            }
            self.drain_tasks().await;
            return Err(anyhow!(TOO_SHORT_MESSAGE));
        }

        if let Some(outbound) = &self.outbound {
            let flush = self.state.lock().unwrap().take_commit();
            if flush {
                let _ = outbound.send(Message::Text(commit_message()));
            }
            let _ = outbound.send(Message::Text(clear_message()));
        }

        // Trailing completion events arrive for up to the drain interval.
        tokio::time::sleep(Duration::from_millis(CLOSE_WAIT_MS)).await;

        self.state.lock().unwrap().closing = true;
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        self.drain_tasks().await;

        let transcript = self.state.lock().unwrap().final_transcript.trim().to_string();
        debug!("Realtime session stopped after {} bytes", total_bytes);
        Ok(transcript)
    }

    async fn teardown(&mut self) {
        self.state.lock().unwrap().closing = true;
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        self.drain_tasks().await;
    }

    async fn drain_tasks(&mut self) {
        for task in [self.writer_task.take(), self.reader_task.take()]
            .into_iter()
            .flatten()
        {
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_millis(TASK_DRAIN_MS), task)
                .await
                .is_err()
            {
                abort.abort();
            }
        }
    }
}

fn handle_inbound(
    state: &Arc<Mutex<SessionState>>,
    events: &dyn SttEvents,
    latch: &ReadyLatch,
    text: &str,
) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(_) => return,
    };

    match event.kind.as_str() {
        DELTA_EVENT => {
            let delta = event.delta.unwrap_or_default();
            if delta.is_empty() {
                return;
            }
            let live = state.lock().unwrap().apply_delta(&delta);
            events.on_delta(&delta);
            events.on_live(&live);
        }
        COMPLETED_EVENT => {
            let transcript = event.transcript.unwrap_or_default();
            if transcript.is_empty() {
                return;
            }
            let live = state.lock().unwrap().apply_completed(&transcript);
            events.on_live(&live);
        }
        ERROR_EVENT => {
            let message = event
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Realtime transcription error.".to_string());
            if settle(latch, Err(message.clone())) {
                return;
            }
            report_error(state, events, &message);
        }
        _ => {}
    }
}

fn handle_closed(
    state: &Arc<Mutex<SessionState>>,
    events: &dyn SttEvents,
    latch: &ReadyLatch,
    detail: &str,
) {
    let message = {
        let state = state.lock().unwrap();
        if state.closing {
            return;
        }
        if state.last_error.is_empty() {
            detail.to_string()
        } else {
            state.last_error.clone()
        }
    };
    if settle(latch, Err(message.clone())) {
        return;
    }
    report_error(state, events, &message);
}

/// First error wins; later ones are logged and suppressed.
fn report_error(state: &Arc<Mutex<SessionState>>, events: &dyn SttEvents, message: &str) {
    let first = state.lock().unwrap().first_error(message);
    if first {
        events.on_error(message);
    } else {
        warn!("Suppressed follow-up realtime error: {}", message);
    }
}

fn session_update_message(settings: &AppSettings) -> String {
    let model = resolve_realtime_model(&settings.stt_model);
    let language = settings.language_hint();
    let prompt = transcription_prompt(language);

    let mut transcription = serde_json::Map::new();
    transcription.insert("model".to_string(), json!(model));
    if let Some(language) = language {
        transcription.insert("language".to_string(), json!(language));
    }
    if !prompt.is_empty() {
        transcription.insert("prompt".to_string(), json!(prompt));
    }

    json!({
        "type": "transcription_session.update",
        "session": {
            "input_audio_format": "pcm16",
            "input_audio_transcription": transcription,
            "turn_detection": null,
            "input_audio_noise_reduction": null
        }
    })
    .to_string()
}

fn append_message(audio_base64: &str) -> String {
    json!({ "type": "input_audio_buffer.append", "audio": audio_base64 }).to_string()
}

fn commit_message() -> String {
    json!({ "type": "input_audio_buffer.commit" }).to_string()
}

fn clear_message() -> String {
    json!({ "type": "input_audio_buffer.clear" }).to_string()
}

/// Map raw transport/service errors onto user-facing phrasing.
pub fn friendly_realtime_error(message: &str) -> String {
    let normalized = message.to_lowercase();
    if normalized.contains("not supported in realtime")
        || normalized.contains("not permitted")
        || normalized.contains("access")
    {
        return "Realtime access is not enabled for this key/model.".to_string();
    }
    if normalized.contains("dns") || normalized.contains("failed to lookup") {
        return "Network/DNS error reaching api.openai.com.".to_string();
    }
    if normalized.contains("timeout") || normalized.contains("timed out") {
        return "Network timeout reaching api.openai.com.".to_string();
    }
    message.to_string()
}

/// Probe whether the configured key/model can open a realtime session: send
/// a short silent buffer and report whichever arrives first of an error or a
/// transcription-related event; no error within the window counts as access.
pub async fn check_realtime_access(settings: &AppSettings) -> AccessCheck {
    let api_key = match settings.require_api_key() {
        Ok(key) => key.to_string(),
        Err(err) => {
            return AccessCheck {
                ok: false,
                message: err.to_string(),
            }
        }
    };

    if !is_realtime_model(&settings.stt_model) {
        return AccessCheck {
            ok: false,
            message: "Selected model does not support Realtime. \
                      Choose gpt-4o-mini-transcribe or gpt-4o-transcribe."
                .to_string(),
        };
    }

    match probe_realtime(settings, &api_key).await {
        Ok(check) => check,
        Err(err) => AccessCheck {
            ok: false,
            message: friendly_realtime_error(&err.to_string()),
        },
    }
}

async fn probe_realtime(settings: &AppSettings, api_key: &str) -> Result<AccessCheck> {
    let mut request = REALTIME_WS_URL.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", api_key))?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (socket, _response) = connect_async(request).await?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(session_update_message(settings)))
        .await?;

    tokio::time::sleep(Duration::from_millis(PROBE_LEAD_MS)).await;
    let silence = vec![0u8; MIN_BUFFER_BYTES];
    sink.send(Message::Text(append_message(&STANDARD.encode(&silence))))
        .await?;
    sink.send(Message::Text(commit_message())).await?;
    sink.send(Message::Text(clear_message())).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(PROBE_TIMEOUT_MS);
    loop {
        let message = match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(AccessCheck {
                    ok: true,
                    message: "Realtime available (no errors after commit).".to_string(),
                });
            }
            Ok(None) => {
                return Ok(AccessCheck {
                    ok: false,
                    message: friendly_realtime_error("Realtime connection closed."),
                });
            }
            Ok(Some(message)) => message?,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                let detail = frame
                    .map(|f| format!("Realtime closed (code {}) ({}).", f.code, f.reason))
                    .unwrap_or_else(|| "Realtime closed.".to_string());
                return Ok(AccessCheck {
                    ok: false,
                    message: friendly_realtime_error(&detail),
                });
            }
            _ => continue,
        };

        let Ok(event) = serde_json::from_str::<InboundEvent>(&text) else {
            continue;
        };
        match event.kind.as_str() {
            ERROR_EVENT => {
                let raw = event
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Realtime error.".to_string());
                let _ = sink.send(Message::Close(None)).await;
                return Ok(AccessCheck {
                    ok: false,
                    message: friendly_realtime_error(&raw),
                });
            }
            DELTA_EVENT | COMPLETED_EVENT | COMMITTED_EVENT => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(AccessCheck {
                    ok: true,
                    message: "Realtime available.".to_string(),
                });
            }
            _ => {}
        }
    }
}
