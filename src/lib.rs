pub mod change_log;
pub mod coverage;
pub mod enrich;
pub mod history;
pub mod modes;
pub mod schema;
pub mod settings;
pub mod stt;
pub mod webhook;

pub use change_log::{build_change_log, ChangeLogEntry};
pub use coverage::{compute_coverage, CoverageInfo};
pub use enrich::{enrich_transcript, update_with_follow_up, Enriched, RunOutput, Updated};
pub use modes::{list_modes, resolve_mode, ModeDefinition};
pub use settings::{AppSettings, TranscriptionTransport};
pub use stt::realtime::{check_realtime_access, AccessCheck};
pub use stt::selector::{SttClient, StartOutcome};
pub use stt::{SttEvents, TransportKind};
pub use webhook::{send_webhook, WebhookOutcome, WebhookPayload};
