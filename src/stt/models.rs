//! Transcription model catalog.

const BATCH_MODELS: [&str; 3] = ["gpt-4o-mini-transcribe", "gpt-4o-transcribe", "whisper-1"];
const REALTIME_MODELS: [&str; 3] = [
    "gpt-4o-mini-transcribe",
    "gpt-4o-transcribe",
    "gpt-4o-transcribe-latest",
];
const DEFAULT_MODEL: &str = "gpt-4o-mini-transcribe";

pub fn resolve_batch_model(model: &str) -> &str {
    if BATCH_MODELS.contains(&model) {
        model
    } else {
        DEFAULT_MODEL
    }
}

pub fn resolve_realtime_model(model: &str) -> &str {
    if REALTIME_MODELS.contains(&model) {
        model
    } else {
        DEFAULT_MODEL
    }
}

pub fn is_realtime_model(model: &str) -> bool {
    REALTIME_MODELS.contains(&model)
}

/// Vocabulary prompt sent alongside transcription requests. Currently none;
/// this is the single place a custom-word prompt would be assembled.
pub fn transcription_prompt(_language: Option<&str>) -> String {
    String::new()
}
