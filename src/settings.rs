use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionTransport {
    Batch,
    Realtime,
}

impl Default for TranscriptionTransport {
    fn default() -> Self {
        TranscriptionTransport::Batch
    }
}

pub const DEFAULT_HOTKEY: &str = "CommandOrControl+Shift+Space";

/// Runtime configuration read by the capture and enrichment pipelines.
///
/// Persistence is the host's concern; this is the plain data it hands us.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_stt_language")]
    pub stt_language: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default)]
    pub stt_transport: TranscriptionTransport,
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_secret: String,
}

fn default_stt_language() -> String {
    "auto".to_string()
}

fn default_stt_model() -> String {
    "gpt-4o-transcribe".to_string()
}

fn default_hotkey() -> String {
    DEFAULT_HOTKEY.to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            api_key: String::new(),
            stt_language: default_stt_language(),
            stt_model: default_stt_model(),
            stt_transport: TranscriptionTransport::default(),
            hotkey: default_hotkey(),
            webhook_url: String::new(),
            webhook_secret: String::new(),
        }
    }
}

impl AppSettings {
    /// Every network operation requires a key; fail before opening anything.
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(anyhow!("OpenAI API key missing. Add it in Settings."));
        }
        Ok(key)
    }

    /// Language to pass upstream, or `None` for auto-detection.
    pub fn language_hint(&self) -> Option<&str> {
        let language = self.stt_language.trim();
        if language.is_empty() || language == "auto" {
            return None;
        }
        Some(language)
    }

    pub fn set_hotkey(&mut self, hotkey: &str) -> Result<()> {
        let trimmed = hotkey.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("Hotkey cannot be empty."));
        }
        self.hotkey = normalize_hotkey(trimmed);
        Ok(())
    }
}

/// Canonicalize the space token so stored bindings compare equal.
pub fn normalize_hotkey(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for part in value.split('+') {
        if !out.is_empty() {
            out.push('+');
        }
        if part.eq_ignore_ascii_case("space") {
            out.push_str("Space");
        } else {
            out.push_str(part);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_precondition_error() {
        let settings = AppSettings::default();
        let err = settings.require_api_key().unwrap_err();
        assert!(err.to_string().contains("API key missing"));
    }

    #[test]
    fn whitespace_api_key_counts_as_missing() {
        let settings = AppSettings {
            api_key: "   ".to_string(),
            ..AppSettings::default()
        };
        assert!(settings.require_api_key().is_err());
    }

    #[test]
    fn auto_language_yields_no_hint() {
        let settings = AppSettings::default();
        assert_eq!(settings.language_hint(), None);

        let settings = AppSettings {
            stt_language: "de".to_string(),
            ..AppSettings::default()
        };
        assert_eq!(settings.language_hint(), Some("de"));
    }

    #[test]
    fn empty_hotkey_is_rejected() {
        let mut settings = AppSettings::default();
        assert!(settings.set_hotkey("  ").is_err());
        assert_eq!(settings.hotkey, DEFAULT_HOTKEY);
    }

    #[test]
    fn hotkey_space_token_is_canonicalized() {
        assert_eq!(normalize_hotkey("Ctrl+SPACE"), "Ctrl+Space");
        assert_eq!(normalize_hotkey("Alt+F4"), "Alt+F4");
    }

    #[test]
    fn transport_serializes_lowercase() {
        let json = serde_json::to_string(&TranscriptionTransport::Realtime).unwrap();
        assert_eq!(json, "\"realtime\"");
    }
}
