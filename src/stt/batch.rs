//! Batch transcription transport.
//!
//! Accumulates PCM frames in memory and performs one transcription request
//! on stop. No connection is held while recording.

use super::models::{resolve_batch_model, transcription_prompt};
use super::{
    SttEvents, BITS_PER_SAMPLE, CHANNELS, MIN_RECORDING_BYTES, SAMPLE_RATE, TOO_SHORT_MESSAGE,
};
use crate::settings::AppSettings;
use anyhow::{anyhow, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;
use reqwest::multipart::{Form, Part};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(serde::Deserialize, Debug)]
struct TranscriptionResponse {
    text: Option<String>,
}

pub struct BatchSttClient {
    events: Arc<dyn SttEvents>,
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl BatchSttClient {
    pub fn new(events: Arc<dyn SttEvents>) -> Self {
        Self {
            events,
            chunks: Vec::new(),
            total_bytes: 0,
        }
    }

    pub fn start(&mut self, settings: &AppSettings) -> Result<()> {
        settings.require_api_key()?;
        self.chunks.clear();
        self.total_bytes = 0;
        Ok(())
    }

    pub fn append_audio(&mut self, frame: &[u8]) {
        if frame.is_empty() {
            return;
        }
        self.chunks.push(frame.to_vec());
        self.total_bytes += frame.len();
    }

    pub async fn stop(&mut self, settings: &AppSettings) -> Result<String> {
        if self.chunks.is_empty() {
            return Ok(String::new());
        }

        if self.total_bytes < MIN_RECORDING_BYTES {
            self.chunks.clear();
            self.total_bytes = 0;
            return Err(anyhow!(TOO_SHORT_MESSAGE));
        }

        let mut pcm = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks.drain(..) {
            pcm.extend_from_slice(&chunk);
        }
        self.total_bytes = 0;

        let wav = pcm_to_wav(&pcm)?;
        debug!("Encoded {} PCM bytes into {} WAV bytes", pcm.len(), wav.len());

        match transcribe_wav(settings, wav).await {
            Ok(transcript) => Ok(transcript.trim().to_string()),
            Err(err) => {
                self.events.on_error(&err.to_string());
                Err(err)
            }
        }
    }
}

/// Wrap raw 16-bit mono PCM in a WAV container.
fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

async fn transcribe_wav(settings: &AppSettings, wav: Vec<u8>) -> Result<String> {
    let api_key = settings.require_api_key()?;

    let audio_part = Part::bytes(wav)
        .file_name("audio.wav")
        .mime_str("audio/wav")?;

    let mut form = Form::new()
        .part("file", audio_part)
        .text("model", resolve_batch_model(&settings.stt_model).to_string())
        .text("response_format", "json");

    let language = settings.language_hint();
    if let Some(language) = language {
        form = form.text("language", language.to_string());
    }
    let prompt = transcription_prompt(language);
    if !prompt.is_empty() {
        form = form.text("prompt", prompt);
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?;

    debug!("Sending batch transcription request to {}", TRANSCRIPTIONS_URL);
    let response = client
        .post(TRANSCRIPTIONS_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "OpenAI transcription error {}: {}",
            status.as_u16(),
            error_text
        ));
    }

    let parsed: TranscriptionResponse = response.json().await?;
    Ok(parsed.text.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::NullEvents;

    fn client() -> BatchSttClient {
        BatchSttClient::new(Arc::new(NullEvents))
    }

    fn settings_with_key() -> AppSettings {
        AppSettings {
            api_key: "sk-test".to_string(),
            ..AppSettings::default()
        }
    }

    #[test]
    fn start_requires_api_key() {
        let mut client = client();
        assert!(client.start(&AppSettings::default()).is_err());
        assert!(client.start(&settings_with_key()).is_ok());
    }

    #[tokio::test]
    async fn stop_without_frames_returns_empty_transcript() {
        let mut client = client();
        client.start(&settings_with_key()).unwrap();
        let transcript = client.stop(&settings_with_key()).await.unwrap();
        assert_eq!(transcript, "");
    }

    #[tokio::test]
    async fn short_recording_fails_and_resets() {
        let mut client = client();
        client.start(&settings_with_key()).unwrap();
        client.append_audio(&[0u8; 1024]);

        let err = client.stop(&settings_with_key()).await.unwrap_err();
        assert!(err.to_string().contains("too short"));

        // Accumulator was reset; the next stop sees an empty session.
        let transcript = client.stop(&settings_with_key()).await.unwrap();
        assert_eq!(transcript, "");
    }

    #[test]
    fn empty_frames_are_ignored() {
        let mut client = client();
        client.start(&settings_with_key()).unwrap();
        client.append_audio(&[]);
        assert_eq!(client.total_bytes, 0);
        assert!(client.chunks.is_empty());
    }

    #[test]
    fn wav_header_carries_format_and_length() {
        let pcm = vec![0u8; 9_600]; // 100 ms at 24 kHz mono 16-bit
        let wav = pcm_to_wav(&pcm).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        // fmt chunk: PCM, mono, 24 kHz.
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(
            u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]),
            24_000
        );

        // data chunk holds every PCM byte.
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size as usize, pcm.len());
        assert_eq!(wav.len(), 44 + pcm.len());
    }
}
