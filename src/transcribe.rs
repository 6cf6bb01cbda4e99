//! Speech-to-text for spoken questions, through the hosted transcription API.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{FetchError, HttpClient, MultipartForm};

pub const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const TRANSCRIPTION_LANGUAGE: &str = "en";
pub const DEFAULT_AUDIO_NAME: &str = "recording.webm";
pub const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("OpenAI API key is not configured")]
    MissingKey,
    #[error("transcription API returned HTTP {status}")]
    Upstream { status: u16 },
    #[error("malformed transcription response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// One uploaded recording. Missing name or type fall back to a WebM clip.
#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    pub fn file_name(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_AUDIO_NAME)
    }

    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|kind| !kind.trim().is_empty())
            .unwrap_or(DEFAULT_AUDIO_TYPE)
    }
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

pub struct Transcriber<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    endpoint: &'a str,
    api_key: Option<&'a str>,
}

impl<'a, C: HttpClient + ?Sized> Transcriber<'a, C> {
    pub fn new(client: &'a C, api_key: Option<&'a str>) -> Self {
        Self {
            client,
            endpoint: TRANSCRIPTIONS_URL,
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn transcribe(&self, clip: &AudioClip) -> Result<String, TranscribeError> {
        let key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(TranscribeError::MissingKey)?;
        let form = MultipartForm::new()
            .file("file", clip.file_name(), clip.content_type(), &clip.bytes)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", TRANSCRIPTION_LANGUAGE);
        debug!(
            endpoint = self.endpoint,
            bytes = clip.bytes.len(),
            file = clip.file_name(),
            "transcribing audio"
        );
        let response = self.client.post_form(self.endpoint, Some(key), form)?;
        if !response.is_success() {
            warn!(status = response.status, "transcription request failed");
            return Err(TranscribeError::Upstream {
                status: response.status,
            });
        }
        Ok(response.json::<Transcription>()?.text)
    }
}
