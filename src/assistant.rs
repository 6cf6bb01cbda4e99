//! Question answering about a catalog video through a hosted chat-completion
//! API.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{FetchError, HttpClient};

pub const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const MODEL: &str = "gpt-4o-mini";
pub const MAX_TOKENS: u32 = 300;
pub const TEMPERATURE: f64 = 0.7;
pub const FALLBACK_ANSWER: &str = "I couldn't generate a response.";
const DESCRIPTION_CONTEXT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("OpenAI API key not configured")]
    MissingKey,
    #[error("Failed to get AI response")]
    Upstream { status: u16 },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Video details folded into the system prompt.
#[derive(Debug, Clone, Default)]
pub struct VideoContext<'a> {
    pub title: &'a str,
    pub channel: &'a str,
    pub description: Option<&'a str>,
}

pub fn build_video_context(video: &VideoContext<'_>) -> String {
    let mut context = format!("Video Title: {}. Channel: {}. ", video.title, video.channel);
    if let Some(description) = video.description.filter(|text| !text.trim().is_empty()) {
        let clipped: String = description.chars().take(DESCRIPTION_CONTEXT_CHARS).collect();
        context.push_str("Description: ");
        context.push_str(&clipped);
    }
    context.trim_end().to_string()
}

fn system_prompt(context: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a helpful AI assistant that answers questions about educational videos. \
         You provide clear, concise, and accurate answers.",
    );
    if let Some(context) = context.filter(|text| !text.is_empty()) {
        prompt.push_str(" Context about the current video: ");
        prompt.push_str(context);
    }
    prompt.push_str(" Keep your responses brief and conversational, suitable for voice output.");
    prompt
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

pub struct Assistant<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    endpoint: &'a str,
    api_key: Option<&'a str>,
}

impl<'a, C: HttpClient + ?Sized> Assistant<'a, C> {
    pub fn new(client: &'a C, api_key: Option<&'a str>) -> Self {
        Self {
            client,
            endpoint: CHAT_COMPLETIONS_URL,
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Sends one question. A response without any usable content yields
    /// [`FALLBACK_ANSWER`].
    pub fn ask(&self, question: &str, context: Option<&str>) -> Result<String, AssistantError> {
        let key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(AssistantError::MissingKey)?;
        let body = json!({
            "model": MODEL,
            "messages": [
                { "role": "system", "content": system_prompt(context) },
                { "role": "user", "content": question },
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        debug!(endpoint = self.endpoint, has_context = context.is_some(), "asking assistant");
        let response = self.client.post_json(self.endpoint, Some(key), &body)?;
        if !response.is_success() {
            warn!(status = response.status, "chat completion request failed");
            return Err(AssistantError::Upstream {
                status: response.status,
            });
        }
        let answer = response
            .json::<Completion>()
            .ok()
            .and_then(|completion| completion.choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ScriptedClient;

    #[test]
    fn context_clips_description() {
        let long = "x".repeat(800);
        let context = build_video_context(&VideoContext {
            title: "Lecture 1",
            channel: "Prof",
            description: Some(&long),
        });
        assert!(context.starts_with("Video Title: Lecture 1. Channel: Prof. Description: "));
        assert_eq!(context.matches('x').count(), DESCRIPTION_CONTEXT_CHARS);

        let bare = build_video_context(&VideoContext {
            title: "T",
            channel: "C",
            description: None,
        });
        assert_eq!(bare, "Video Title: T. Channel: C.");
    }

    #[test]
    fn system_prompt_mentions_context_only_when_present() {
        assert!(system_prompt(Some("Video Title: T")).contains("Context about the current video: Video Title: T"));
        assert!(!system_prompt(None).contains("Context about"));
    }

    #[test]
    fn missing_key_is_reported_without_a_request() {
        let client = ScriptedClient::new();
        let err = Assistant::new(&client, None).ask("why?", None).unwrap_err();
        assert!(matches!(err, AssistantError::MissingKey));
        assert_eq!(err.to_string(), "OpenAI API key not configured");
        assert!(client.requests().is_empty());
    }

    #[test]
    fn returns_first_choice_content() {
        let client = ScriptedClient::new().respond(
            CHAT_COMPLETIONS_URL,
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"Because."}}]}"#,
        );
        let answer = Assistant::new(&client, Some("sk-test")).ask("why?", None).unwrap();
        assert_eq!(answer, "Because.");
    }

    #[test]
    fn empty_completion_falls_back() {
        let client = ScriptedClient::new().respond(CHAT_COMPLETIONS_URL, 200, r#"{"choices":[]}"#);
        let answer = Assistant::new(&client, Some("sk-test")).ask("why?", None).unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
    }

    #[test]
    fn upstream_errors_keep_status() {
        let client = ScriptedClient::new().respond(CHAT_COMPLETIONS_URL, 429, "slow down");
        let err = Assistant::new(&client, Some("sk-test")).ask("why?", None).unwrap_err();
        assert!(matches!(err, AssistantError::Upstream { status: 429 }));
    }
}
