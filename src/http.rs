//! Outbound HTTP seam.
//!
//! Every call to YouTube or the chat-completion API goes through
//! [`HttpClient`] so resolution logic can be driven by canned responses in
//! tests. Non-2xx answers are returned as a [`Response`] rather than an error:
//! callers inspect the status (and, for quota errors, the body) themselves.

use std::{collections::VecDeque, io::Read, time::Duration};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

const USER_AGENT: &str = concat!("phewtube/", env!("CARGO_PKG_VERSION"));
const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("reading response body: {0}")]
    Body(#[from] std::io::Error),
    #[error("encoding request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Request description. Scripted POSTs are recorded in the same shape.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, request: &Request) -> Result<Response, FetchError>;

    /// POSTs `body` as JSON, optionally with a bearer token.
    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Response, FetchError>;

    /// POSTs a `multipart/form-data` body, optionally with a bearer token.
    fn post_form(
        &self,
        url: &str,
        bearer: Option<&str>,
        form: MultipartForm,
    ) -> Result<Response, FetchError>;
}

/// Blocking client backed by a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn finish(result: Result<ureq::Response, ureq::Error>) -> Result<Response, FetchError> {
        match result {
            Ok(response) => read_response(response),
            Err(ureq::Error::Status(_, response)) => read_response(response),
            Err(ureq::Error::Transport(transport)) => {
                let message = transport.to_string();
                let lowered = message.to_ascii_lowercase();
                if lowered.contains("timed out") || lowered.contains("timeout") {
                    Err(FetchError::Timeout(message))
                } else {
                    Err(FetchError::Transport(message))
                }
            }
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

fn read_response(response: ureq::Response) -> Result<Response, FetchError> {
    let status = response.status();
    let mut body = String::new();
    response
        .into_reader()
        .take(MAX_BODY_BYTES)
        .read_to_string(&mut body)?;
    Ok(Response { status, body })
}

impl HttpClient for UreqClient {
    fn get(&self, request: &Request) -> Result<Response, FetchError> {
        let mut call = self.agent.get(&request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        if let Some(timeout) = request.timeout {
            call = call.timeout(timeout);
        }
        Self::finish(call.call())
    }

    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Response, FetchError> {
        let mut call = self.agent.post(url);
        if let Some(token) = bearer {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }
        Self::finish(call.send_json(body))
    }

    fn post_form(
        &self,
        url: &str,
        bearer: Option<&str>,
        form: MultipartForm,
    ) -> Result<Response, FetchError> {
        let (content_type, body) = form.finish();
        let mut call = self.agent.post(url).set("Content-Type", &content_type);
        if let Some(token) = bearer {
            call = call.set("Authorization", &format!("Bearer {token}"));
        }
        Self::finish(call.send_bytes(&body))
    }
}

/// In-memory `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("phewtube-{}", Uuid::new_v4().simple()),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(name, None, None);
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.open_part(name, Some(file_name), Some(content_type));
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Closes the body and returns it with its `Content-Type` header value.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }

    fn open_part(&mut self, name: &str, file_name: Option<&str>, content_type: Option<&str>) {
        let mut head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(name)
        );
        if let Some(file_name) = file_name {
            head.push_str(&format!("; filename=\"{}\"", escape_quoted(file_name)));
        }
        head.push_str("\r\n");
        if let Some(content_type) = content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str("\r\n");
        self.body.extend_from_slice(head.as_bytes());
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace(['\r', '\n'], " ")
        .replace('"', "%22")
}

/// Canned-response client for offline runs and tests.
///
/// Routes are matched by URL prefix in registration order; a route registered
/// with several responses hands them out one by one and then repeats the last
/// one. Every request is recorded with its headers and timeout; POST bodies
/// are kept separately.
#[derive(Default)]
pub struct ScriptedClient {
    routes: Mutex<Vec<(String, VecDeque<Result<Response, String>>)>>,
    requests: Mutex<Vec<Request>>,
    bodies: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url_prefix: &str, status: u16, body: &str) -> Self {
        self.push(url_prefix, Ok(Response::new(status, body)));
        self
    }

    pub fn fail(self, url_prefix: &str, message: &str) -> Self {
        self.push(url_prefix, Err(message.to_string()));
        self
    }

    fn push(&self, url_prefix: &str, outcome: Result<Response, String>) {
        let mut routes = self.routes.lock();
        if let Some((_, queue)) = routes.iter_mut().find(|(prefix, _)| prefix == url_prefix) {
            queue.push_back(outcome);
        } else {
            routes.push((url_prefix.to_string(), VecDeque::from([outcome])));
        }
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    pub fn requests_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url.contains(needle))
            .count()
    }

    /// Full requests (headers, timeout) in order.
    pub fn recorded(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Bodies of POST requests in order.
    pub fn posted_bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.lock().clone()
    }

    fn answer(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        let mut routes = self.routes.lock();
        let Some((_, queue)) = routes
            .iter_mut()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
        else {
            return Ok(Response::new(404, ""));
        };
        let outcome = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) if message.contains("timed out") => {
                Err(FetchError::Timeout(message))
            }
            Some(Err(message)) => Err(FetchError::Transport(message)),
            None => Ok(Response::new(404, "")),
        }
    }

    fn answer_post(
        &self,
        url: &str,
        bearer: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Response, FetchError> {
        let mut request = Request::get(url).header("Content-Type", content_type);
        if let Some(token) = bearer {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        self.bodies.lock().push(body);
        self.answer(request)
    }
}

impl HttpClient for ScriptedClient {
    fn get(&self, request: &Request) -> Result<Response, FetchError> {
        self.answer(request.clone())
    }

    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Response, FetchError> {
        let encoded = serde_json::to_vec(body)?;
        self.answer_post(url, bearer, "application/json", encoded)
    }

    fn post_form(
        &self,
        url: &str,
        bearer: Option<&str>,
        form: MultipartForm,
    ) -> Result<Response, FetchError> {
        let (content_type, body) = form.finish();
        self.answer_post(url, bearer, &content_type, body)
    }
}
