//! Single-flight chat dispatch.
//!
//! A request is sent either as a token stream or as one blocking completion,
//! depending on how the model classifies under [`ModelRules`]. Both modes run
//! under a per-call [`CancellationToken`] held in a shared [`RequestState`],
//! which is how a Ctrl-C listener reaches the active call.
//!
//! Cancellation is asymmetric: a cancelled stream is a successful, partial
//! reply, while a cancelled blocking call is [`DispatchError::Interrupted`].

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use memchr::memchr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatCompletion, ChatRequest, ChatResponse};
use crate::core::message::Message;
use crate::core::model_rules::{ModelRules, ResponseMode};
use crate::core::providers::ProviderConnection;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, DispatchError>>;

#[derive(Debug)]
pub enum DispatchError {
    /// A blocking request was cancelled before it completed.
    Interrupted,
    /// A blocking response carried no choices.
    NoContent,
    AlreadyInFlight,
    Http { status: u16, body: String },
    /// Error payload delivered inside an otherwise successful stream.
    Api(String),
    Transport(Box<dyn Error + Send + Sync>),
    Decode(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Interrupted => write!(f, "Request interrupted"),
            DispatchError::NoContent => write!(f, "The provider returned no content"),
            DispatchError::AlreadyInFlight => write!(f, "A request is already in flight"),
            DispatchError::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            DispatchError::Api(payload) => write!(f, "API error: {payload}"),
            DispatchError::Transport(err) => write!(f, "{err}"),
            DispatchError::Decode(detail) => write!(f, "Could not decode response: {detail}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DispatchError::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(Box::new(err))
    }
}

/// Shared handle to the in-flight request, if any.
///
/// Only the dispatcher marks a request as started or finished; everyone else
/// may observe it or ask for it to be interrupted.
#[derive(Clone, Debug, Default)]
pub struct RequestState {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().is_some()
    }

    /// Cancel the active request. Returns false when nothing was in flight.
    pub fn interrupt(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn begin(&self) -> Result<InFlight, DispatchError> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(DispatchError::AlreadyInFlight);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(InFlight {
            state: self.clone(),
            token,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight marker on every exit path.
struct InFlight {
    state: RequestState,
    token: CancellationToken,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        *self.state.lock() = None;
    }
}

/// Outbound half of a provider connection.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, DispatchError>;
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, DispatchError>;
}

/// `POST {base_url}/chat/completions` over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    connection: ProviderConnection,
}

impl HttpTransport {
    pub fn with_client(client: reqwest::Client, connection: ProviderConnection) -> Self {
        Self { client, connection }
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response, DispatchError> {
        let url = construct_api_url(&self.connection.base_url, "chat/completions");
        debug!(
            provider = %self.connection.provider_id,
            model = %request.model,
            stream = request.stream,
            "sending chat request"
        );
        let http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        let response = add_auth_headers(http_request, &self.connection)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DispatchError::Http { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, DispatchError> {
        let response = self.post(request).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(DispatchError::from))
            .boxed())
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, DispatchError> {
        let body = self.post(request).await?.text().await?;
        serde_json::from_str(&body).map_err(|err| DispatchError::Decode(format!("{err}: {body}")))
    }
}

/// Where reply text goes while a request runs.
pub trait ReplySink: Send {
    /// Text to show now. Called once per delta when streaming and once with
    /// the whole reply when blocking.
    fn delta(&mut self, text: &str);
    /// A blocking request started; nothing will arrive until it completes.
    fn waiting(&mut self) {}
    /// The request ended, whatever the outcome.
    fn finished(&mut self) {}
}

/// Collects deltas into a string. Useful for non-interactive callers.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub text: String,
}

impl ReplySink for BufferSink {
    fn delta(&mut self, text: &str) {
        self.text.push_str(text);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub mode: ResponseMode,
    /// Set when a stream was cancelled; `text` is what arrived before that.
    pub interrupted: bool,
}

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    rules: ModelRules,
    state: RequestState,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>, rules: ModelRules, state: RequestState) -> Self {
        Self {
            transport,
            rules,
            state,
        }
    }

    /// Rebind to another provider connection.
    pub fn set_transport(&mut self, transport: Arc<dyn ChatTransport>) {
        self.transport = transport;
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn classify(&self, model: &str) -> ResponseMode {
        self.rules.classify(model)
    }

    pub async fn send_chat_request(
        &self,
        transcript: &[Message],
        model: &str,
        sink: &mut dyn ReplySink,
    ) -> Result<ChatReply, DispatchError> {
        let in_flight = self.state.begin()?;
        let mode = self.classify(model);
        debug!(model, %mode, messages = transcript.len(), "dispatching");

        let request = ChatRequest::new(model, transcript, mode == ResponseMode::Streaming);
        let result = match mode {
            ResponseMode::Streaming => self.stream_reply(&request, &in_flight.token, sink).await,
            ResponseMode::Blocking => self.blocking_reply(&request, &in_flight.token, sink).await,
        };
        sink.finished();
        drop(in_flight);
        result
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        token: &CancellationToken,
        sink: &mut dyn ReplySink,
    ) -> Result<ChatReply, DispatchError> {
        let mut reply = ChatReply {
            text: String::new(),
            mode: ResponseMode::Streaming,
            interrupted: false,
        };

        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => {
                reply.interrupted = true;
                return Ok(reply);
            }
            opened = self.transport.open_stream(request) => opened?,
        };

        let mut parser = SseParser::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    // Close the connection before handing back the partial reply.
                    drop(stream);
                    debug!(chars = reply.text.len(), "stream cancelled");
                    reply.interrupted = true;
                    return Ok(reply);
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            for event in parser.push(&chunk?) {
                match event? {
                    SseEvent::Delta(delta) => {
                        sink.delta(&delta);
                        reply.text.push_str(&delta);
                    }
                    SseEvent::Done => return Ok(reply),
                }
            }
        }

        if let Some(event) = parser.finish() {
            if let SseEvent::Delta(delta) = event? {
                sink.delta(&delta);
                reply.text.push_str(&delta);
            }
        }
        if let Some(err) = parser.non_event_error() {
            return Err(err);
        }
        Ok(reply)
    }

    async fn blocking_reply(
        &self,
        request: &ChatRequest,
        token: &CancellationToken,
        sink: &mut dyn ReplySink,
    ) -> Result<ChatReply, DispatchError> {
        sink.waiting();
        let completion = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DispatchError::Interrupted),
            completion = self.transport.complete(request) => completion?,
        };

        let text = completion.first_text().ok_or(DispatchError::NoContent)?;
        sink.delta(&text);
        Ok(ChatReply {
            text,
            mode: ResponseMode::Blocking,
            interrupted: false,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Splits a byte stream into server-sent-event lines and decodes the
/// `data:` payloads.
///
/// Lines that are not part of the event grammar are kept, so a body that
/// never carried an event (a plain JSON error, say) can be reported.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
    saw_data: bool,
    stray: String,
}

impl SseParser {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent, DispatchError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            match std::str::from_utf8(&line[..newline_pos]) {
                Ok(text) => {
                    if let Some(event) = self.process_line(text.trim()) {
                        events.push(event);
                    }
                }
                Err(err) => warn!("Invalid UTF-8 in stream: {err}"),
            }
        }
        events
    }

    /// Handle a final line that arrived without a trailing newline.
    fn finish(&mut self) -> Option<Result<SseEvent, DispatchError>> {
        let rest = std::mem::take(&mut self.buffer);
        let text = std::str::from_utf8(&rest).ok()?;
        self.process_line(text.trim())
    }

    fn process_line(&mut self, line: &str) -> Option<Result<SseEvent, DispatchError>> {
        match extract_data_payload(line) {
            Some(payload) => {
                self.saw_data = true;
                handle_data_payload(payload)
            }
            None => {
                if !is_sse_control_line(line) {
                    self.stray.push_str(line);
                    self.stray.push('\n');
                }
                None
            }
        }
    }

    /// The error to report when the body ended without a single `data:`
    /// event.
    fn non_event_error(&self) -> Option<DispatchError> {
        if self.saw_data {
            return None;
        }
        let body = self.stray.trim();
        if body.is_empty() {
            return Some(DispatchError::Decode("stream ended without any events".to_string()));
        }
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) if value.get("error").is_some() => Some(DispatchError::Api(body.to_string())),
            _ => Some(DispatchError::Decode(format!(
                "expected server-sent events, got: {body}"
            ))),
        }
    }
}

/// Blank separators, `:` comments and the non-data SSE fields.
fn is_sse_control_line(line: &str) -> bool {
    line.is_empty()
        || line.starts_with(':')
        || ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str) -> Option<Result<SseEvent, DispatchError>> {
    if payload == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(|content| Ok(SseEvent::Delta(content))),
        Err(err) => match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) if value.get("error").is_some() => {
                Some(Err(DispatchError::Api(payload.to_string())))
            }
            Ok(_) => {
                debug!("ignoring unrecognised stream event: {payload}");
                None
            }
            Err(_) => Some(Err(DispatchError::Decode(format!("{err}: {payload}")))),
        },
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Render a provider error body for display: a one-line summary when one can
/// be found, followed by the pretty-printed payload.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {summary}\n```json\n{pretty_json}\n```");
                }
            }
            return format!("API Error:\n```json\n{pretty_json}\n```");
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}

/// Caller-side rendering of any dispatch failure.
pub fn describe_dispatch_error(err: &DispatchError) -> String {
    match err {
        DispatchError::Http { status, body } => {
            format!("HTTP {status}\n{}", format_api_error(body))
        }
        DispatchError::Api(payload) => format_api_error(payload),
        other => other.to_string(),
    }
}
