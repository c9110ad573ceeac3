use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::{AppError, CancelSignal, ErrorKind};

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: usize = 2;
/// Statuses retried when the caller does not override them.
pub const DEFAULT_RETRY_ON: [u16; 4] = [429, 502, 503, 504];

/// HTTP methods accepted by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// GET, HEAD and PUT may be replayed without duplicating side effects.
    ///
    /// PATCH is deliberately excluded.
    pub const fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Put)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart form that can be rebuilt for every attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub(crate) parts: Vec<MultipartPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file field; e.g. a video clip for the upload screen.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.map(str::to_owned),
            bytes: bytes.into(),
        });
        self
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }
}

/// Request payload.
///
/// Only [`Body::Json`] gets a default `Content-Type`; the other variants
/// leave it to the caller or the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Multipart(MultipartForm),
}

impl Body {
    /// Serializes any `Serialize` value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| AppError::from_kind(ErrorKind::Unknown).with_cause(err))
    }

    pub(crate) fn is_opaque(&self) -> bool {
        !matches!(self, Self::Json(_))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<MultipartForm> for Body {
    fn from(form: MultipartForm) -> Self {
        Self::Multipart(form)
    }
}

/// Per-call options. Unset values fall back to [`ClientConfig`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<usize>,
    pub retry_on: Option<BTreeSet<u16>>,
    pub signal: Option<CancelSignal>,
    pub auth_token: Option<String>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body", &self.body.is_some())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_on", &self.retry_on)
            .field("signal", &self.signal)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults to [`Method::Get`].
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header. A name matching a default header (`Accept`,
    /// `Content-Type`, `User-Agent`, `Authorization`) replaces it regardless
    /// of case.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// JSON values, raw bytes or a [`MultipartForm`].
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Per-attempt deadline; overrides [`ClientConfig::timeout_ms`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retries after the first attempt. Only idempotent methods use them.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Replaces the retryable status set for this call.
    pub fn retry_on(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on = Some(statuses.into_iter().collect());
        self
    }

    /// Cancelling `signal` aborts the in-flight attempt and any pending
    /// backoff with [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled).
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Bearer token for this call only. Takes precedence over
    /// [`ClientConfig::auth_token`].
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Exponential backoff parameters, in milliseconds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry, doubled for every further attempt.
    pub base_ms: u64,
    /// Upper bound for the exponential part.
    pub cap_ms: u64,
    /// Jitter is drawn uniformly from `[0, jitter_ms)`.
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 8_000,
            jitter_ms: 400,
        }
    }
}

/// Client-wide configuration injected at construction time.
#[derive(Clone, Eq, PartialEq)]
pub struct ClientConfig {
    /// Prefix for relative request paths.
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_on: BTreeSet<u16>,
    pub backoff: BackoffConfig,
    /// Bearer token used when a call does not supply its own.
    pub auth_token: Option<String>,
    /// Sent as `User-Agent` on every request that does not set one.
    pub user_agent: Option<String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_on", &self.retry_on)
            .field("backoff", &self.backoff)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_on: DEFAULT_RETRY_ON.into_iter().collect(),
            backoff: BackoffConfig::default(),
            auth_token: None,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Default timeouts, retry policy and backoff against `base_url`.
    ///
    /// ```no_run
    /// use feedapi_http::{ApiClient, ClientConfig};
    ///
    /// let config = ClientConfig::new("https://api.example.com")
    ///     .with_auth_token("session-token")
    ///     .with_user_agent("feed-mobile/4.2")
    ///     .with_max_retries(3);
    /// let client = ApiClient::new(config);
    /// # let _ = client;
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from environment variables.
    ///
    /// - `FEEDAPI_BASE_URL`: required, e.g. `https://api.example.com`
    /// - `FEEDAPI_TOKEN`: optional bearer token
    /// - `FEEDAPI_TIMEOUT_MS`: optional, positive integer
    /// - `FEEDAPI_MAX_RETRIES`: optional, non-negative integer
    /// - `FEEDAPI_USER_AGENT`: optional `User-Agent` value
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = std::env::var("FEEDAPI_BASE_URL")
            .map_err(|_| "missing FEEDAPI_BASE_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("FEEDAPI_BASE_URL is set but empty".to_owned());
        }
        let mut config = Self::new(base_url.trim());

        if let Ok(token) = std::env::var("FEEDAPI_TOKEN") {
            if !token.trim().is_empty() {
                config.auth_token = Some(token.trim().to_owned());
            }
        }
        if let Ok(raw) = std::env::var("FEEDAPI_TIMEOUT_MS") {
            config.timeout_ms = match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => return Err(format!("FEEDAPI_TIMEOUT_MS must be a positive integer, got '{raw}'")),
            };
        }
        if let Ok(raw) = std::env::var("FEEDAPI_MAX_RETRIES") {
            config.max_retries = raw.trim().parse::<usize>().map_err(|_| {
                format!("FEEDAPI_MAX_RETRIES must be a non-negative integer, got '{raw}'")
            })?;
        }
        if let Ok(agent) = std::env::var("FEEDAPI_USER_AGENT") {
            if !agent.trim().is_empty() {
                config.user_agent = Some(agent.trim().to_owned());
            }
        }
        Ok(config)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_on(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on = statuses.into_iter().collect();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// A caller-supplied `User-Agent` header still takes precedence.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
