use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    builder,
    decode::decode_payload,
    lifecycle::{self, AttemptScope},
    retry::{self, Outcome},
    AppError, Body, CancelSignal, ClientConfig, Clock, ErrorKind, Method, ReqwestTransport,
    RequestOptions, Result, TokioClock, Transport,
};

/// Resilient client for the feed API.
///
/// Every call runs a bounded attempt loop. Each attempt gets its own
/// deadline, idempotent requests are retried on retryable failures with
/// backoff, and all failures are normalized into [`AppError`].
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client talking to `config.base_url` over `reqwest`.
    ///
    /// ```no_run
    /// use feedapi_http::{ApiClient, ClientConfig, RequestOptions};
    ///
    /// # async fn run() -> feedapi_http::Result<()> {
    /// let client = ApiClient::new(
    ///     ClientConfig::new("https://api.example.com").with_auth_token("session-token"),
    /// );
    /// let feed = client.get("/feed", RequestOptions::new()).await?;
    /// println!("{feed}");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            clock: Arc::new(TokioClock),
            config,
        }
    }

    /// Creates a client from `FEEDAPI_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    ///
    /// ```no_run
    /// use feedapi_http::ApiClient;
    ///
    /// let client = ApiClient::from_env().expect("FEEDAPI_BASE_URL must be set");
    /// # let _ = client;
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        ClientConfig::from_env().map(Self::new)
    }

    /// Replaces the network layer.
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Replaces the timer source used for deadlines and backoff.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Executes a request and returns the parsed payload.
    ///
    /// `path` is joined onto the configured base URL unless it is already an
    /// absolute `http(s)://` URL.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value> {
        let prepared = builder::prepare(&self.config, path, &options);
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.config.timeout_ms));
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let retry_on = options.retry_on.as_ref().unwrap_or(&self.config.retry_on);
        let signal = options.signal.as_ref();

        let mut attempt = 0usize;
        loop {
            let scope = AttemptScope::new(self.clock.as_ref(), timeout, signal);
            let outcome = match scope.run(self.transport.send(&prepared)).await {
                Ok(Ok(response)) => retry::classify_response(prepared.method, &response, retry_on),
                Ok(Err(err)) => retry::classify_transport_error(prepared.method, err),
                Err(interrupt) => retry::classify_interrupt(prepared.method, interrupt),
            };

            let (error, retry_after) = match outcome {
                Outcome::Success(payload) => return Ok(payload),
                Outcome::Terminal(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %prepared.method,
                        url = %prepared.url,
                        attempt,
                        kind = %error.kind,
                        "request failed"
                    );
                    return Err(error);
                }
                Outcome::Retryable { error, retry_after } => (error, retry_after),
            };

            if attempt >= max_retries {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %prepared.method,
                    url = %prepared.url,
                    attempts = attempt + 1,
                    kind = %error.kind,
                    "retries exhausted"
                );
                return Err(error);
            }

            let delay = retry_after
                .unwrap_or_else(|| retry::backoff_delay(attempt, &self.config.backoff));

            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %prepared.method,
                url = %prepared.url,
                attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );

            lifecycle::pause(self.clock.as_ref(), delay, signal)
                .await
                .map_err(|_| AppError::from_kind(ErrorKind::Cancelled))?;
            attempt += 1;
        }
    }

    /// Like [`ApiClient::request`], decoding the payload into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let payload = self.request(path, options).await?;
        decode_payload(payload)
    }

    /// GET `path`. Retried on retryable failures.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(path, options.method(Method::Get)).await
    }

    /// POST `body` to `path`. Never retried.
    pub async fn post(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<Value> {
        self.request(path, options.method(Method::Post).body(body))
            .await
    }

    /// PUT `body` to `path`. Retried like a GET.
    pub async fn put(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<Value> {
        self.request(path, options.method(Method::Put).body(body))
            .await
    }

    /// PATCH `path` with `body`. Never retried.
    pub async fn patch(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<Value> {
        self.request(path, options.method(Method::Patch).body(body))
            .await
    }

    /// DELETE `path`. Never retried.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(path, options.method(Method::Delete)).await
    }

    /// Convenience for a GET bound to a caller-owned cancel signal.
    pub async fn get_cancellable(&self, path: &str, signal: &CancelSignal) -> Result<Value> {
        self.get(path, RequestOptions::new().signal(signal.clone()))
            .await
    }
}
