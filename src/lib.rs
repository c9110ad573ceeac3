//! `feedapi-http` is the resilient HTTP request core of the feed API client.
//!
//! Every call goes through [`ApiClient::request`], which:
//! - builds headers and body from [`RequestOptions`]
//! - bounds each attempt by its own timeout and the caller's [`CancelSignal`]
//! - retries idempotent requests with exponential backoff or `Retry-After`
//! - normalizes every failure into a single [`AppError`]
//!
//! [`LatestRequest`] keeps only the newest of several overlapping calls
//! alive, cancelling the ones it supersedes.
//!
//! Method shortcuts: [`ApiClient::get`], [`ApiClient::post`],
//! [`ApiClient::put`], [`ApiClient::patch`], [`ApiClient::delete`].

mod builder;
mod client;
mod decode;
mod error;
mod lifecycle;
mod options;
mod retry;
mod transport;

pub use builder::{PreparedRequest, WireBody};
pub use client::ApiClient;
pub use error::{AppError, ErrorDetails, ErrorKind};
pub use lifecycle::{CancelSignal, Clock, LatestRequest, Sleep, TokioClock};
pub use options::{
    BackoffConfig, Body, ClientConfig, Method, MultipartForm, MultipartPart, RequestOptions,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_ON, DEFAULT_TIMEOUT_MS,
};
pub use transport::{BoxError, BoxFuture, HttpResponse, ReqwestTransport, Transport, TransportError};

pub type Result<T> = std::result::Result<T, AppError>;
