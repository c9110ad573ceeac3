use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use crate::decode::parse_body;
use crate::lifecycle::Interrupt;
use crate::{AppError, BackoffConfig, ErrorKind, HttpResponse, Method, TransportError};

/// What one attempt means for the attempt loop.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success(Value),
    /// Eligible for another attempt if any remain.
    Retryable {
        error: AppError,
        retry_after: Option<Duration>,
    },
    Terminal(AppError),
}

impl Outcome {
    fn retry_if(eligible: bool, error: AppError, retry_after: Option<Duration>) -> Self {
        if eligible {
            Self::Retryable { error, retry_after }
        } else {
            Self::Terminal(error)
        }
    }
}

pub(crate) fn classify_response(
    method: Method,
    response: &HttpResponse,
    retry_on: &BTreeSet<u16>,
) -> Outcome {
    let body = parse_body(response);
    if response.is_success() {
        return Outcome::Success(body);
    }

    let error = AppError::from_response(response.status, body);
    if method.is_idempotent() && retry_on.contains(&response.status) {
        let retry_after = response.header("retry-after").and_then(parse_retry_after);
        Outcome::Retryable { error, retry_after }
    } else {
        Outcome::Terminal(error)
    }
}

pub(crate) fn classify_interrupt(method: Method, interrupt: Interrupt) -> Outcome {
    match interrupt {
        Interrupt::Cancelled => Outcome::Terminal(AppError::from_kind(ErrorKind::Cancelled)),
        Interrupt::Timeout => Outcome::retry_if(
            method.is_idempotent(),
            AppError::from_kind(ErrorKind::Timeout),
            None,
        ),
    }
}

pub(crate) fn classify_transport_error(method: Method, err: TransportError) -> Outcome {
    match err {
        TransportError::Network(cause) => Outcome::retry_if(
            method.is_idempotent(),
            AppError::from_kind(ErrorKind::Network).with_shared_cause(Arc::from(cause)),
            None,
        ),
        TransportError::App(error) => Outcome::Terminal(error),
        TransportError::Other(cause) => Outcome::Terminal(
            AppError::from_kind(ErrorKind::Unknown).with_shared_cause(Arc::from(cause)),
        ),
    }
}

/// Reads a `Retry-After` value given in (possibly fractional) seconds.
///
/// Zero, negative, non-numeric and HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// `min(base * 2^attempt, cap)` plus jitter in `[0, jitter_ms)`.
pub(crate) fn backoff_delay(attempt: usize, backoff: &BackoffConfig) -> Duration {
    let jitter = if backoff.jitter_ms > 0 {
        rand::rng().random_range(0..backoff.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(exponential_ms(attempt, backoff).saturating_add(jitter))
}

fn exponential_ms(attempt: usize, backoff: &BackoffConfig) -> u64 {
    let exp = attempt.min(32) as u32;
    backoff
        .base_ms
        .saturating_mul(1u64 << exp)
        .min(backoff.cap_ms)
}
