use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

/// Boxed timer future handed out by a [`Clock`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Source of timers for attempt deadlines and retry backoff.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// [`Clock`] backed by `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Caller-owned cancellation handle.
///
/// Clones share state: cancelling any clone cancels them all. Once
/// cancelled it stays cancelled.
#[derive(Clone)]
pub struct CancelSignal {
    state: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Latest-wins request slot.
///
/// Starting a request through the slot cancels the one it started before,
/// so a screen that refreshes twice only ever sees the newest result; the
/// superseded call ends with [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled).
/// Clones share the slot.
///
/// ```no_run
/// use feedapi_http::{ApiClient, ClientConfig, LatestRequest, RequestOptions};
///
/// # async fn refresh(client: &ApiClient, feed: &LatestRequest) -> feedapi_http::Result<()> {
/// let page = feed
///     .run(|signal| client.get("/feed", RequestOptions::new().signal(signal)))
///     .await?;
/// # let _ = page;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct LatestRequest {
    current: Arc<Mutex<Option<CancelSignal>>>,
}

impl LatestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the request started before, if any, and returns the signal
    /// for the next one.
    pub fn begin(&self) -> CancelSignal {
        let next = CancelSignal::new();
        if let Some(previous) = self.slot().replace(next.clone()) {
            previous.cancel();
        }
        next
    }

    /// Cancels the current request, if any. The slot is empty afterwards.
    pub fn cancel(&self) {
        if let Some(current) = self.slot().take() {
            current.cancel();
        }
    }

    /// Runs `call` with a fresh signal after superseding the previous call.
    pub async fn run<F, Fut, T>(&self, call: F) -> crate::Result<T>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let signal = self.begin();
        call(signal).await
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancelSignal>> {
        // The guarded value is a plain handle; a panicking holder cannot
        // leave it half-written.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LatestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatestRequest")
            .field("current", &*self.slot())
            .finish()
    }
}

/// Why an attempt or a backoff pause stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// The attempt's own deadline passed.
    Timeout,
    /// The caller's [`CancelSignal`] fired.
    Cancelled,
}

/// Deadline and cancel wiring for exactly one attempt.
///
/// The timer is armed on construction and owned by the scope; it is
/// dropped when [`AttemptScope::run`] returns, whichever way it returns.
pub(crate) struct AttemptScope<'a> {
    deadline: Sleep,
    signal: Option<&'a CancelSignal>,
}

impl<'a> AttemptScope<'a> {
    pub(crate) fn new(clock: &dyn Clock, timeout: Duration, signal: Option<&'a CancelSignal>) -> Self {
        Self {
            deadline: clock.sleep(timeout),
            signal,
        }
    }

    /// Drives `future` until it completes, the deadline passes or the
    /// caller cancels. An already-cancelled signal wins before `future`
    /// is polled.
    pub(crate) async fn run<F>(self, future: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        let Self { deadline, signal } = self;
        if signal.is_some_and(CancelSignal::is_cancelled) {
            return Err(Interrupt::Cancelled);
        }

        tokio::select! {
            biased;
            _ = wait_cancelled(signal) => Err(Interrupt::Cancelled),
            output = future => Ok(output),
            _ = deadline => Err(Interrupt::Timeout),
        }
    }
}

/// Sleeps for `delay` unless the caller cancels first.
pub(crate) async fn pause(
    clock: &dyn Clock,
    delay: Duration,
    signal: Option<&CancelSignal>,
) -> Result<(), Interrupt> {
    if signal.is_some_and(CancelSignal::is_cancelled) {
        return Err(Interrupt::Cancelled);
    }

    tokio::select! {
        biased;
        _ = wait_cancelled(signal) => Err(Interrupt::Cancelled),
        _ = clock.sleep(delay) => Ok(()),
    }
}

async fn wait_cancelled(signal: Option<&CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{pause, AttemptScope, CancelSignal, Interrupt, LatestRequest, TokioClock};
    use crate::{AppError, ErrorKind};

    #[tokio::test(start_paused = true)]
    async fn completes_before_deadline() {
        let scope = AttemptScope::new(&TokioClock, Duration::from_millis(100), None);
        let out = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_future() {
        let started = tokio::time::Instant::now();
        let scope = AttemptScope::new(&TokioClock, Duration::from_millis(250), None);
        let out = scope.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancel_is_distinguished_from_timeout() {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let scope = AttemptScope::new(&TokioClock, Duration::from_secs(5), Some(&signal));
        let out = scope.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::Cancelled));
    }

    #[tokio::test]
    async fn pre_cancelled_signal_never_polls_future() {
        let signal = CancelSignal::new();
        signal.cancel();
        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();

        let scope = AttemptScope::new(&TokioClock, Duration::from_secs(5), Some(&signal));
        let out = scope
            .run(async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(out, Err(Interrupt::Cancelled));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_cancellable() {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let out = pause(&TokioClock, Duration::from_secs(8), Some(&signal)).await;
        assert_eq!(out, Err(Interrupt::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_without_signal_sleeps_full_delay() {
        let started = tokio::time::Instant::now();
        assert_eq!(pause(&TokioClock, Duration::from_millis(1_500), None).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(1_500));
    }

    #[test]
    fn beginning_a_request_cancels_the_previous_one() {
        let slot = LatestRequest::new();
        let first = slot.begin();
        assert!(!first.is_cancelled());

        let second = slot.clone().begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        slot.cancel();
        assert!(second.is_cancelled());
        assert_eq!(format!("{slot:?}"), "LatestRequest { current: None }");

        let third = slot.begin();
        assert!(!third.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_run_ends_cancelled() {
        let slot = LatestRequest::new();
        let call = |signal: CancelSignal| async move {
            let scope = AttemptScope::new(&TokioClock, Duration::from_secs(5), Some(&signal));
            scope
                .run(std::future::pending::<()>())
                .await
                .map_err(|interrupt| match interrupt {
                    Interrupt::Cancelled => AppError::from_kind(ErrorKind::Cancelled),
                    Interrupt::Timeout => AppError::from_kind(ErrorKind::Timeout),
                })
        };

        let stale = slot.run(call);
        let fresh = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            slot.begin();
            Ok::<_, AppError>("fresh")
        };
        let (stale, fresh) = tokio::join!(stale, fresh);

        assert_eq!(stale.map_err(|err| err.kind), Err(ErrorKind::Cancelled));
        assert_eq!(fresh.map_err(|err| err.kind), Ok("fresh"));
    }

    #[test]
    fn clones_share_cancellation() {
        let signal = CancelSignal::new();
        let other = signal.clone();
        assert!(!signal.is_cancelled());
        other.cancel();
        assert!(signal.is_cancelled());
        assert_eq!(format!("{signal:?}"), "CancelSignal { cancelled: true }");
    }
}
