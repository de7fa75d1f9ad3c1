//! Generation-token circuit breaker, translated from
//! `original_source/lib/breaker/breaker.go`.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt as _;

use crate::error::{BreakerError, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

/// Request/outcome tally since the last state change or interval reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Counts::default();
    }
}

pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
pub type OnStateChange = Arc<dyn Fn(&str, State, State) + Send + Sync>;

fn default_ready_to_trip() -> ReadyToTrip {
    Arc::new(|counts: &Counts| counts.consecutive_failures > 5)
}

/// Configures a [`CircuitBreaker`]. Unlike the original's zero-means-default
/// convention (Go's struct fields default to their zero value), fields here
/// are already their intended defaults through [`Default`]; override what
/// you need with struct-update syntax.
#[derive(Clone)]
pub struct Settings {
    pub name: String,
    pub max_requests: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub ready_to_trip: ReadyToTrip,
    pub on_state_change: Option<OnStateChange>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_requests: 3,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            ready_to_trip: default_ready_to_trip(),
            on_state_change: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// State machine that rejects calls once `ready_to_trip` decides the
/// closed-state failure run is bad enough, then probes recovery after
/// `timeout` with up to `max_requests` half-open trial calls.
pub struct CircuitBreaker {
    name: String,
    max_requests: u32,
    interval: Duration,
    timeout: Duration,
    ready_to_trip: ReadyToTrip,
    on_state_change: Option<OnStateChange>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let now = Instant::now();
        let mut inner = Inner {
            state: State::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        to_new_generation(&mut inner, now, settings.interval, settings.timeout);

        Self {
            name: settings.name,
            max_requests: settings.max_requests,
            interval: settings.interval,
            timeout: settings.timeout,
            ready_to_trip: settings.ready_to_trip,
            on_state_change: settings.on_state_change,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counts(&self) -> Counts {
        self.inner.lock().unwrap().counts
    }

    pub fn state(&self) -> State {
        let mut inner = self.inner.lock().unwrap();
        self.current_state(&mut inner, Instant::now()).0
    }

    /// Runs `f` if admitted; a panic inside `f` is counted as a failure and
    /// then re-raised, matching the original's `recover`-then-`panic` defer.
    pub fn call<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        self.call_with_acceptable(f, |r| r.is_ok())
    }

    pub fn call_with_acceptable<T, E>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>> {
        let generation = self.before_request().map_err(BreakerError::from)?;

        let result = std::panic::catch_unwind(AssertUnwindSafe(f));
        let result = match result {
            Ok(result) => result,
            Err(payload) => {
                self.after_request(generation, false);
                std::panic::resume_unwind(payload);
            }
        };

        self.after_request(generation, acceptable(&result));
        result.map_err(BreakerError::Inner)
    }

    pub async fn call_async<T, E, Fut>(
        &self,
        f: impl FnOnce() -> Fut,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_async_with_acceptable(f, |r| r.is_ok()).await
    }

    pub async fn call_async_with_acceptable<T, E, Fut>(
        &self,
        f: impl FnOnce() -> Fut,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let generation = self.before_request().map_err(BreakerError::from)?;

        let result = AssertUnwindSafe(f()).catch_unwind().await;
        let result = match result {
            Ok(result) => result,
            Err(payload) => {
                self.after_request(generation, false);
                std::panic::resume_unwind(payload);
            }
        };

        self.after_request(generation, acceptable(&result));
        result.map_err(BreakerError::Inner)
    }

    /// Crate-visible hooks for [`crate::two_step::TwoStepBreaker`], which
    /// needs to split admission and outcome-reporting into two calls.
    pub(crate) fn before_request_pub(&self) -> Result<u64, Rejection> {
        self.before_request()
    }

    pub(crate) fn after_request_pub(&self, before: u64, success: bool) {
        self.after_request(before, success)
    }

    fn before_request(&self) -> Result<u64, Rejection> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let (state, generation) = self.current_state(&mut inner, now);

        match state {
            State::Open => Err(Rejection::Open),
            State::HalfOpen if inner.counts.requests >= self.max_requests => {
                Err(Rejection::TooManyRequests)
            }
            _ => {
                inner.counts.on_request();
                Ok(generation)
            }
        }
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let (state, generation) = self.current_state(&mut inner, now);
        if generation != before {
            return;
        }

        if success {
            self.on_success(&mut inner, state, now);
        } else {
            self.on_failure(&mut inner, state, now);
        }
    }

    fn on_success(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => inner.counts.on_success(),
            State::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.max_requests {
                    self.set_state(inner, State::Closed, now);
                }
            }
            State::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => {
                inner.counts.on_failure();
                if (self.ready_to_trip)(&inner.counts) {
                    self.set_state(inner, State::Open, now);
                }
            }
            State::HalfOpen => self.set_state(inner, State::Open, now),
            State::Open => {}
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> (State, u64) {
        match inner.state {
            State::Closed => {
                if let Some(expiry) = inner.expiry {
                    if expiry <= now {
                        to_new_generation(inner, now, self.interval, self.timeout);
                    }
                }
            }
            State::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, State::HalfOpen, now);
                }
            }
            State::HalfOpen => {}
        }

        (inner.state, inner.generation)
    }

    fn set_state(&self, inner: &mut Inner, state: State, now: Instant) {
        if inner.state == state {
            return;
        }

        let prev = inner.state;
        inner.state = state;
        to_new_generation(inner, now, self.interval, self.timeout);

        tracing::info!(breaker = %self.name, from = ?prev, to = ?state, "circuit breaker state change");
        if let Some(on_state_change) = &self.on_state_change {
            on_state_change(&self.name, prev, state);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

const NOOP_BREAKER_NAME: &str = "NoOpBreaker";

/// A named breaker, admitting either a real [`CircuitBreaker`] or a
/// passthrough. An enum rather than `dyn Breaker`: the original's `Breaker`
/// interface is generic per call (`Do(req func() error) error` is called
/// with all sorts of closures), and a `Do<T, E>` method isn't object-safe
/// in Rust, so the registry holds this instead of a trait object.
pub enum Breaker {
    Circuit(CircuitBreaker),
    NoOp,
}

impl Breaker {
    pub fn name(&self) -> &str {
        match self {
            Breaker::Circuit(cb) => cb.name(),
            Breaker::NoOp => NOOP_BREAKER_NAME,
        }
    }

    pub fn call<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        match self {
            Breaker::Circuit(cb) => cb.call(f),
            Breaker::NoOp => f().map_err(BreakerError::Inner),
        }
    }

    pub fn call_with_acceptable<T, E>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>> {
        match self {
            Breaker::Circuit(cb) => cb.call_with_acceptable(f, acceptable),
            Breaker::NoOp => f().map_err(BreakerError::Inner),
        }
    }

    /// Runs `fallback` only when the breaker itself rejected the call, never
    /// when `f` ran and failed on its own — the original's fallback closure
    /// wraps a rejection error, not the request's own error.
    pub fn call_with_fallback<T, E>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
        fallback: impl FnOnce(Rejection) -> Result<T, E>,
    ) -> Result<T, BreakerError<E>> {
        match self.call(f) {
            Err(BreakerError::Rejected(rejection)) => {
                fallback(rejection).map_err(BreakerError::Inner)
            }
            other => other,
        }
    }

    pub fn call_with_fallback_acceptable<T, E>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
        fallback: impl FnOnce(Rejection) -> Result<T, E>,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>> {
        match self.call_with_acceptable(f, acceptable) {
            Err(BreakerError::Rejected(rejection)) => {
                fallback(rejection).map_err(BreakerError::Inner)
            }
            other => other,
        }
    }

    /// Async counterpart for guarding RPC-shaped calls, needed wherever
    /// the guarded request is itself a future rather than a plain closure.
    pub async fn call_async<T, E, Fut>(
        &self,
        f: impl FnOnce() -> Fut,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_async_with_acceptable(f, |r| r.is_ok()).await
    }

    pub async fn call_async_with_acceptable<T, E, Fut>(
        &self,
        f: impl FnOnce() -> Fut,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        match self {
            Breaker::Circuit(cb) => cb.call_async_with_acceptable(f, acceptable).await,
            Breaker::NoOp => f().await.map_err(BreakerError::Inner),
        }
    }

    pub async fn call_async_with_fallback_acceptable<T, E, Fut>(
        &self,
        f: impl FnOnce() -> Fut,
        fallback: impl FnOnce(Rejection) -> Result<T, E>,
        acceptable: impl Fn(&Result<T, E>) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        match self.call_async_with_acceptable(f, acceptable).await {
            Err(BreakerError::Rejected(rejection)) => {
                fallback(rejection).map_err(BreakerError::Inner)
            }
            other => other,
        }
    }
}

fn to_new_generation(inner: &mut Inner, now: Instant, interval: Duration, timeout: Duration) {
    inner.generation += 1;
    inner.counts.clear();

    inner.expiry = match inner.state {
        State::Closed if interval.is_zero() => None,
        State::Closed => Some(now + interval),
        State::Open => Some(now + timeout),
        State::HalfOpen => None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_requests: u32, timeout: Duration) -> Settings {
        Settings {
            name: "test".into(),
            max_requests,
            interval: Duration::from_secs(0),
            timeout,
            ready_to_trip: Arc::new(|c: &Counts| c.consecutive_failures > 2),
            on_state_change: None,
        }
    }

    #[test]
    fn trips_open_after_ready_to_trip_says_so() {
        let cb = CircuitBreaker::with_settings(settings(1, Duration::from_secs(60)));
        for _ in 0..3 {
            let _: Result<(), BreakerError<&str>> = cb.call(|| Err("boom"));
        }
        assert_eq!(cb.state(), State::Open);
        let result: Result<(), BreakerError<&str>> = cb.call(|| Ok(()));
        assert!(matches!(result, Err(BreakerError::Rejected(Rejection::Open))));
    }

    #[test]
    fn half_open_closes_after_enough_consecutive_successes() {
        let cb = CircuitBreaker::with_settings(settings(2, Duration::from_millis(1)));
        for _ in 0..3 {
            let _: Result<(), BreakerError<&str>> = cb.call(|| Err("boom"));
        }
        assert_eq!(cb.state(), State::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), State::HalfOpen);

        let _: Result<(), BreakerError<&str>> = cb.call(|| Ok(()));
        let _: Result<(), BreakerError<&str>> = cb.call(|| Ok(()));
        assert_eq!(cb.state(), State::Closed);
    }

    #[test]
    fn half_open_trips_open_again_on_any_failure() {
        let cb = CircuitBreaker::with_settings(settings(2, Duration::from_millis(1)));
        for _ in 0..3 {
            let _: Result<(), BreakerError<&str>> = cb.call(|| Err("boom"));
        }
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), State::HalfOpen);

        let _: Result<(), BreakerError<&str>> = cb.call(|| Err("still broken"));
        assert_eq!(cb.state(), State::Open);
    }

    #[test]
    fn stale_generation_outcome_is_discarded() {
        let cb = CircuitBreaker::with_settings(settings(1, Duration::from_millis(1)));
        let generation = cb.before_request().unwrap();
        for _ in 0..3 {
            let _: Result<(), BreakerError<&str>> = cb.call(|| Err("boom"));
        }
        assert_eq!(cb.state(), State::Open);

        // An outcome for a generation that has since rolled over must not
        // be applied.
        cb.after_request(generation, true);
        assert_eq!(cb.state(), State::Open);
    }

    #[test]
    fn panic_is_counted_as_failure_then_repropagated() {
        let cb = CircuitBreaker::with_settings(settings(1, Duration::from_secs(60)));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), BreakerError<&str>> = cb.call(|| -> Result<(), &str> {
                panic!("kaboom");
            });
        }));
        assert!(result.is_err());
        assert_eq!(cb.counts().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn async_call_trips_open_the_same_as_sync() {
        let cb = CircuitBreaker::with_settings(settings(1, Duration::from_secs(60)));
        for _ in 0..3 {
            let _: Result<(), BreakerError<&str>> = cb.call_async(|| async { Err("boom") }).await;
        }
        assert_eq!(cb.state(), State::Open);
        let result: Result<(), BreakerError<&str>> = cb.call_async(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(BreakerError::Rejected(Rejection::Open))));
    }
}
