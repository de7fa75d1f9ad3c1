//! Named global breaker registry, translated from
//! `original_source/lib/breaker/breakers.go`. A `DashMap` replaces the
//! original's hand-rolled double-checked `sync.RWMutex` + plain map: it
//! gives the same "read-mostly, rare insert" behavior with sharded locking
//! and without a second lookup on the miss path.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::breaker::{Breaker, CircuitBreaker, Settings};
use crate::error::BreakerError;

fn registry() -> &'static DashMap<String, Arc<Breaker>> {
    static BREAKERS: OnceLock<DashMap<String, Arc<Breaker>>> = OnceLock::new();
    BREAKERS.get_or_init(DashMap::new)
}

/// Installs a passthrough breaker under `name`, disabling breaking for it.
pub fn no_break_for(name: impl Into<String>) {
    registry().insert(name.into(), Arc::new(Breaker::NoOp));
}

/// Installs a real circuit breaker configured by `settings` under
/// `settings.name`.
pub fn set_breaker(settings: Settings) {
    let name = settings.name.clone();
    registry().insert(name, Arc::new(Breaker::Circuit(CircuitBreaker::with_settings(settings))));
}

/// Returns the breaker registered under `name`, lazily installing a
/// default [`CircuitBreaker`] the first time `name` is seen.
pub fn get_or_create(name: &str) -> Arc<Breaker> {
    if let Some(existing) = registry().get(name) {
        return existing.clone();
    }

    registry()
        .entry(name.to_string())
        .or_insert_with(|| {
            Arc::new(Breaker::Circuit(CircuitBreaker::with_settings(Settings {
                name: name.to_string(),
                ..Settings::default()
            })))
        })
        .clone()
}

pub fn do_call<T, E>(name: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
    get_or_create(name).call(f)
}

pub fn do_with_acceptable<T, E>(
    name: &str,
    f: impl FnOnce() -> Result<T, E>,
    acceptable: impl Fn(&Result<T, E>) -> bool,
) -> Result<T, BreakerError<E>> {
    get_or_create(name).call_with_acceptable(f, acceptable)
}

pub fn do_with_fallback<T, E>(
    name: &str,
    f: impl FnOnce() -> Result<T, E>,
    fallback: impl FnOnce(crate::error::Rejection) -> Result<T, E>,
) -> Result<T, BreakerError<E>> {
    get_or_create(name).call_with_fallback(f, fallback)
}

pub fn do_with_fallback_acceptable<T, E>(
    name: &str,
    f: impl FnOnce() -> Result<T, E>,
    fallback: impl FnOnce(crate::error::Rejection) -> Result<T, E>,
    acceptable: impl Fn(&Result<T, E>) -> bool,
) -> Result<T, BreakerError<E>> {
    get_or_create(name).call_with_fallback_acceptable(f, fallback, acceptable)
}

pub async fn do_async_with_acceptable<T, E, Fut>(
    name: &str,
    f: impl FnOnce() -> Fut,
    acceptable: impl Fn(&Result<T, E>) -> bool,
) -> Result<T, BreakerError<E>>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    get_or_create(name).call_async_with_acceptable(f, acceptable).await
}

pub async fn do_async_with_fallback_acceptable<T, E, Fut>(
    name: &str,
    f: impl FnOnce() -> Fut,
    fallback: impl FnOnce(crate::error::Rejection) -> Result<T, E>,
    acceptable: impl Fn(&Result<T, E>) -> bool,
) -> Result<T, BreakerError<E>>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    get_or_create(name)
        .call_async_with_fallback_acceptable(f, fallback, acceptable)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;

    #[test]
    fn unknown_name_gets_a_default_breaker_lazily() {
        let result: Result<(), BreakerError<&str>> = do_call("lazy-default-1", || Ok(()));
        assert!(result.is_ok());
        assert_eq!(get_or_create("lazy-default-1").name(), "lazy-default-1");
    }

    #[test]
    fn no_break_for_always_passes_through() {
        no_break_for("disabled-1");
        for _ in 0..10 {
            let _: Result<(), BreakerError<&str>> = do_call("disabled-1", || Err("boom"));
        }
        // A real breaker would have tripped open by now; NoOp never rejects.
        let result: Result<(), BreakerError<&str>> = do_call("disabled-1", || Err("boom"));
        assert!(matches!(result, Err(BreakerError::Inner("boom"))));
    }

    #[test]
    fn fallback_runs_only_on_rejection_not_on_inner_failure() {
        set_breaker(Settings {
            name: "fallback-1".into(),
            ready_to_trip: std::sync::Arc::new(|c| c.consecutive_failures > 0),
            timeout: std::time::Duration::from_secs(60),
            ..Settings::default()
        });

        let result: Result<&str, BreakerError<&str>> =
            do_with_fallback("fallback-1", || Err("inner failure"), |_: Rejection| Ok("fallback"));
        assert!(matches!(result, Err(BreakerError::Inner("inner failure"))));

        let result: Result<&str, BreakerError<&str>> =
            do_with_fallback("fallback-1", || Err("still rejected"), |_: Rejection| Ok("fallback"));
        assert_eq!(result.unwrap(), "fallback");
    }
}
