//! Reference-counted, clean-exactly-once resource wrapper, the analogue
//! of `original_source/lib/syncx/resource.go`'s `Resource`.

use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("use of already-cleaned resource")]
pub struct ResourceError;

struct State<T> {
    value: Option<T>,
    refs: i32,
}

/// Tracks borrowers of a value and runs its cleanup exactly once, when
/// the last borrower releases it. Unlike `Arc`, release is explicit
/// (`clean`) rather than drop-driven, matching callers that need to know
/// cleanup already ran before they try to use the value again.
pub struct Resource<T> {
    state: Mutex<State<T>>,
}

impl<T> Resource<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(State {
                value: Some(value),
                refs: 0,
            }),
        }
    }

    /// Registers a use, failing if the resource was already cleaned.
    pub fn acquire(&self) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        if state.value.is_none() {
            return Err(ResourceError);
        }
        state.refs += 1;
        Ok(())
    }

    /// Releases a use. When the last outstanding use releases, `clean`
    /// runs against the wrapped value and it is dropped.
    pub fn release<F: FnOnce(T)>(&self, clean: F) {
        let value = {
            let mut state = self.state.lock().unwrap();
            state.refs -= 1;
            if state.refs > 0 {
                return;
            }
            state.value.take()
        };
        if let Some(value) = value {
            clean(value);
        }
    }

    pub fn is_cleaned(&self) -> bool {
        self.state.lock().unwrap().value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn cleans_only_after_last_release() {
        let resource = Resource::new(42);
        resource.acquire().unwrap();
        resource.acquire().unwrap();

        let cleaned = AtomicBool::new(false);
        resource.release(|_| cleaned.store(true, Ordering::SeqCst));
        assert!(!cleaned.load(Ordering::SeqCst));

        resource.release(|_| cleaned.store(true, Ordering::SeqCst));
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(resource.is_cleaned());
    }

    #[test]
    fn acquire_after_clean_fails() {
        let resource = Resource::new(());
        resource.acquire().unwrap();
        resource.release(|_| {});
        assert!(matches!(resource.acquire(), Err(ResourceError)));
    }
}
