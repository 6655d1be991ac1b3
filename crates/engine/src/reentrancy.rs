//! In-flight marker for mutating entry points.
//!
//! `enter()` atomically claims the marker and hands back an `InFlight` token;
//! dropping the token releases it, so the marker clears on every exit path
//! including early returns and errors.

use std::sync::atomic::{AtomicBool, Ordering};

use stable_common::error::EngineError;

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    in_flight: AtomicBool,
}

/// Proof that the caller currently holds the guard.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct InFlight<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Result<InFlight<'_>, EngineError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                tracing::warn!("Reentrant call rejected");
                EngineError::Reentrancy
            })?;
        Ok(InFlight { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_enter_rejected_while_held() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter().unwrap();
        assert!(guard.is_held());
        assert_eq!(guard.enter().unwrap_err(), EngineError::Reentrancy);
        drop(token);
        assert!(!guard.is_held());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing(guard: &ReentrancyGuard) -> Result<(), EngineError> {
            let _in_flight = guard.enter()?;
            Err(EngineError::ZeroAmount)
        }

        let guard = ReentrancyGuard::new();
        assert_eq!(failing(&guard), Err(EngineError::ZeroAmount));
        assert!(!guard.is_held());
    }
}
