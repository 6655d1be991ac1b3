//! Global pause switch: `{Active, Paused}`, admin-driven transitions only.

use stable_common::error::EngineError;
use stable_common::types::Lifecycle;

/// Fail with `EngineError::Paused` unless `state` is active.
pub fn ensure_active(state: Lifecycle) -> Result<(), EngineError> {
    match state {
        Lifecycle::Active => Ok(()),
        Lifecycle::Paused => Err(EngineError::Paused),
    }
}

/// Validate a transition from `current` to `target`.
pub fn transition(current: Lifecycle, target: Lifecycle) -> Result<Lifecycle, EngineError> {
    if current == target {
        return Err(EngineError::AlreadyInState(current));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_active() {
        assert!(ensure_active(Lifecycle::Active).is_ok());
        assert_eq!(ensure_active(Lifecycle::Paused), Err(EngineError::Paused));
    }

    #[test]
    fn test_transitions() {
        assert_eq!(
            transition(Lifecycle::Active, Lifecycle::Paused),
            Ok(Lifecycle::Paused)
        );
        assert_eq!(
            transition(Lifecycle::Paused, Lifecycle::Active),
            Ok(Lifecycle::Active)
        );
        assert_eq!(
            transition(Lifecycle::Paused, Lifecycle::Paused),
            Err(EngineError::AlreadyInState(Lifecycle::Paused))
        );
    }
}
