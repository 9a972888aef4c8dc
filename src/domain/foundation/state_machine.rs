//! State machine trait for status enums.

use super::ValidationError;

/// Trait for status enums whose transitions are driven by outside events.
///
/// Implementors declare the expected transitions; callers decide whether an
/// unexpected one is rejected (`transition_to`) or applied and reported.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is expected.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all expected target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if unexpected.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
    }

    impl StateMachine for Light {
        fn can_transition_to(&self, target: &Self) -> bool {
            matches!((self, target), (Light::Off, Light::On) | (Light::On, Light::Off))
        }

        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Light::Off => vec![Light::On],
                Light::On => vec![Light::Off],
            }
        }
    }

    #[test]
    fn transition_to_accepts_expected_target() {
        assert_eq!(Light::Off.transition_to(Light::On), Ok(Light::On));
    }

    #[test]
    fn transition_to_rejects_unexpected_target() {
        let err = Light::Off.transition_to(Light::Off).unwrap_err();
        assert!(err.to_string().contains("Cannot transition from Off to Off"));
    }
}
