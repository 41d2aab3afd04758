use std::fmt;

use crate::error::FailureKind;

/// States of a flashing attempt
///
/// ```text
/// Idle -> RequestingDevice -> Attaching -> DetectingTarget [-> Resolving]
///      -> Identified -> RemovingProtection -> AssemblingImage -> Writing
///      [-> Verifying] -> ResettingPost -> Detached -> Succeeded
/// ```
///
/// `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    RequestingDevice,
    Attaching,
    DetectingTarget,
    /// Waiting for the operator to pick one of several matching variants
    Resolving,
    Identified,
    RemovingProtection,
    AssemblingImage,
    Writing,
    Verifying,
    ResettingPost,
    Detached,
    Succeeded,
    Failed(FailureKind),
}

impl FlashState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlashState::Succeeded | FlashState::Failed(_))
    }

    /// Whether the flash content may have been modified once this state is
    /// entered
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            FlashState::RemovingProtection
                | FlashState::AssemblingImage
                | FlashState::Writing
                | FlashState::Verifying
                | FlashState::ResettingPost
                | FlashState::Detached
        )
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashState::Failed(kind) => write!(f, "Failed({kind})"),
            state => fmt::Debug::fmt(state, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(FlashState::AssemblingImage.to_string(), "AssemblingImage");
        assert_eq!(
            FlashState::Failed(FailureKind::UserCancelled).to_string(),
            "Failed(UserCancelled)"
        );
    }

    #[test]
    fn terminal_states() {
        assert!(FlashState::Succeeded.is_terminal());
        assert!(FlashState::Failed(FailureKind::Flash).is_terminal());
        assert!(!FlashState::Detached.is_terminal());
        assert!(!FlashState::Resolving.is_destructive());
        assert!(FlashState::Writing.is_destructive());
    }
}
