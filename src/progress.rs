use crate::{flasher::FlashState, targets::ScooterProfile};

/// Progress update callbacks
pub trait ProgressCallbacks {
    /// A flashing attempt started
    fn init(&mut self, profile: &ScooterProfile);
    /// The attempt entered a new state
    fn update(&mut self, state: &FlashState);
    /// A progress line was logged
    fn message(&mut self, _line: &str) {}
    /// The attempt reached a terminal state
    fn finish(&mut self, succeeded: bool);
}

/// An empty implementation of [ProgressCallbacks] that does nothing
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultProgressCallback;

impl ProgressCallbacks for DefaultProgressCallback {
    fn init(&mut self, _profile: &ScooterProfile) {}
    fn update(&mut self, _state: &FlashState) {}
    fn finish(&mut self, _succeeded: bool) {}
}
