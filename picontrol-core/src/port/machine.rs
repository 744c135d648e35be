//! Slot lifecycle state machine
//!
//! `Empty -> Detected -> AwaitingProperties -> Ready`, and back to `Empty`
//! from any other state on removal. Nothing else moves.

use super::events::SlotEvent;

/// Connection state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    /// No module sensed
    #[default]
    Empty,
    /// Module sensed, transport not yet bound
    Detected,
    /// Transport bound, descriptor requested
    AwaitingProperties,
    /// Descriptor accepted, parameters synchronized
    Ready,
}

impl SlotState {
    /// Whether the slot transport is bound
    pub fn is_configured(&self) -> bool {
        !matches!(self, SlotState::Empty)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SlotState::Ready)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: SlotEvent) -> Self {
        use SlotEvent::*;
        use SlotState::*;

        match (self, event) {
            (Empty, LineDetected) => Detected,
            (Detected, TransportOpened) => AwaitingProperties,
            (AwaitingProperties, PropertiesReceived) => Ready,

            (Detected | AwaitingProperties | Ready, Removed) => Empty,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_path() {
        let state = SlotState::Empty
            .transition(SlotEvent::LineDetected)
            .transition(SlotEvent::TransportOpened)
            .transition(SlotEvent::PropertiesReceived);
        assert_eq!(state, SlotState::Ready);
    }

    #[test]
    fn test_removal_from_any_configured_state() {
        for state in [
            SlotState::Detected,
            SlotState::AwaitingProperties,
            SlotState::Ready,
        ] {
            assert_eq!(state.transition(SlotEvent::Removed), SlotState::Empty);
        }
    }

    #[test]
    fn test_no_shortcuts() {
        assert_eq!(
            SlotState::Empty.transition(SlotEvent::PropertiesReceived),
            SlotState::Empty
        );
        assert_eq!(
            SlotState::Detected.transition(SlotEvent::PropertiesReceived),
            SlotState::Detected
        );
        assert_eq!(
            SlotState::Ready.transition(SlotEvent::LineDetected),
            SlotState::Ready
        );
        assert_eq!(SlotState::Empty.transition(SlotEvent::Removed), SlotState::Empty);
    }
}
