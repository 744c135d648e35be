//! Events that drive slot state transitions

/// Lifecycle events of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotEvent {
    /// Exactly one line held active across the debounce window
    LineDetected,
    /// Transport opened, descriptor requests may start
    TransportOpened,
    /// A valid descriptor response arrived
    PropertiesReceived,
    /// Silence on both the frame stream and the receive line
    Removed,
}
