//! Output of mapped actions

use crate::mapping::OutputAction;

/// Receiver of MIDI and keyboard actions, typically the USB stack
pub trait OutputSink {
    /// Queue an action for the host
    ///
    /// Returns `false` if the action was dropped.
    fn send(&mut self, action: OutputAction) -> bool;
}
