//! Line-oriented host console output

use core::fmt::{self, Write};

use crate::host::HubEvent;

/// Text channel to the host: console replies, listings and events
pub trait HostLink: Write {
    /// Write one `event ...` line
    fn event(&mut self, event: &HubEvent) -> fmt::Result {
        writeln!(self, "{}", event)
    }
}
