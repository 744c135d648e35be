//! Board and host abstraction traits
//!
//! These traits define the interface between the scan loop and the
//! board-specific slot wiring, USB output and host console.

pub mod backplane;
pub mod host;
pub mod output;

pub use backplane::Backplane;
pub use host::HostLink;
pub use output::OutputSink;
