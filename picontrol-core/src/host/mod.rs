//! Host-facing side of the hub
//!
//! The console parses text commands and either acts on the shared mapping
//! table directly or queues a request for the scan loop. Results flow back
//! as `ok`/`err` replies and `event ...` lines.

pub mod console;
pub mod events;
pub mod requests;

pub use console::{execute, ConsoleError, FIRMWARE_VERSION, PROTOCOL_VERSION};
pub use events::HubEvent;
pub use requests::{
    AutoupdateRequest, CalibrationRequest, ModuleRequest, ParameterRequest, QueueFull,
    RequestQueue, RequestQueues, RotationRequest, Target, REQUEST_QUEUE_DEPTH,
};
