//! Module link plumbing between the receive context and the scan loop

pub mod liveness;
pub mod queue;
pub mod receiver;

pub use liveness::SlotLiveness;
pub use queue::{FrameQueue, SlotFrame, FRAME_QUEUE_DEPTH};
pub use receiver::SlotReceiver;
