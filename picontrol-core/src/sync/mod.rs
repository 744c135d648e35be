//! Parameter synchronization
//!
//! Delivery mode selection, polling, write confirmation, range checking of
//! received values and throttling of host notifications. The scan loop owns
//! one [`SlotSync`] per slot and a single [`NotifyThrottle`].

pub mod engine;
pub mod throttle;

pub use engine::{DeliveryMode, Intake, SlotSync, MAX_CONFIRMATIONS};
pub use throttle::{NotifyThrottle, PendingEvent};
