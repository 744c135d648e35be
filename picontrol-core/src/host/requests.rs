//! Host-to-scan-loop request queues
//!
//! The console pushes, the scan loop drains. Each concern has its own
//! bounded queue and a full queue is reported to the caller rather than
//! waited on.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use picontrol_protocol::ParameterValue;

use crate::port::SlotId;

/// Depth of every host request queue
pub const REQUEST_QUEUE_DEPTH: usize = 32;

/// A request queue had no free entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

/// One slot or every configured slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    Slot(SlotId),
    All,
}

impl Target {
    pub fn includes(&self, slot: SlotId) -> bool {
        match self {
            Target::Slot(s) => *s == slot,
            Target::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutoupdateRequest {
    pub target: Target,
    pub enable: bool,
    pub interval_ms: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotationRequest {
    pub target: Target,
    pub rotated_180: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParameterRequest {
    pub slot: SlotId,
    pub param_id: u8,
    pub value: ParameterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRequest {
    pub slot: SlotId,
    pub param_id: u8,
    pub min: i32,
    pub max: i32,
}

/// Module-level housekeeping requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleRequest {
    /// Write the port and module listing to the host
    List,
    /// Reboot the module in a slot
    Reset(SlotId),
}

/// Bounded non-blocking queue
pub struct RequestQueue<M: RawMutex, T, const N: usize = REQUEST_QUEUE_DEPTH> {
    channel: Channel<M, T, N>,
}

impl<M: RawMutex, T, const N: usize> RequestQueue<M, T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    pub fn push(&self, request: T) -> Result<(), QueueFull> {
        self.channel.try_send(request).map_err(|_| QueueFull)
    }

    pub fn pop(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<M: RawMutex, T, const N: usize> Default for RequestQueue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every host request queue
pub struct RequestQueues<M: RawMutex> {
    pub autoupdate: RequestQueue<M, AutoupdateRequest>,
    pub rotation: RequestQueue<M, RotationRequest>,
    pub parameters: RequestQueue<M, ParameterRequest>,
    pub calibration: RequestQueue<M, CalibrationRequest>,
    /// Slots whose mappings changed on the host
    pub mapping_resync: RequestQueue<M, Target>,
    pub modules: RequestQueue<M, ModuleRequest>,
}

impl<M: RawMutex> RequestQueues<M> {
    pub const fn new() -> Self {
        Self {
            autoupdate: RequestQueue::new(),
            rotation: RequestQueue::new(),
            parameters: RequestQueue::new(),
            calibration: RequestQueue::new(),
            mapping_resync: RequestQueue::new(),
            modules: RequestQueue::new(),
        }
    }
}

impl<M: RawMutex> Default for RequestQueues<M> {
    fn default() -> Self {
        Self::new()
    }
}
