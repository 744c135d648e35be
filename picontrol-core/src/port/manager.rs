//! Per-slot lifecycle bookkeeping
//!
//! One [`PortState`] exists for every grid cell for the lifetime of the
//! hub. Module identity is transient: the descriptor is stored when the
//! handshake completes and dropped on removal.

use picontrol_hal::{ActiveLine, LineLevels};
use picontrol_protocol::ModuleDescriptor;

use super::events::SlotEvent;
use super::grid::{Orientation, SlotId, SLOT_COUNT};
use super::machine::SlotState;
use crate::config::HubSettings;
use crate::scheduler::{Scheduler, TimerId};

/// Lifecycle state of one grid cell
#[derive(Debug, Clone)]
pub struct PortState {
    slot: SlotId,
    state: SlotState,
    orientation: Orientation,
    rotated_180: bool,
    module: Option<ModuleDescriptor>,
    timers: Scheduler,
    /// Line seen active on the previous detection sample
    pending_line: Option<ActiveLine>,
    properties_attempts: u8,
}

impl PortState {
    fn new(slot: SlotId, settings: &HubSettings) -> Self {
        Self {
            slot,
            state: SlotState::Empty,
            orientation: Orientation::Up,
            rotated_180: false,
            module: None,
            timers: Scheduler::new(settings),
            pending_line: None,
            properties_attempts: 0,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state.is_configured()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    pub fn module(&self) -> Option<&ModuleDescriptor> {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> Option<&mut ModuleDescriptor> {
        self.module.as_mut()
    }

    /// Orientation sensed at detection
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn rotated_180(&self) -> bool {
        self.rotated_180
    }

    pub fn set_rotated_180(&mut self, rotated: bool) {
        self.rotated_180 = rotated;
    }

    pub fn effective_orientation(&self) -> Orientation {
        self.orientation.effective(self.rotated_180)
    }

    /// Whether values of the current module are mirrored
    pub fn flips_values(&self) -> bool {
        self.module.as_ref().is_some_and(|m| {
            crate::mapping::transform::should_flip(m.capabilities, self.effective_orientation())
        })
    }

    pub fn properties_attempts(&self) -> u8 {
        self.properties_attempts
    }

    pub fn timers_mut(&mut self) -> &mut Scheduler {
        &mut self.timers
    }
}

/// Owner of every slot's lifecycle state
#[derive(Debug, Clone)]
pub struct PortManager {
    ports: [PortState; SLOT_COUNT],
    max_properties_attempts: u8,
}

impl PortManager {
    pub fn new(settings: &HubSettings) -> Self {
        Self {
            ports: core::array::from_fn(|i| PortState::new(SlotId::wrapping(i), settings)),
            max_properties_attempts: settings.properties_max_attempts,
        }
    }

    pub fn get(&self, slot: SlotId) -> &PortState {
        &self.ports[slot.index()]
    }

    pub fn get_mut(&mut self, slot: SlotId) -> &mut PortState {
        &mut self.ports[slot.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortState> {
        self.ports.iter()
    }

    /// Take one detection sample of an empty slot
    ///
    /// The same single active line must be seen on two samples at least
    /// one debounce interval apart. Returns `true` when the slot moves to
    /// `Detected`.
    pub fn sense(&mut self, slot: SlotId, lines: LineLevels, now_ms: u32) -> bool {
        let port = self.get_mut(slot);
        if port.state != SlotState::Empty || !slot.is_populated() {
            return false;
        }
        if !port.timers.fire(TimerId::Detect, now_ms) {
            return false;
        }

        match (lines.single_active(), port.pending_line) {
            (Some(line), Some(previous)) if line == previous => {
                port.pending_line = None;
                port.orientation = Orientation::from_active_line(line);
                port.state = port.state.transition(SlotEvent::LineDetected);
                info!(
                    "slot {},{} detected, orientation {}",
                    slot.row(),
                    slot.col(),
                    port.orientation.as_u8()
                );
                true
            }
            (reading, _) => {
                port.pending_line = reading;
                false
            }
        }
    }

    /// The slot transport is bound; descriptor requests may start
    pub fn transport_opened(&mut self, slot: SlotId) {
        let port = self.get_mut(slot);
        port.state = port.state.transition(SlotEvent::TransportOpened);
        port.properties_attempts = 0;
        port.timers.reset(TimerId::PropertiesRetry);
    }

    /// Request id of the next `GetProperties` attempt, if one is due
    ///
    /// After the last attempt the slot stays in `AwaitingProperties` until
    /// a late answer arrives or it is removed.
    pub fn next_properties_request(&mut self, slot: SlotId, now_ms: u32) -> Option<u8> {
        let max_attempts = self.max_properties_attempts;
        let port = self.get_mut(slot);
        if port.state != SlotState::AwaitingProperties || port.properties_attempts >= max_attempts
        {
            return None;
        }
        if !port.timers.fire(TimerId::PropertiesRetry, now_ms) {
            return None;
        }
        port.properties_attempts += 1;
        Some(port.properties_attempts)
    }

    /// Store a module descriptor
    ///
    /// Only a slot awaiting properties accepts one; duplicates arriving
    /// after the handshake are ignored. Returns `true` on the transition to
    /// `Ready`.
    pub fn accept_descriptor(
        &mut self,
        slot: SlotId,
        descriptor: ModuleDescriptor,
        now_ms: u32,
    ) -> bool {
        let port = self.get_mut(slot);
        if port.state != SlotState::AwaitingProperties {
            return false;
        }
        info!(
            "slot {},{} ready: {} parameters",
            slot.row(),
            slot.col(),
            descriptor.parameters.len()
        );
        port.module = Some(descriptor);
        port.state = port.state.transition(SlotEvent::PropertiesReceived);
        port.timers.rearm(TimerId::Ping, now_ms);
        port.timers.reset(TimerId::Poll);
        true
    }

    /// Whether a keep-alive ping should be sent now
    pub fn ping_due(&mut self, slot: SlotId, now_ms: u32) -> bool {
        let port = self.get_mut(slot);
        port.is_ready() && port.timers.fire(TimerId::Ping, now_ms)
    }

    /// Return the slot to `Empty`
    ///
    /// Returns whether a module descriptor was held.
    pub fn detach(&mut self, slot: SlotId) -> bool {
        let port = self.get_mut(slot);
        let had_module = port.module.take().is_some();
        port.state = port.state.transition(SlotEvent::Removed);
        port.timers.reset_all();
        port.pending_line = None;
        port.properties_attempts = 0;
        info!("slot {},{} removed", slot.row(), slot.col());
        had_module
    }
}
