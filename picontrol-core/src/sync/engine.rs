//! Per-slot parameter delivery and value intake

use heapless::{LinearMap, Vec};
use picontrol_protocol::{ModuleDescriptor, Parameter, ParameterValue, MAX_PARAMETERS};

use crate::scheduler::elapsed;

/// Outstanding confirmation polls per slot
pub const MAX_CONFIRMATIONS: usize = 8;

/// How a slot's values reach the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeliveryMode {
    /// The hub asks for one parameter per poll interval
    #[default]
    Poll,
    /// The module reports on its own after `SetAutoupdate`
    Push,
}

/// Outcome of one received parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Intake {
    /// Too few bytes for the declared type
    Rejected,
    /// Outside the declared range; the module must be reset to `min`
    OutOfRange {
        value: ParameterValue,
        min: ParameterValue,
        max: ParameterValue,
    },
    Unchanged,
    Changed {
        value: ParameterValue,
        /// `None` on the first observation since the slot became ready
        previous: Option<ParameterValue>,
    },
}

/// Sync state of one slot, reset whenever its module changes
#[derive(Debug, Clone, Default)]
pub struct SlotSync {
    mode: DeliveryMode,
    next_poll: usize,
    confirmations: Vec<(u8, u32), MAX_CONFIRMATIONS>,
    values: LinearMap<u8, ParameterValue, MAX_PARAMETERS>,
}

impl SlotSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DeliveryMode) {
        if self.mode != mode {
            debug!("delivery mode {:?}", mode);
        }
        self.mode = mode;
    }

    /// Id of the parameter to poll next, round robin over the descriptor
    ///
    /// `None` in push mode or for a module without parameters.
    pub fn next_poll(&mut self, descriptor: &ModuleDescriptor) -> Option<u8> {
        if self.mode != DeliveryMode::Poll || descriptor.parameters.is_empty() {
            return None;
        }
        let index = self.next_poll % descriptor.parameters.len();
        self.next_poll = index + 1;
        Some(descriptor.parameters[index].id)
    }

    /// Read `param_id` back once the settle delay has passed
    ///
    /// A repeated write only moves the deadline. When every entry is taken
    /// the oldest is dropped.
    pub fn schedule_confirmation(&mut self, param_id: u8, now_ms: u32) {
        if let Some(entry) = self.confirmations.iter_mut().find(|(id, _)| *id == param_id) {
            entry.1 = now_ms;
            return;
        }
        if self.confirmations.is_full() {
            self.confirmations.remove(0);
        }
        let _ = self.confirmations.push((param_id, now_ms));
    }

    /// Take every confirmation whose settle delay has passed
    pub fn due_confirmations(&mut self, now_ms: u32, delay_ms: u32) -> Vec<u8, MAX_CONFIRMATIONS> {
        let mut due = Vec::new();
        self.confirmations.retain(|&(id, requested_ms)| {
            if elapsed(now_ms, requested_ms) >= delay_ms {
                let _ = due.push(id);
                false
            } else {
                true
            }
        });
        due
    }

    pub fn pending_confirmations(&self) -> usize {
        self.confirmations.len()
    }

    /// Last accepted value of a parameter
    pub fn value(&self, param_id: u8) -> Option<&ParameterValue> {
        self.values.get(&param_id)
    }

    /// Validate and cache the value bytes of a `GetParameter` answer
    ///
    /// The bytes are decoded as the parameter's declared type. An
    /// out-of-range value leaves the cache untouched.
    pub fn intake(&mut self, parameter: &Parameter, bytes: &[u8]) -> Intake {
        let Ok(value) = ParameterValue::decode(parameter.data_type, bytes) else {
            return Intake::Rejected;
        };

        if let Some(range) = parameter.range {
            if !range.contains(&value) {
                return Intake::OutOfRange {
                    value,
                    min: range.min_value(),
                    max: range.max_value(),
                };
            }
        }

        let previous = self.values.get(&parameter.id).copied();
        if previous == Some(value) {
            return Intake::Unchanged;
        }
        // Ids are unique within a descriptor of at most MAX_PARAMETERS entries
        let _ = self.values.insert(parameter.id, value);
        Intake::Changed { value, previous }
    }
}
