//! Events reported to the host as `event ...` lines

use core::fmt;

use picontrol_protocol::ParameterValue;

use crate::port::SlotId;

/// Something the host should hear about
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubEvent {
    ModuleReady {
        slot: SlotId,
    },
    ModuleRemoved {
        slot: SlotId,
    },
    ParamChanged {
        slot: SlotId,
        param_id: u8,
        value: ParameterValue,
    },
    ParamOutOfRange {
        slot: SlotId,
        param_id: u8,
        value: ParameterValue,
        min: ParameterValue,
        max: ParameterValue,
    },
}

impl fmt::Display for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubEvent::ModuleReady { slot } => {
                write!(f, "event module_ready r={} c={}", slot.row(), slot.col())
            }
            HubEvent::ModuleRemoved { slot } => {
                write!(f, "event module_removed r={} c={}", slot.row(), slot.col())
            }
            HubEvent::ParamChanged {
                slot,
                param_id,
                value,
            } => write!(
                f,
                "event param_changed r={} c={} pid={} value={}",
                slot.row(),
                slot.col(),
                param_id,
                value
            ),
            HubEvent::ParamOutOfRange {
                slot,
                param_id,
                value,
                min,
                max,
            } => write!(
                f,
                "event param_out_of_range r={} c={} pid={} value={} min={} max={}",
                slot.row(),
                slot.col(),
                param_id,
                value,
                min,
                max
            ),
        }
    }
}
