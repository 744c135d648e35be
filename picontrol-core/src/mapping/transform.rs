//! Rotation flipping and 0-255 normalization of parameter values

use picontrol_protocol::{Capabilities, ParameterValue, ValueRange};

use crate::port::Orientation;

/// Whether values of a module should be mirrored
///
/// Only rotation-aware modules whose effective orientation is upside down
/// are mirrored.
pub fn should_flip(capabilities: Capabilities, effective: Orientation) -> bool {
    capabilities.rotation_aware() && effective == Orientation::Down
}

/// Mirror a numeric value about the midpoint of its range
///
/// Bool and LED values, and values without a matching range, pass through.
pub fn flip(value: ParameterValue, range: Option<&ValueRange>) -> ParameterValue {
    match (value, range) {
        (ParameterValue::Int32(v), Some(ValueRange::Int32 { min, max })) => {
            let mirrored = *min as i64 + *max as i64 - v as i64;
            ParameterValue::Int32(mirrored.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
        }
        (ParameterValue::Float32(v), Some(ValueRange::Float32 { min, max })) => {
            ParameterValue::Float32(min + max - v)
        }
        (other, _) => other,
    }
}

/// Scale a value onto 0..=255 using its declared range
pub fn normalize(value: &ParameterValue, range: Option<&ValueRange>) -> u8 {
    match (value, range) {
        (ParameterValue::Int32(v), Some(ValueRange::Int32 { min, max })) => {
            if max <= min {
                return 0;
            }
            let v = (*v).clamp(*min, *max) as i64;
            ((v - *min as i64) * 255 / (*max as i64 - *min as i64)) as u8
        }
        (ParameterValue::Float32(v), Some(ValueRange::Float32 { min, max })) => {
            // Also rejects NaN bounds
            if !(max > min) || v.is_nan() {
                return 0;
            }
            let v = v.clamp(*min, *max);
            ((v - min) * 255.0 / (max - min)) as u8
        }
        (ParameterValue::Int32(v), _) => (*v).clamp(0, 255) as u8,
        (ParameterValue::Float32(v), _) => v.clamp(0.0, 255.0) as u8,
        (ParameterValue::Bool(on), _) => {
            if *on {
                255
            } else {
                0
            }
        }
        (ParameterValue::Led(led), _) => {
            if led.status != 0 {
                255
            } else {
                0
            }
        }
    }
}
