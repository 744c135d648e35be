//! Typed parameter values
//!
//! The wire never says which variant a value is; the owning parameter's
//! declared [`DataType`] decides how the bytes are read.

use core::fmt;

use crate::frame::FrameError;

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    Int32 = 0,
    Float32 = 1,
    Bool = 2,
    Led = 3,
}

impl DataType {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DataType::Int32),
            1 => Some(DataType::Float32),
            2 => Some(DataType::Bool),
            3 => Some(DataType::Led),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Minimum number of value bytes a response must carry
    pub const fn wire_size(self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::Int32 | DataType::Float32 | DataType::Led => 4,
        }
    }
}

/// Color and status of an LED parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedValue {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub status: u8,
}

/// A parameter value; the variant always matches the declared [`DataType`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParameterValue {
    Int32(i32),
    Float32(f32),
    Bool(bool),
    Led(LedValue),
}

impl ParameterValue {
    /// Type tag of the active variant
    pub const fn data_type(&self) -> DataType {
        match self {
            ParameterValue::Int32(_) => DataType::Int32,
            ParameterValue::Float32(_) => DataType::Float32,
            ParameterValue::Bool(_) => DataType::Bool,
            ParameterValue::Led(_) => DataType::Led,
        }
    }

    /// Decode value bytes as `data_type`
    pub fn decode(data_type: DataType, bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < data_type.wire_size() {
            return Err(FrameError::Truncated);
        }
        let word = |b: &[u8]| [b[0], b[1], b[2], b[3]];
        Ok(match data_type {
            DataType::Int32 => ParameterValue::Int32(i32::from_le_bytes(word(bytes))),
            DataType::Float32 => ParameterValue::Float32(f32::from_le_bytes(word(bytes))),
            DataType::Bool => ParameterValue::Bool(bytes[0] != 0),
            DataType::Led => ParameterValue::Led(LedValue {
                r: bytes[0],
                g: bytes[1],
                b: bytes[2],
                status: bytes[3],
            }),
        })
    }

    /// The 4-byte little-endian wire form
    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            ParameterValue::Int32(v) => v.to_le_bytes(),
            ParameterValue::Float32(v) => v.to_le_bytes(),
            ParameterValue::Bool(v) => [*v as u8, 0, 0, 0],
            ParameterValue::Led(led) => [led.r, led.g, led.b, led.status],
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int32(v) => write!(f, "{}", v),
            ParameterValue::Float32(v) => write!(f, "{:.6}", v),
            ParameterValue::Bool(v) => write!(f, "{}", *v as u8),
            ParameterValue::Led(led) => write!(f, "{},{},{},{}", led.r, led.g, led.b, led.status),
        }
    }
}
