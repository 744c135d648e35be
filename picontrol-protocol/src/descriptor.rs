//! Module descriptor decoding
//!
//! A module answers `GetProperties` with its identity, capabilities and
//! parameter table. Layout (after the echoed request id):
//!
//! ```text
//! protocol(1) type(1) name(32) manufacturer(32) fw_version(16)
//! compatible_host(1) capabilities(1) size_row(1) size_col(1)
//! loc_row(1) loc_col(1) parameter_count(1) parameters(47 each)
//! ```

use heapless::{String, Vec};

use crate::frame::{FrameError, MAX_PAYLOAD_SIZE};
use crate::value::{DataType, ParameterValue};

/// Maximum parameters a module may declare
pub const MAX_PARAMETERS: usize = 32;

/// Maximum characters kept from name fields
pub const MAX_NAME_LEN: usize = 31;

/// Maximum characters kept from the firmware version field
pub const MAX_VERSION_LEN: usize = 15;

const NAME_FIELD: usize = 32;
const VERSION_FIELD: usize = 16;

/// Bytes before the first parameter record, request id included
pub const DESCRIPTOR_HEADER_SIZE: usize = 1 + 1 + 1 + NAME_FIELD + NAME_FIELD + VERSION_FIELD + 1 + 1 + 4 + 1;

/// Size of one parameter record
pub const PARAMETER_RECORD_SIZE: usize = 1 + NAME_FIELD + 1 + 1 + 4 + 4 + 4;

/// Parameter access bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Access(pub u8);

impl Access {
    pub const READ: u8 = 1 << 0;
    pub const WRITE: u8 = 1 << 1;

    pub const fn readable(self) -> bool {
        self.0 & Self::READ != 0
    }

    pub const fn writable(self) -> bool {
        self.0 & Self::WRITE != 0
    }
}

/// Module capability bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities(pub u8);

impl Capabilities {
    /// Module pushes value changes itself
    pub const AUTOUPDATE: u8 = 1 << 0;
    /// Module values mirror when the module is rotated 180 degrees
    pub const ROTATION_AWARE: u8 = 1 << 1;

    pub const fn autoupdate(self) -> bool {
        self.0 & Self::AUTOUPDATE != 0
    }

    pub const fn rotation_aware(self) -> bool {
        self.0 & Self::ROTATION_AWARE != 0
    }
}

/// Declared range of a numeric parameter
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueRange {
    Int32 { min: i32, max: i32 },
    Float32 { min: f32, max: f32 },
}

impl ValueRange {
    /// Whether `value` lies inside the range
    ///
    /// Values of another type are never inside; NaN is never inside.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (ValueRange::Int32 { min, max }, ParameterValue::Int32(v)) => v >= min && v <= max,
            (ValueRange::Float32 { min, max }, ParameterValue::Float32(v)) => {
                *v >= *min && *v <= *max
            }
            _ => false,
        }
    }

    /// The range minimum as a value
    pub fn min_value(&self) -> ParameterValue {
        match self {
            ValueRange::Int32 { min, .. } => ParameterValue::Int32(*min),
            ValueRange::Float32 { min, .. } => ParameterValue::Float32(*min),
        }
    }

    /// The range maximum as a value
    pub fn max_value(&self) -> ParameterValue {
        match self {
            ValueRange::Int32 { max, .. } => ParameterValue::Int32(*max),
            ValueRange::Float32 { max, .. } => ParameterValue::Float32(*max),
        }
    }
}

/// One entry of a module's parameter table
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Parameter {
    pub id: u8,
    pub name: String<MAX_NAME_LEN>,
    pub data_type: DataType,
    pub access: Access,
    pub value: ParameterValue,
    /// Present for Int32 and Float32 only
    pub range: Option<ValueRange>,
}

impl Parameter {
    fn decode(record: &[u8]) -> Result<Self, FrameError> {
        if record.len() < PARAMETER_RECORD_SIZE {
            return Err(FrameError::Truncated);
        }
        let id = record[0];
        let name = read_str(&record[1..1 + NAME_FIELD]);
        let mut at = 1 + NAME_FIELD;
        let data_type = DataType::from_byte(record[at]).ok_or(FrameError::InvalidFrame)?;
        let access = Access(record[at + 1]);
        at += 2;
        let value = ParameterValue::decode(data_type, &record[at..at + 4])?;
        let min = &record[at + 4..at + 8];
        let max = &record[at + 8..at + 12];
        let range = match data_type {
            DataType::Int32 => Some(ValueRange::Int32 {
                min: i32::from_le_bytes([min[0], min[1], min[2], min[3]]),
                max: i32::from_le_bytes([max[0], max[1], max[2], max[3]]),
            }),
            DataType::Float32 => Some(ValueRange::Float32 {
                min: f32::from_le_bytes([min[0], min[1], min[2], min[3]]),
                max: f32::from_le_bytes([max[0], max[1], max[2], max[3]]),
            }),
            DataType::Bool | DataType::Led => None,
        };

        Ok(Self {
            id,
            name,
            data_type,
            access,
            value,
            range,
        })
    }

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.id;
        write_str(&mut out[1..1 + NAME_FIELD], &self.name);
        let mut at = 1 + NAME_FIELD;
        out[at] = self.data_type.to_byte();
        out[at + 1] = self.access.0;
        at += 2;
        out[at..at + 4].copy_from_slice(&self.value.to_bytes());
        let (min, max) = match self.range {
            Some(ValueRange::Int32 { min, max }) => (min.to_le_bytes(), max.to_le_bytes()),
            Some(ValueRange::Float32 { min, max }) => (min.to_le_bytes(), max.to_le_bytes()),
            None => ([0; 4], [0; 4]),
        };
        out[at + 4..at + 8].copy_from_slice(&min);
        out[at + 8..at + 12].copy_from_slice(&max);
    }
}

/// Identity, capabilities and parameters reported by a module
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleDescriptor {
    pub protocol: u8,
    pub module_type: u8,
    pub name: String<MAX_NAME_LEN>,
    pub manufacturer: String<MAX_NAME_LEN>,
    pub firmware_version: String<MAX_VERSION_LEN>,
    pub compatible_host_version: u8,
    pub capabilities: Capabilities,
    /// Footprint in grid cells (rows, cols)
    pub physical_size: (u8, u8),
    /// Which cell of the footprint carries the connector (row, col)
    pub port_location: (u8, u8),
    pub parameters: Vec<Parameter, MAX_PARAMETERS>,
}

impl ModuleDescriptor {
    /// Decode a `GetProperties` response payload
    ///
    /// Returns the echoed request id with the descriptor. The declared
    /// parameter count is clamped to [`MAX_PARAMETERS`] and to the number of
    /// whole records actually present.
    pub fn decode(payload: &[u8]) -> Result<(u8, Self), FrameError> {
        if payload.len() < DESCRIPTOR_HEADER_SIZE {
            return Err(FrameError::Truncated);
        }

        let request_id = payload[0];
        let protocol = payload[1];
        let module_type = payload[2];
        let mut at = 3;
        let name = read_str(&payload[at..at + NAME_FIELD]);
        at += NAME_FIELD;
        let manufacturer = read_str(&payload[at..at + NAME_FIELD]);
        at += NAME_FIELD;
        let firmware_version = read_str(&payload[at..at + VERSION_FIELD]);
        at += VERSION_FIELD;
        let compatible_host_version = payload[at];
        let capabilities = Capabilities(payload[at + 1]);
        let physical_size = (payload[at + 2], payload[at + 3]);
        let port_location = (payload[at + 4], payload[at + 5]);
        let declared = payload[at + 6] as usize;

        let available = (payload.len() - DESCRIPTOR_HEADER_SIZE) / PARAMETER_RECORD_SIZE;
        let count = declared.min(MAX_PARAMETERS).min(available);

        let mut parameters = Vec::new();
        for record in payload[DESCRIPTOR_HEADER_SIZE..]
            .chunks_exact(PARAMETER_RECORD_SIZE)
            .take(count)
        {
            parameters
                .push(Parameter::decode(record)?)
                .map_err(|_| FrameError::PayloadTooLarge)?;
        }

        Ok((
            request_id,
            Self {
                protocol,
                module_type,
                name,
                manufacturer,
                firmware_version,
                compatible_host_version,
                capabilities,
                physical_size,
                port_location,
                parameters,
            },
        ))
    }

    /// Encode as a `GetProperties` response payload, module side
    pub fn encode(&self, request_id: u8) -> Vec<u8, MAX_PAYLOAD_SIZE> {
        let len = DESCRIPTOR_HEADER_SIZE + self.parameters.len() * PARAMETER_RECORD_SIZE;
        let mut out = Vec::new();
        // At most 32 records, which always fits the payload buffer
        let _ = out.resize(len, 0);

        out[0] = request_id;
        out[1] = self.protocol;
        out[2] = self.module_type;
        let mut at = 3;
        write_str(&mut out[at..at + NAME_FIELD], &self.name);
        at += NAME_FIELD;
        write_str(&mut out[at..at + NAME_FIELD], &self.manufacturer);
        at += NAME_FIELD;
        write_str(&mut out[at..at + VERSION_FIELD], &self.firmware_version);
        at += VERSION_FIELD;
        out[at] = self.compatible_host_version;
        out[at + 1] = self.capabilities.0;
        out[at + 2] = self.physical_size.0;
        out[at + 3] = self.physical_size.1;
        out[at + 4] = self.port_location.0;
        out[at + 5] = self.port_location.1;
        out[at + 6] = self.parameters.len() as u8;

        for (param, record) in self
            .parameters
            .iter()
            .zip(out[DESCRIPTOR_HEADER_SIZE..].chunks_exact_mut(PARAMETER_RECORD_SIZE))
        {
            param.encode(record);
        }
        out
    }

    /// Look up a parameter by its declared id
    pub fn parameter(&self, id: u8) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Mutable lookup by declared id
    pub fn parameter_mut(&mut self, id: u8) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }
}

/// Read a NUL-padded string field, keeping the longest valid UTF-8 prefix
fn read_str<const N: usize>(field: &[u8]) -> String<N> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let bytes = &field[..end];
    let text = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    };

    let mut out = String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Write a string into a NUL-padded field, always leaving a terminator
fn write_str(field: &mut [u8], text: &str) {
    field.fill(0);
    let len = text.len().min(field.len().saturating_sub(1));
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fader() -> ModuleDescriptor {
        let mut parameters = Vec::new();
        parameters
            .push(Parameter {
                id: 0,
                name: String::try_from("position").unwrap(),
                data_type: DataType::Int32,
                access: Access(Access::READ),
                value: ParameterValue::Int32(512),
                range: Some(ValueRange::Int32 { min: 0, max: 1023 }),
            })
            .unwrap();
        parameters
            .push(Parameter {
                id: 1,
                name: String::try_from("touch").unwrap(),
                data_type: DataType::Bool,
                access: Access(Access::READ | Access::WRITE),
                value: ParameterValue::Bool(false),
                range: None,
            })
            .unwrap();

        ModuleDescriptor {
            protocol: 1,
            module_type: 2,
            name: String::try_from("Fader").unwrap(),
            manufacturer: String::try_from("PiControl").unwrap(),
            firmware_version: String::try_from("1.2.0").unwrap(),
            compatible_host_version: 1,
            capabilities: Capabilities(Capabilities::ROTATION_AWARE),
            physical_size: (1, 1),
            port_location: (0, 0),
            parameters,
        }
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(DESCRIPTOR_HEADER_SIZE, 90);
        assert_eq!(PARAMETER_RECORD_SIZE, 47);
        assert!(DESCRIPTOR_HEADER_SIZE + MAX_PARAMETERS * PARAMETER_RECORD_SIZE <= MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let module = fader();
        let payload = module.encode(7);
        let (request_id, decoded) = ModuleDescriptor::decode(&payload).unwrap();
        assert_eq!(request_id, 7);
        assert_eq!(decoded, module);
        assert!(decoded.capabilities.rotation_aware());
        assert!(!decoded.capabilities.autoupdate());
    }

    #[test]
    fn test_short_header_rejected() {
        let payload = fader().encode(0);
        assert_eq!(
            ModuleDescriptor::decode(&payload[..DESCRIPTOR_HEADER_SIZE - 1]),
            Err(FrameError::Truncated)
        );
    }

    #[test]
    fn test_parameter_count_clamped_to_payload() {
        let payload = fader().encode(0);
        // Cut the second record in half
        let cut = DESCRIPTOR_HEADER_SIZE + PARAMETER_RECORD_SIZE + 10;
        let (_, decoded) = ModuleDescriptor::decode(&payload[..cut]).unwrap();
        assert_eq!(decoded.parameters.len(), 1);
        assert_eq!(decoded.parameters[0].name.as_str(), "position");
    }

    #[test]
    fn test_parameter_count_clamped_to_maximum() {
        let mut payload = fader().encode(0);
        payload[DESCRIPTOR_HEADER_SIZE - 1] = 200;
        let (_, decoded) = ModuleDescriptor::decode(&payload).unwrap();
        assert_eq!(decoded.parameters.len(), 2);
    }

    #[test]
    fn test_unknown_data_type_rejected() {
        let mut payload = fader().encode(0);
        payload[DESCRIPTOR_HEADER_SIZE + 1 + 32] = 9;
        assert_eq!(
            ModuleDescriptor::decode(&payload),
            Err(FrameError::InvalidFrame)
        );
    }

    #[test]
    fn test_read_str_stops_at_nul_and_bad_utf8() {
        let s: String<31> = read_str(b"abc\0def");
        assert_eq!(s.as_str(), "abc");
        let s: String<31> = read_str(&[b'o', b'k', 0xFF, b'x']);
        assert_eq!(s.as_str(), "ok");
    }

    #[test]
    fn test_range_contains() {
        let range = ValueRange::Int32 { min: 0, max: 10 };
        assert!(range.contains(&ParameterValue::Int32(10)));
        assert!(!range.contains(&ParameterValue::Int32(-1)));
        let range = ValueRange::Float32 { min: 0.0, max: 1.0 };
        assert!(!range.contains(&ParameterValue::Float32(f32::NAN)));
        assert!(range.contains(&ParameterValue::Float32(0.5)));
    }
}
