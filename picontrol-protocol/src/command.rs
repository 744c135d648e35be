//! Command identifiers and typed payloads
//!
//! The hub sends requests to modules and modules answer with a single
//! `Response` command that names the request it answers. Modules in push
//! mode also send unsolicited `GetParameter`-shaped responses.

use heapless::Vec;

use crate::frame::{Frame, FrameError, MAX_PAYLOAD_SIZE};
use crate::mapping::{encode_records, MappingRecord, MAX_MAPPING_RECORDS};
use crate::value::ParameterValue;

// Command IDs
pub const CMD_PING: u8 = 0x00;
pub const CMD_GET_PROPERTIES: u8 = 0x01;
pub const CMD_SET_PARAMETER: u8 = 0x02;
pub const CMD_GET_PARAMETER: u8 = 0x03;
pub const CMD_RESET_MODULE: u8 = 0x04;
pub const CMD_SET_AUTOUPDATE: u8 = 0x05;
pub const CMD_GET_MAPPINGS: u8 = 0x06;
pub const CMD_SET_MAPPINGS: u8 = 0x07;
pub const CMD_SET_CALIBRATION: u8 = 0x08;
pub const CMD_RESPONSE: u8 = 0x80;

/// Magic byte carried by `Ping`
pub const PING_MAGIC: u8 = 0x55;

/// Magic byte carried by `ResetModule`
pub const RESET_MAGIC: u8 = 0xA5;

/// Size of the status/inResponseTo/length prefix of a response payload
pub const RESPONSE_HEADER_SIZE: usize = 4;

/// Command identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandId {
    Ping,
    GetProperties,
    SetParameter,
    GetParameter,
    ResetModule,
    SetAutoupdate,
    GetMappings,
    SetMappings,
    SetCalibration,
    Response,
    /// Any value this side does not implement
    Unsupported(u8),
}

impl CommandId {
    /// Decode a command byte; never fails
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            CMD_PING => CommandId::Ping,
            CMD_GET_PROPERTIES => CommandId::GetProperties,
            CMD_SET_PARAMETER => CommandId::SetParameter,
            CMD_GET_PARAMETER => CommandId::GetParameter,
            CMD_RESET_MODULE => CommandId::ResetModule,
            CMD_SET_AUTOUPDATE => CommandId::SetAutoupdate,
            CMD_GET_MAPPINGS => CommandId::GetMappings,
            CMD_SET_MAPPINGS => CommandId::SetMappings,
            CMD_SET_CALIBRATION => CommandId::SetCalibration,
            CMD_RESPONSE => CommandId::Response,
            other => CommandId::Unsupported(other),
        }
    }

    /// Wire byte for this command
    pub const fn to_byte(self) -> u8 {
        match self {
            CommandId::Ping => CMD_PING,
            CommandId::GetProperties => CMD_GET_PROPERTIES,
            CommandId::SetParameter => CMD_SET_PARAMETER,
            CommandId::GetParameter => CMD_GET_PARAMETER,
            CommandId::ResetModule => CMD_RESET_MODULE,
            CommandId::SetAutoupdate => CMD_SET_AUTOUPDATE,
            CommandId::GetMappings => CMD_GET_MAPPINGS,
            CommandId::SetMappings => CMD_SET_MAPPINGS,
            CommandId::SetCalibration => CMD_SET_CALIBRATION,
            CommandId::Response => CMD_RESPONSE,
            CommandId::Unsupported(byte) => byte,
        }
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok = 0,
    Error = 1,
    Unsupported = 2,
}

impl Status {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            2 => Some(Status::Unsupported),
            _ => None,
        }
    }
}

/// Requests the hub sends to a module
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Provoke traffic from an idle module
    Ping,
    /// Ask for the module descriptor; `request_id` counts attempts
    GetProperties { request_id: u8 },
    /// Write a parameter value
    SetParameter { param_id: u8, value: ParameterValue },
    /// Read a parameter value
    GetParameter { param_id: u8 },
    /// Reboot the module
    ResetModule,
    /// Enable or disable push mode; interval 0 means on change only
    SetAutoupdate { enable: bool, interval_ms: u16 },
    /// Read module-resident mappings
    GetMappings,
    /// Replace module-resident mappings
    SetMappings {
        records: Vec<MappingRecord, MAX_MAPPING_RECORDS>,
    },
    /// Override the calibrated range of an integer parameter
    SetCalibration { param_id: u8, min: i32, max: i32 },
}

impl Request {
    /// Command identifier of this request
    pub fn command(&self) -> CommandId {
        match self {
            Request::Ping => CommandId::Ping,
            Request::GetProperties { .. } => CommandId::GetProperties,
            Request::SetParameter { .. } => CommandId::SetParameter,
            Request::GetParameter { .. } => CommandId::GetParameter,
            Request::ResetModule => CommandId::ResetModule,
            Request::SetAutoupdate { .. } => CommandId::SetAutoupdate,
            Request::GetMappings => CommandId::GetMappings,
            Request::SetMappings { .. } => CommandId::SetMappings,
            Request::SetCalibration { .. } => CommandId::SetCalibration,
        }
    }

    /// Encode this request into a frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let command = self.command();
        match self {
            Request::Ping => Frame::new(command, &[PING_MAGIC]),
            Request::GetProperties { request_id } => Frame::new(command, &[*request_id]),
            Request::SetParameter { param_id, value } => {
                // Payload: [pid][dt][value x4]
                let mut payload = [0u8; 6];
                payload[0] = *param_id;
                payload[1] = value.data_type().to_byte();
                payload[2..].copy_from_slice(&value.to_bytes());
                Frame::new(command, &payload)
            }
            Request::GetParameter { param_id } => Frame::new(command, &[*param_id]),
            Request::ResetModule => Frame::new(command, &[RESET_MAGIC]),
            Request::SetAutoupdate {
                enable,
                interval_ms,
            } => {
                let interval = interval_ms.to_le_bytes();
                Frame::new(command, &[*enable as u8, interval[0], interval[1]])
            }
            Request::GetMappings => Ok(Frame::empty(command)),
            Request::SetMappings { records } => {
                let payload = encode_records(records)?;
                Frame::new(command, &payload)
            }
            Request::SetCalibration { param_id, min, max } => {
                // Payload: [pid][min i32][max i32]
                let mut payload = [0u8; 9];
                payload[0] = *param_id;
                payload[1..5].copy_from_slice(&min.to_le_bytes());
                payload[5..9].copy_from_slice(&max.to_le_bytes());
                Frame::new(command, &payload)
            }
        }
    }
}

/// A decoded `Response` payload borrowing from its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'a> {
    pub status: Status,
    pub in_response_to: CommandId,
    pub payload: &'a [u8],
}

impl<'a> Response<'a> {
    /// Parse the payload of a `Response` frame
    ///
    /// Fails on frames of another command, unknown status bytes and
    /// declared lengths that run past the frame.
    pub fn from_frame(frame: &'a Frame) -> Result<Self, FrameError> {
        if frame.command != CommandId::Response {
            return Err(FrameError::InvalidFrame);
        }
        let bytes = &frame.payload[..];
        if bytes.len() < RESPONSE_HEADER_SIZE {
            return Err(FrameError::Truncated);
        }
        let status = Status::from_byte(bytes[0]).ok_or(FrameError::InvalidFrame)?;
        let in_response_to = CommandId::from_byte(bytes[1]);
        let declared = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let payload = bytes
            .get(RESPONSE_HEADER_SIZE..RESPONSE_HEADER_SIZE + declared)
            .ok_or(FrameError::Truncated)?;

        Ok(Self {
            status,
            in_response_to,
            payload,
        })
    }

    /// Encode this response into a frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE - RESPONSE_HEADER_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }
        let mut payload = Vec::<u8, MAX_PAYLOAD_SIZE>::new();
        let len = (self.payload.len() as u16).to_le_bytes();
        payload
            .extend_from_slice(&[self.status as u8, self.in_response_to.to_byte(), len[0], len[1]])
            .map_err(|_| FrameError::PayloadTooLarge)?;
        payload
            .extend_from_slice(self.payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Frame::new(CommandId::Response, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::LedValue;

    #[test]
    fn test_command_byte_roundtrip() {
        for byte in 0..=u8::MAX {
            assert_eq!(CommandId::from_byte(byte).to_byte(), byte);
        }
        assert_eq!(CommandId::from_byte(0x80), CommandId::Response);
        assert_eq!(CommandId::from_byte(0x09), CommandId::Unsupported(0x09));
    }

    #[test]
    fn test_ping_payload() {
        let frame = Request::Ping.to_frame().unwrap();
        assert_eq!(frame.command, CommandId::Ping);
        assert_eq!(&frame.payload[..], &[PING_MAGIC]);
    }

    #[test]
    fn test_set_parameter_payload() {
        let frame = Request::SetParameter {
            param_id: 3,
            value: ParameterValue::Int32(-2),
        }
        .to_frame()
        .unwrap();
        assert_eq!(&frame.payload[..], &[3, 0, 0xFE, 0xFF, 0xFF, 0xFF]);

        let frame = Request::SetParameter {
            param_id: 1,
            value: ParameterValue::Led(LedValue {
                r: 1,
                g: 2,
                b: 3,
                status: 1,
            }),
        }
        .to_frame()
        .unwrap();
        assert_eq!(&frame.payload[..], &[1, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn test_set_autoupdate_payload() {
        let frame = Request::SetAutoupdate {
            enable: true,
            interval_ms: 0x0102,
        }
        .to_frame()
        .unwrap();
        assert_eq!(frame.command, CommandId::SetAutoupdate);
        assert_eq!(&frame.payload[..], &[1, 0x02, 0x01]);
    }

    #[test]
    fn test_set_calibration_payload() {
        let frame = Request::SetCalibration {
            param_id: 4,
            min: 10,
            max: 1000,
        }
        .to_frame()
        .unwrap();
        assert_eq!(frame.payload[0], 4);
        assert_eq!(i32::from_le_bytes(frame.payload[1..5].try_into().unwrap()), 10);
        assert_eq!(i32::from_le_bytes(frame.payload[5..9].try_into().unwrap()), 1000);
    }

    #[test]
    fn test_reset_payload() {
        let frame = Request::ResetModule.to_frame().unwrap();
        assert_eq!(&frame.payload[..], &[RESET_MAGIC]);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = Response {
            status: Status::Ok,
            in_response_to: CommandId::GetParameter,
            payload: &[2, 0x10, 0, 0, 0],
        };
        let frame = response.to_frame().unwrap();
        assert_eq!(&frame.payload[..4], &[0, CMD_GET_PARAMETER, 5, 0]);

        let parsed = Response::from_frame(&frame).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response_declared_length_past_frame() {
        let frame = Frame::new(CommandId::Response, &[0, CMD_GET_PARAMETER, 9, 0, 1]).unwrap();
        assert_eq!(Response::from_frame(&frame), Err(FrameError::Truncated));
    }

    #[test]
    fn test_response_unknown_status() {
        let frame = Frame::new(CommandId::Response, &[7, CMD_PING, 0, 0]).unwrap();
        assert_eq!(Response::from_frame(&frame), Err(FrameError::InvalidFrame));
    }

    #[test]
    fn test_response_rejects_other_commands() {
        let frame = Frame::new(CommandId::Ping, &[PING_MAGIC]).unwrap();
        assert_eq!(Response::from_frame(&frame), Err(FrameError::InvalidFrame));
    }
}
