//! Line-oriented host command console
//!
//! Every command line gets exactly one reply: `ok ...` or `err <reason>`.
//! `map list` replies with a count header followed by one line per
//! mapping. Commands that touch module state are queued for the scan loop
//! and reply `ok queued`; the scan loop reports their results as events.
//!
//! ```text
//! info | version
//! map set r c pid type d1 d2     map set_curve r c pid <hex>
//! map del r c pid                map list | clear | save | load
//! autoupdate set r c 0|1 [ms]    autoupdate all 0|1 [ms]
//! rot set r c 0|1                rot all 0|1
//! modules list                   modules reset r c
//! param set r c pid dt value     calib set r c pid min max
//! ```

use core::fmt::{self, Write};

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use picontrol_hal::FlashStorage;
use picontrol_protocol::{DataType, LedValue, ParameterValue};

use super::requests::{
    AutoupdateRequest, CalibrationRequest, ModuleRequest, ParameterRequest, QueueFull,
    RotationRequest, Target,
};
use crate::config::store;
use crate::mapping::{with_mappings, Action, Curve, MappingError, MappingKey, MappingTable};
use crate::port::SlotId;
use crate::shared::HubShared;

/// Reported by `info` and `version`
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Module link protocol revision reported by `info`
pub const PROTOCOL_VERSION: u8 = 1;

/// Tokens considered per line
const MAX_ARGS: usize = 10;

/// Longest curve accepted by `map set_curve`, in bytes
const MAX_CURVE_BYTES: usize = 16;

/// Why a command was refused, rendered after `err `
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleError {
    Usage(&'static str),
    BadArgs,
    BadHex,
    EmptyCurve,
    BadPointCount,
    ShortCurve,
    Mapping(MappingError),
    QueueFull,
    SaveFailed,
    LoadFailed,
    UnknownSubcommand(&'static str),
    UnknownCommand,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Usage(usage) => write!(f, "usage: {}", usage),
            ConsoleError::BadArgs => f.write_str("bad args"),
            ConsoleError::BadHex => f.write_str("bad hex"),
            ConsoleError::EmptyCurve => f.write_str("empty"),
            ConsoleError::BadPointCount => f.write_str("bad count"),
            ConsoleError::ShortCurve => f.write_str("short data"),
            ConsoleError::Mapping(MappingError::TableFull) => f.write_str("table_full"),
            ConsoleError::Mapping(MappingError::NotFound) => f.write_str("notfound"),
            ConsoleError::Mapping(MappingError::InvalidCurve) => f.write_str("bad curve"),
            ConsoleError::Mapping(MappingError::UnknownActionType) => f.write_str("bad type"),
            ConsoleError::QueueFull => f.write_str("queue_full"),
            ConsoleError::SaveFailed => f.write_str("save_failed"),
            ConsoleError::LoadFailed => f.write_str("load_failed"),
            ConsoleError::UnknownSubcommand(group) => write!(f, "unknown {} cmd", group),
            ConsoleError::UnknownCommand => f.write_str("unknown cmd"),
        }
    }
}

impl From<MappingError> for ConsoleError {
    fn from(e: MappingError) -> Self {
        ConsoleError::Mapping(e)
    }
}

impl From<QueueFull> for ConsoleError {
    fn from(_: QueueFull) -> Self {
        ConsoleError::QueueFull
    }
}

/// Successful outcome of a command
enum Reply {
    Ok,
    Note(&'static str),
    Info,
    Version,
    Mappings(MappingTable),
}

/// Run one command line and write its reply to `out`
///
/// Blank lines produce no output.
pub async fn execute<M, F, W>(
    line: &str,
    shared: &HubShared<M>,
    storage: &mut F,
    out: &mut W,
) -> fmt::Result
where
    M: RawMutex,
    F: FlashStorage,
    W: Write,
{
    let args: Vec<&str, MAX_ARGS> = line.split_ascii_whitespace().take(MAX_ARGS).collect();
    let Some(&command) = args.first() else {
        return Ok(());
    };

    let result = match command {
        "info" => Ok(Reply::Info),
        "version" => Ok(Reply::Version),
        "map" => map_command(&args, shared, storage).await,
        "autoupdate" => autoupdate_command(&args, shared),
        "rot" => rotation_command(&args, shared),
        "modules" => modules_command(&args, shared),
        "param" => param_command(&args, shared),
        "calib" => calibration_command(&args, shared),
        _ => Err(ConsoleError::UnknownCommand),
    };

    match result {
        Ok(reply) => write_reply(out, reply),
        Err(e) => writeln!(out, "err {}", e),
    }
}

fn write_reply<W: Write>(out: &mut W, reply: Reply) -> fmt::Result {
    match reply {
        Reply::Ok => writeln!(out, "ok"),
        Reply::Note(note) => writeln!(out, "ok {}", note),
        Reply::Info => writeln!(
            out,
            "ok fw=picontrol version={} proto={}",
            FIRMWARE_VERSION, PROTOCOL_VERSION
        ),
        Reply::Version => writeln!(out, "ok {}", FIRMWARE_VERSION),
        Reply::Mappings(table) => {
            writeln!(out, "ok count={}", table.len())?;
            for mapping in table.iter() {
                let (kind, d1, d2) = mapping.action.parts();
                writeln!(
                    out,
                    "map {} {} {} {} {} {} curve={}",
                    mapping.key.slot.row(),
                    mapping.key.slot.col(),
                    mapping.key.param_id,
                    kind,
                    d1,
                    d2,
                    mapping.curve
                )?;
            }
            Ok(())
        }
    }
}

async fn map_command<M: RawMutex, F: FlashStorage>(
    args: &[&str],
    shared: &HubShared<M>,
    storage: &mut F,
) -> Result<Reply, ConsoleError> {
    match args.get(1).copied() {
        Some("set") => {
            if args.len() < 8 {
                return Err(ConsoleError::Usage("map set r c pid type d1 d2"));
            }
            let key = mapping_key(args[2], args[3], args[4])?;
            let action = Action::from_parts(byte(args[5])?, byte(args[6])?, byte(args[7])?)?;
            with_mappings(&shared.mappings, |table| table.set(key, action))?;
            request_resync(shared, Target::Slot(key.slot))?;
            Ok(Reply::Ok)
        }
        Some("set_curve") => {
            if args.len() < 6 {
                return Err(ConsoleError::Usage("map set_curve r c pid hexdata"));
            }
            let key = mapping_key(args[2], args[3], args[4])?;
            let curve = parse_curve(args[5])?;
            with_mappings(&shared.mappings, |table| table.set_curve(&key, curve))?;
            request_resync(shared, Target::Slot(key.slot))?;
            Ok(Reply::Ok)
        }
        Some("del") => {
            if args.len() < 5 {
                return Err(ConsoleError::Usage("map del r c pid"));
            }
            let key = mapping_key(args[2], args[3], args[4])?;
            let existed = with_mappings(&shared.mappings, |table| table.remove(&key));
            request_resync(shared, Target::Slot(key.slot))?;
            Ok(Reply::Note(if existed { "deleted" } else { "notfound" }))
        }
        Some("list") => Ok(Reply::Mappings(with_mappings(&shared.mappings, |table| {
            table.clone()
        }))),
        Some("clear") => {
            with_mappings(&shared.mappings, |table| table.clear());
            request_resync(shared, Target::All)?;
            Ok(Reply::Ok)
        }
        Some("save") => {
            // Snapshot so the lock is not held across flash access
            let table = with_mappings(&shared.mappings, |table| table.clone());
            store::save_mappings(storage, &table)
                .await
                .map_err(|_| ConsoleError::SaveFailed)?;
            Ok(Reply::Note("saved"))
        }
        Some("load") => {
            let loaded = store::load_mappings(storage)
                .await
                .map_err(|_| ConsoleError::LoadFailed)?;
            with_mappings(&shared.mappings, |table| *table = loaded);
            request_resync(shared, Target::All)?;
            Ok(Reply::Note("loaded"))
        }
        _ => Err(ConsoleError::UnknownSubcommand("map")),
    }
}

fn autoupdate_command<M: RawMutex>(
    args: &[&str],
    shared: &HubShared<M>,
) -> Result<Reply, ConsoleError> {
    let (target, rest) = match args.get(1).copied() {
        Some("set") => {
            if args.len() < 5 {
                return Err(ConsoleError::Usage("autoupdate set r c 0|1 [intervalMs]"));
            }
            (Target::Slot(slot(args[2], args[3])?), &args[4..])
        }
        Some("all") => {
            if args.len() < 3 {
                return Err(ConsoleError::Usage("autoupdate all 0|1 [intervalMs]"));
            }
            (Target::All, &args[2..])
        }
        _ => return Err(ConsoleError::UnknownSubcommand("autoupdate")),
    };

    let enable = flag(rest[0])?;
    let interval_ms = match rest.get(1) {
        Some(arg) => arg.parse::<u16>().map_err(|_| ConsoleError::BadArgs)?,
        None => 0,
    };
    shared.requests.autoupdate.push(AutoupdateRequest {
        target,
        enable,
        interval_ms,
    })?;
    Ok(Reply::Note("queued"))
}

fn rotation_command<M: RawMutex>(
    args: &[&str],
    shared: &HubShared<M>,
) -> Result<Reply, ConsoleError> {
    let (target, value) = match args.get(1).copied() {
        Some("set") => {
            if args.len() < 5 {
                return Err(ConsoleError::Usage("rot set r c 0|1"));
            }
            (Target::Slot(slot(args[2], args[3])?), args[4])
        }
        Some("all") => {
            if args.len() < 3 {
                return Err(ConsoleError::Usage("rot all 0|1"));
            }
            (Target::All, args[2])
        }
        _ => return Err(ConsoleError::UnknownSubcommand("rot")),
    };

    shared.requests.rotation.push(RotationRequest {
        target,
        rotated_180: flag(value)?,
    })?;
    Ok(Reply::Note("queued"))
}

fn modules_command<M: RawMutex>(
    args: &[&str],
    shared: &HubShared<M>,
) -> Result<Reply, ConsoleError> {
    const USAGE: &str = "modules list | modules reset r c";

    let request = match args.get(1).copied() {
        Some("list") => ModuleRequest::List,
        Some("reset") if args.len() >= 4 => ModuleRequest::Reset(slot(args[2], args[3])?),
        _ => return Err(ConsoleError::Usage(USAGE)),
    };
    shared.requests.modules.push(request)?;
    Ok(Reply::Note("queued"))
}

fn param_command<M: RawMutex>(
    args: &[&str],
    shared: &HubShared<M>,
) -> Result<Reply, ConsoleError> {
    const USAGE: &str = "param set r c pid datatype value";

    if args.get(1).copied() != Some("set") || args.len() < 7 {
        return Err(ConsoleError::Usage(USAGE));
    }
    let slot = slot(args[2], args[3])?;
    let param_id = byte(args[4])?;
    let data_type = DataType::from_byte(byte(args[5])?).ok_or(ConsoleError::BadArgs)?;
    let value = parse_value(data_type, args[6])?;

    shared.requests.parameters.push(ParameterRequest {
        slot,
        param_id,
        value,
    })?;
    Ok(Reply::Note("queued"))
}

fn calibration_command<M: RawMutex>(
    args: &[&str],
    shared: &HubShared<M>,
) -> Result<Reply, ConsoleError> {
    const USAGE: &str = "calib set r c pid min max";

    if args.get(1).copied() != Some("set") || args.len() < 7 {
        return Err(ConsoleError::Usage(USAGE));
    }
    let slot = slot(args[2], args[3])?;
    let param_id = byte(args[4])?;
    let min = int(args[5])?;
    let max = int(args[6])?;
    if min > max {
        return Err(ConsoleError::BadArgs);
    }

    shared.requests.calibration.push(CalibrationRequest {
        slot,
        param_id,
        min,
        max,
    })?;
    Ok(Reply::Note("queued"))
}

/// Queue a mapping resync
///
/// The table change has already been applied when this fails; the caller
/// still reports the full queue.
fn request_resync<M: RawMutex>(shared: &HubShared<M>, target: Target) -> Result<(), QueueFull> {
    shared.requests.mapping_resync.push(target).inspect_err(|_| {
        warn!("mapping resync queue full");
    })
}

fn int(arg: &str) -> Result<i32, ConsoleError> {
    arg.parse().map_err(|_| ConsoleError::BadArgs)
}

fn byte(arg: &str) -> Result<u8, ConsoleError> {
    arg.parse().map_err(|_| ConsoleError::BadArgs)
}

fn flag(arg: &str) -> Result<bool, ConsoleError> {
    Ok(byte(arg)? != 0)
}

fn slot(row: &str, col: &str) -> Result<SlotId, ConsoleError> {
    SlotId::from_signed(int(row)?, int(col)?).ok_or(ConsoleError::BadArgs)
}

fn mapping_key(row: &str, col: &str, param_id: &str) -> Result<MappingKey, ConsoleError> {
    Ok(MappingKey::new(slot(row, col)?, byte(param_id)?))
}

/// Decode `count, points, controls` from hex
fn parse_curve(hex: &str) -> Result<Curve, ConsoleError> {
    if hex.len() % 2 != 0
        || hex.len() > MAX_CURVE_BYTES * 2
        || !hex.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(ConsoleError::BadHex);
    }

    let mut bytes: Vec<u8, MAX_CURVE_BYTES> = Vec::new();
    for i in (0..hex.len()).step_by(2) {
        let value = u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ConsoleError::BadHex)?;
        bytes.push(value).map_err(|_| ConsoleError::BadHex)?;
    }

    let count = *bytes.first().ok_or(ConsoleError::EmptyCurve)? as usize;
    if !(2..=4).contains(&count) {
        return Err(ConsoleError::BadPointCount);
    }
    if bytes.len() < 1 + count * 2 + (count - 1) * 2 {
        return Err(ConsoleError::ShortCurve);
    }
    Ok(Curve::from_bytes(&bytes)?)
}

/// Parse a typed value: integers, floats, `1`/`t` for true, or `r,g,b,status`
fn parse_value(data_type: DataType, arg: &str) -> Result<ParameterValue, ConsoleError> {
    Ok(match data_type {
        DataType::Int32 => ParameterValue::Int32(int(arg)?),
        DataType::Float32 => {
            ParameterValue::Float32(arg.parse().map_err(|_| ConsoleError::BadArgs)?)
        }
        DataType::Bool => {
            ParameterValue::Bool(matches!(arg.as_bytes().first(), Some(b'1' | b't' | b'T')))
        }
        DataType::Led => {
            let mut channels = arg.split(',');
            let mut next = || channels.next().ok_or(ConsoleError::BadArgs).and_then(byte);
            let led = LedValue {
                r: next()?,
                g: next()?,
                b: next()?,
                status: next()?,
            };
            ParameterValue::Led(led)
        }
    })
}
