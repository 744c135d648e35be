//! `modules list` output

use core::fmt::{self, Write};

use picontrol_protocol::{DataType, Parameter};

use crate::port::{PortManager, SlotId, GRID_COLS, GRID_ROWS};

/// Write the port and module listing, header to sentinel
///
/// Absent cells are skipped. Module and parameter lines follow the port
/// line of every slot holding a module.
pub fn write_listing<W: Write>(out: &mut W, ports: &PortManager) -> fmt::Result {
    writeln!(out, "ok ports rows={} cols={}", GRID_ROWS, GRID_COLS)?;

    for slot in SlotId::all().filter(|s| s.is_populated()) {
        let port = ports.get(slot);
        let (row, col) = (slot.row(), slot.col());
        writeln!(
            out,
            "port r={} c={} configured={} hasModule={} orientation={}",
            row,
            col,
            port.is_configured() as u8,
            port.has_module() as u8,
            port.effective_orientation().as_u8()
        )?;

        let Some(module) = port.module() else {
            continue;
        };
        writeln!(
            out,
            "module r={} c={} type={} caps={} name=\"{}\" mfg=\"{}\" fw=\"{}\" params={} szr={} szc={} plr={} plc={}",
            row,
            col,
            module.module_type,
            module.capabilities.0,
            module.name,
            module.manufacturer,
            module.firmware_version,
            module.parameters.len(),
            module.physical_size.0,
            module.physical_size.1,
            module.port_location.0,
            module.port_location.1
        )?;

        for param in &module.parameters {
            write_parameter(out, slot, param)?;
        }
    }

    writeln!(out, "ok modules done")
}

fn write_parameter<W: Write>(out: &mut W, slot: SlotId, param: &Parameter) -> fmt::Result {
    write!(
        out,
        "param r={} c={} pid={} dt={} access={} name=\"{}\"",
        slot.row(),
        slot.col(),
        param.id,
        param.data_type.to_byte(),
        param.access.0,
        param.name
    )?;
    match (param.data_type, param.range) {
        (DataType::Bool, _) => write!(out, " min=0 max=1")?,
        (_, Some(range)) => write!(out, " min={} max={}", range.min_value(), range.max_value())?,
        _ => {}
    }
    writeln!(out, " value={}", param.value)
}
