//! Slot grid coordinates and module orientation

use core::fmt;

use picontrol_hal::ActiveLine;
use serde::{Deserialize, Serialize};

/// Grid rows
pub const GRID_ROWS: usize = 3;

/// Grid columns
pub const GRID_COLS: usize = 3;

/// Number of grid cells, populated or not
pub const SLOT_COUNT: usize = GRID_ROWS * GRID_COLS;

/// Cells with no connector fitted
const ABSENT_CELLS: [(u8, u8); 1] = [(0, 0)];

/// Grid coordinates of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u8, u8)", into = "(u8, u8)")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId {
    row: u8,
    col: u8,
}

impl SlotId {
    /// Coordinates inside the grid, or `None`
    pub const fn new(row: u8, col: u8) -> Option<Self> {
        if (row as usize) < GRID_ROWS && (col as usize) < GRID_COLS {
            Some(Self { row, col })
        } else {
            None
        }
    }

    /// Coordinates as typed by the host or stored on flash
    pub fn from_signed(row: i32, col: i32) -> Option<Self> {
        let row = u8::try_from(row).ok()?;
        let col = u8::try_from(col).ok()?;
        Self::new(row, col)
    }

    pub const fn row(self) -> u8 {
        self.row
    }

    pub const fn col(self) -> u8 {
        self.col
    }

    /// Row-major index into per-slot arrays
    pub const fn index(self) -> usize {
        self.row as usize * GRID_COLS + self.col as usize
    }

    /// Inverse of [`SlotId::index`]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < SLOT_COUNT {
            Some(Self {
                row: (index / GRID_COLS) as u8,
                col: (index % GRID_COLS) as u8,
            })
        } else {
            None
        }
    }

    /// Slot for an index taken modulo [`SLOT_COUNT`]
    pub(crate) const fn wrapping(index: usize) -> Self {
        let index = index % SLOT_COUNT;
        Self {
            row: (index / GRID_COLS) as u8,
            col: (index % GRID_COLS) as u8,
        }
    }

    /// Whether a connector is fitted at this cell
    pub fn is_populated(self) -> bool {
        !ABSENT_CELLS.contains(&(self.row, self.col))
    }

    /// Every grid cell in row-major order
    pub fn all() -> impl Iterator<Item = SlotId> {
        (0..SLOT_COUNT).filter_map(Self::from_index)
    }
}

/// Coordinates outside the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfGrid;

impl fmt::Display for OutOfGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("slot outside the grid")
    }
}

impl TryFrom<(u8, u8)> for SlotId {
    type Error = OutOfGrid;

    fn try_from((row, col): (u8, u8)) -> Result<Self, Self::Error> {
        Self::new(row, col).ok_or(OutOfGrid)
    }
}

impl From<SlotId> for (u8, u8) {
    fn from(slot: SlotId) -> Self {
        (slot.row, slot.col)
    }
}

/// Mounting orientation of a module in its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Orientation {
    #[default]
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Orientation {
    /// Orientation implied by which line the module drives on insertion
    pub const fn from_active_line(line: ActiveLine) -> Self {
        match line {
            ActiveLine::Tx => Orientation::Up,
            ActiveLine::Rx => Orientation::Right,
        }
    }

    /// Rotate by 180 degrees
    pub const fn flipped(self) -> Self {
        match self {
            Orientation::Up => Orientation::Down,
            Orientation::Right => Orientation::Left,
            Orientation::Down => Orientation::Up,
            Orientation::Left => Orientation::Right,
        }
    }

    /// Physical orientation with the persisted 180 degree override applied
    pub const fn effective(self, rotated_180: bool) -> Self {
        if rotated_180 {
            self.flipped()
        } else {
            self
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_bounds() {
        assert!(SlotId::new(2, 2).is_some());
        assert!(SlotId::new(3, 0).is_none());
        assert!(SlotId::from_signed(-1, 0).is_none());
        assert_eq!(SlotId::from_signed(1, 2), SlotId::new(1, 2));
    }

    #[test]
    fn test_index_roundtrip() {
        for slot in SlotId::all() {
            assert_eq!(SlotId::from_index(slot.index()), Some(slot));
        }
        assert_eq!(SlotId::all().count(), SLOT_COUNT);
    }

    #[test]
    fn test_corner_cell_absent() {
        let populated = SlotId::all().filter(|s| s.is_populated()).count();
        assert_eq!(populated, SLOT_COUNT - 1);
        assert!(!SlotId::new(0, 0).unwrap().is_populated());
    }

    #[test]
    fn test_deserialize_rejects_out_of_grid() {
        let mut buf = [0u8; 8];
        let bytes = postcard::to_slice(&(5u8, 0u8), &mut buf).unwrap();
        assert!(postcard::from_bytes::<SlotId>(bytes).is_err());

        let slot = SlotId::new(2, 1).unwrap();
        let bytes = postcard::to_slice(&slot, &mut buf).unwrap();
        assert_eq!(postcard::from_bytes::<SlotId>(bytes).unwrap(), slot);
    }

    #[test]
    fn test_orientation() {
        assert_eq!(Orientation::from_active_line(ActiveLine::Tx), Orientation::Up);
        assert_eq!(Orientation::from_active_line(ActiveLine::Rx), Orientation::Right);
        assert_eq!(Orientation::Up.effective(true), Orientation::Down);
        assert_eq!(Orientation::Right.effective(true), Orientation::Left);
        assert_eq!(Orientation::Down.effective(false), Orientation::Down);
    }
}
