//! Slot line sensing
//!
//! While a slot is empty both of its lines are pulled to the inactive level.
//! A module drives exactly one of them to the active level on insertion,
//! which line depends on how it was plugged in.

/// Digital input pin
///
/// Implementations should handle the actual hardware register reading
/// for the specific chip.
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }

    /// Sample the pin as a [`Level`]
    fn level(&self) -> Level {
        if self.is_high() {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Logic level of a sensed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// High is both the detection-active level and the serial idle level
    pub const fn is_active(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Which of the two slot lines is being driven by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLine {
    /// Host transmit line
    Tx,
    /// Host receive line
    Rx,
}

/// Snapshot of both slot lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineLevels {
    /// Host transmit line
    pub tx: Level,
    /// Host receive line
    pub rx: Level,
}

impl LineLevels {
    /// Both lines at the inactive level
    pub const IDLE_EMPTY: Self = Self {
        tx: Level::Low,
        rx: Level::Low,
    };

    /// Sample both pins
    pub fn sample<T: InputPin, R: InputPin>(tx: &T, rx: &R) -> Self {
        Self {
            tx: tx.level(),
            rx: rx.level(),
        }
    }

    /// The single active line, or `None` when both or neither are active
    pub fn single_active(&self) -> Option<ActiveLine> {
        match (self.tx.is_active(), self.rx.is_active()) {
            (true, false) => Some(ActiveLine::Tx),
            (false, true) => Some(ActiveLine::Rx),
            _ => None,
        }
    }

    /// Receive line resting at the serial idle level
    pub fn rx_idle(&self) -> bool {
        self.rx.is_active()
    }
}
