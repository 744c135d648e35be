//! Slot byte channel abstraction
//!
//! Every slot has its own point-to-point serial link to the module plugged
//! into it. Reception happens in a producer context owned by the
//! implementation (interrupt or PIO FIFO drain) which hands bytes to the
//! core one at a time; this trait only covers the host-driven half.

/// Full-duplex byte transport bound to one slot
pub trait ByteChannel {
    /// Error type for transmit operations
    type Error;

    /// Bind the transport to the slot pins and start receiving
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Release the slot pins so line sensing can resume
    fn close(&mut self);

    /// Whether the channel is currently bound
    fn is_open(&self) -> bool;

    /// Write data to the module
    ///
    /// Blocks until all data has been queued for transmission or an error occurs.
    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), Self::Error>;
}
