//! Bounded queue of decoded frames from every slot
//!
//! Producers run in a context that must never block, so a full queue drops
//! its oldest frame to make room for the newest.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use picontrol_protocol::Frame;

use crate::port::SlotId;

/// Default queue depth
pub const FRAME_QUEUE_DEPTH: usize = 8;

/// A decoded frame tagged with the slot it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotFrame {
    pub slot: SlotId,
    pub frame: Frame,
}

/// Multi-producer, single-consumer frame queue
pub struct FrameQueue<M: RawMutex, const N: usize = FRAME_QUEUE_DEPTH> {
    channel: Channel<M, SlotFrame, N>,
}

impl<M: RawMutex, const N: usize> FrameQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without blocking, evicting the oldest frame when full
    ///
    /// Returns `true` if a frame was dropped.
    pub fn push(&self, frame: SlotFrame) -> bool {
        let frame = match self.channel.try_send(frame) {
            Ok(()) => return false,
            Err(TrySendError::Full(frame)) => frame,
        };

        let _ = self.channel.try_receive();
        warn!(
            "frame queue full, dropped oldest (slot {},{})",
            frame.slot.row(),
            frame.slot.col()
        );
        if let Err(TrySendError::Full(_)) = self.channel.try_send(frame) {
            // Another producer refilled the slot first
            warn!("frame queue contended, dropped newest");
        }
        true
    }

    /// Dequeue the oldest frame
    pub fn pop(&self) -> Option<SlotFrame> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<M: RawMutex, const N: usize> Default for FrameQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use picontrol_protocol::CommandId;

    fn frame(tag: u8) -> SlotFrame {
        SlotFrame {
            slot: SlotId::new(1, 2).unwrap(),
            frame: Frame::new(CommandId::Ping, &[tag]).unwrap(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue: FrameQueue<CriticalSectionRawMutex> = FrameQueue::new();
        assert!(!queue.push(frame(1)));
        assert!(!queue.push(frame(2)));
        assert_eq!(queue.pop(), Some(frame(1)));
        assert_eq!(queue.pop(), Some(frame(2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue: FrameQueue<CriticalSectionRawMutex, 2> = FrameQueue::new();
        queue.push(frame(1));
        queue.push(frame(2));
        assert!(queue.push(frame(3)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(frame(2)));
        assert_eq!(queue.pop(), Some(frame(3)));
    }
}
