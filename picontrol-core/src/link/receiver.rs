//! Receive-side glue for one slot
//!
//! Runs in the producer context: feeds bytes through the frame parser,
//! stamps liveness and queues complete frames. Nothing here blocks or
//! touches the mapping table.

use embassy_sync::blocking_mutex::raw::RawMutex;
use picontrol_protocol::FrameParser;

use super::queue::SlotFrame;
use crate::port::SlotId;
use crate::shared::HubShared;

/// Frame parser bound to one slot
#[derive(Debug, Clone)]
pub struct SlotReceiver {
    slot: SlotId,
    parser: FrameParser,
}

impl SlotReceiver {
    pub const fn new(slot: SlotId, timeout_ms: u32) -> Self {
        Self {
            slot,
            parser: FrameParser::with_timeout(timeout_ms),
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Handle one received byte
    pub fn on_byte<M: RawMutex>(&mut self, byte: u8, now_ms: u32, shared: &HubShared<M>) {
        match self.parser.feed(byte, now_ms) {
            Ok(Some(frame)) => {
                shared.liveness(self.slot).record_frame(now_ms);
                shared.frames.push(SlotFrame {
                    slot: self.slot,
                    frame,
                });
            }
            Ok(None) => {}
            Err(e) => {
                trace!(
                    "slot {},{} frame discarded: {:?}",
                    self.slot.row(),
                    self.slot.col(),
                    e
                );
            }
        }
    }

    /// The receive line was sampled at its idle level
    pub fn on_line_idle<M: RawMutex>(&self, now_ms: u32, shared: &HubShared<M>) {
        shared.liveness(self.slot).record_idle(now_ms);
    }

    /// Drop any partial frame, as when the transport is reopened
    pub fn reset(&mut self) {
        self.parser.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use picontrol_protocol::{encode, CommandId};

    #[test]
    fn test_frames_are_queued_with_liveness() {
        let shared: HubShared<CriticalSectionRawMutex> = HubShared::new();
        let slot = SlotId::new(2, 0).unwrap();
        let mut receiver = SlotReceiver::new(slot, 50);

        for &byte in &[0x13, 0x37] {
            receiver.on_byte(byte, 100, &shared);
        }
        assert!(shared.frames.is_empty());

        for &byte in encode(CommandId::GetParameter, &[0x2A]).iter() {
            receiver.on_byte(byte, 120, &shared);
        }
        let queued = shared.frames.pop().unwrap();
        assert_eq!(queued.slot, slot);
        assert_eq!(queued.frame.command, CommandId::GetParameter);
        assert_eq!(&queued.frame.payload[..], &[0x2A]);
        assert_eq!(shared.liveness(slot).last_frame_ms(), 120);
    }

    #[test]
    fn test_corrupt_frame_not_queued() {
        let shared: HubShared<CriticalSectionRawMutex> = HubShared::new();
        let slot = SlotId::new(2, 0).unwrap();
        let mut receiver = SlotReceiver::new(slot, 50);

        for &byte in &[0xAA, 0x03, 0x01, 0x00, 0x2A, 0x2F] {
            receiver.on_byte(byte, 10, &shared);
        }
        assert!(shared.frames.is_empty());
        assert_eq!(shared.liveness(slot).last_frame_ms(), 0);
    }
}
