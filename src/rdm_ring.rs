//! Ring of captured RDM frames, written from the receive interrupt and drained by the
//! foreground.
//!
//! The producer never waits for the consumer. When the consumer falls more than `N - 1` frames
//! behind, the oldest frames are skipped when it reads again. Head and tail are free running
//! counters, the slot of a frame is `counter % N`. A read is validated against the head counter
//! after copying, so a slot the producer started to overwrite during the copy is never returned.

use core::sync::atomic::{fence, Ordering};

use portable_atomic::{AtomicU16, AtomicU32, AtomicU8};

use crate::consts::{PREAMBLE_BYTE, RDM_MAX_PACKAGE_SIZE};

/// Largest frame one slot can hold, a full RDM message including its checksum.
pub const RDM_RING_SLOT_SIZE: usize = RDM_MAX_PACKAGE_SIZE;

pub type RdmFrameData = heapless::Vec<u8, RDM_RING_SLOT_SIZE>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RdmFrameKind {
    /// A message starting with the RDM start code, checksum already verified.
    Message,
    /// A discovery response, preamble and separator included.
    DiscoveryResponse,
}

/// A frame copied out of the ring.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RdmFrame {
    pub data: RdmFrameData,
    /// Timer value when the last byte was received.
    pub received_at: u32,
}

impl RdmFrame {
    pub fn kind(&self) -> RdmFrameKind {
        match self.data.first() {
            Some(&PREAMBLE_BYTE) => RdmFrameKind::DiscoveryResponse,
            _ => RdmFrameKind::Message,
        }
    }
}

struct RingSlot {
    length: AtomicU16,
    received_at: AtomicU32,
    data: [AtomicU8; RDM_RING_SLOT_SIZE],
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_BYTE: AtomicU8 = AtomicU8::new(0);

impl RingSlot {
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: RingSlot = RingSlot {
        length: AtomicU16::new(0),
        received_at: AtomicU32::new(0),
        data: [EMPTY_BYTE; RDM_RING_SLOT_SIZE],
    };
}

pub struct RdmRing<const N: usize> {
    slots: [RingSlot; N],
    head: AtomicU32,
    tail: AtomicU32,
    overruns: AtomicU32,
}

impl<const N: usize> Default for RdmRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RdmRing<N> {
    pub const fn new() -> Self {
        assert!(N >= 2, "the ring needs at least two slots");

        Self {
            slots: [RingSlot::EMPTY; N],
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    /// Readable frames the consumer can still get, at most `N - 1`.
    const fn window() -> u32 {
        (N - 1) as u32
    }

    fn slot(&self, counter: u32) -> &RingSlot {
        &self.slots[counter as usize % N]
    }

    /// Producer side. Copies `frame` into the next slot and makes it visible.
    /// Bytes past the slot size are dropped.
    pub(crate) fn publish(&self, frame: &[u8], received_at: u32) {
        let head = self.head.load(Ordering::Relaxed);
        let slot = self.slot(head);
        let length = frame.len().min(RDM_RING_SLOT_SIZE);

        // orders the previous head update before the slot writes below
        fence(Ordering::Release);

        for (cell, byte) in slot.data.iter().zip(&frame[..length]) {
            cell.store(*byte, Ordering::Relaxed);
        }
        slot.length.store(length as u16, Ordering::Relaxed);
        slot.received_at.store(received_at, Ordering::Relaxed);

        self.head.store(head.wrapping_add(1), Ordering::Release);
    }

    /// Consumer side. Returns the oldest frame still held, or None.
    pub fn pop(&self) -> Option<RdmFrame> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let mut tail = self.tail.load(Ordering::Relaxed);

            if head == tail {
                return None;
            }

            let lag = head.wrapping_sub(tail);
            if lag > Self::window() {
                let lost = lag - Self::window();
                self.overruns.fetch_add(lost, Ordering::Relaxed);
                tracing::warn!("rdm ring overrun, {} frames lost", lost);
                tail = head.wrapping_sub(Self::window());
            }

            let slot = self.slot(tail);
            let length = (slot.length.load(Ordering::Relaxed) as usize).min(RDM_RING_SLOT_SIZE);
            let mut data = RdmFrameData::new();
            for cell in &slot.data[..length] {
                // length is capped to the capacity
                let _ = data.push(cell.load(Ordering::Relaxed));
            }
            let received_at = slot.received_at.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            let head_after = self.head.load(Ordering::Relaxed);
            if head_after.wrapping_sub(tail) >= N as u32 {
                // the producer reached this slot while it was copied
                self.tail.store(tail, Ordering::Relaxed);
                continue;
            }

            self.tail.store(tail.wrapping_add(1), Ordering::Release);
            return Some(RdmFrame { data, received_at });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames waiting for the consumer.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        head.wrapping_sub(tail).min(Self::window()) as usize
    }

    /// Consumer side. Drops everything that has been published so far.
    pub fn clear(&self) {
        let head = self.head.load(Ordering::Acquire);
        self.tail.store(head, Ordering::Release);
    }

    /// Frames that were overwritten before the consumer read them.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_overruns(&self) {
        self.overruns.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SC_RDM;
    use proptest::prelude::*;

    fn frame(id: u8) -> [u8; 26] {
        let mut frame = [id; 26];
        frame[0] = SC_RDM;
        frame
    }

    #[test]
    fn test_fifo_order() {
        let ring = RdmRing::<4>::new();
        assert!(ring.pop().is_none());

        ring.publish(&frame(1), 10);
        ring.publish(&frame(2), 20);
        assert_eq!(ring.len(), 2);

        let first = ring.pop().unwrap();
        assert_eq!(first.data.as_slice(), &frame(1));
        assert_eq!(first.received_at, 10);
        assert_eq!(first.kind(), RdmFrameKind::Message);
        assert_eq!(ring.pop().unwrap().data.as_slice(), &frame(2));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overwrite_oldest() {
        let ring = RdmRing::<16>::new();
        for id in 0..20u8 {
            ring.publish(&frame(id), id as u32);
        }

        let mut seen = heapless::Vec::<u8, 16>::new();
        while let Some(frame) = ring.pop() {
            assert_eq!(frame.data.len(), 26);
            assert!(frame.data[1..].iter().all(|&byte| byte == frame.data[1]));
            seen.push(frame.data[1]).unwrap();
        }

        assert_eq!(seen.as_slice(), &[5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);
        assert_eq!(ring.overruns(), 5);
    }

    #[test]
    fn test_counters_wrap() {
        let ring = RdmRing::<4>::new();
        ring.head.store(u32::MAX, Ordering::Relaxed);
        ring.tail.store(u32::MAX, Ordering::Relaxed);

        ring.publish(&frame(1), 0);
        ring.publish(&frame(2), 0);
        assert_eq!(ring.pop().unwrap().data[1], 1);
        assert_eq!(ring.pop().unwrap().data[1], 2);
        assert!(ring.pop().is_none());
    }

    proptest! {
        #[test]
        fn tail_never_passes_head(operations in proptest::collection::vec(any::<bool>(), 0..200)) {
            let ring = RdmRing::<8>::new();
            let mut published = 0u8;
            let mut last_read: Option<u8> = None;

            for publish in operations {
                if publish {
                    ring.publish(&frame(published), 0);
                    published = published.wrapping_add(1);
                } else if let Some(frame) = ring.pop() {
                    let id = frame.data[1];
                    if let Some(last) = last_read {
                        prop_assert!(id.wrapping_sub(last) >= 1);
                    }
                    prop_assert!(published.wrapping_sub(id) <= 7);
                    last_read = Some(id);
                }

                let head = ring.head.load(Ordering::Relaxed);
                let tail = ring.tail.load(Ordering::Relaxed);
                prop_assert!(head.wrapping_sub(tail) <= u32::MAX / 2);
            }
        }
    }
}
