use core::sync::atomic::{fence, Ordering};

use portable_atomic::{AtomicU16, AtomicU32, AtomicU8};

use crate::consts::{DMX_MAX_CONSUMERS, DMX_MAX_PACKAGE_SIZE, DMX_MAX_SLOTS};

/// A vector that contains one DmxFrame. The first byte is the start code. 0x00 is the dmx start code.
pub type DmxFrame = heapless::Vec<u8, DMX_MAX_PACKAGE_SIZE>;

/// Handle of one foreground reader of the [DmxBuffer]. Every consumer sees each published frame
/// once, independent of the others.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmxConsumer(u8);

impl DmxConsumer {
    fn mask(&self) -> u8 {
        1 << self.0
    }

    pub fn id(&self) -> u8 {
        self.0
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicU8 = AtomicU8::new(0);

/// The last complete DMX frame received.
///
/// Written only from the receive interrupt by [DmxBuffer::publish]. Readers copy the frame out
/// and retry when a publish happened during the copy, so a half written frame is never returned.
pub struct DmxBuffer {
    data: [AtomicU8; DMX_MAX_PACKAGE_SIZE],
    slots_in_packet: AtomicU16,
    /// Odd while a publish is in progress.
    generation: AtomicU32,
    available: AtomicU8,
    consumers: AtomicU8,
}

impl Default for DmxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DmxBuffer {
    pub const fn new() -> Self {
        Self {
            data: [EMPTY_SLOT; DMX_MAX_PACKAGE_SIZE],
            slots_in_packet: AtomicU16::new(0),
            generation: AtomicU32::new(0),
            available: AtomicU8::new(0),
            consumers: AtomicU8::new(0),
        }
    }

    /// Registers a new reader. Returns None once all [DMX_MAX_CONSUMERS] handles are taken.
    pub fn subscribe(&self) -> Option<DmxConsumer> {
        let mut consumers = self.consumers.load(Ordering::Relaxed);

        loop {
            let id = (!consumers).trailing_zeros() as u8;
            if id >= DMX_MAX_CONSUMERS {
                return None;
            }

            match self.consumers.compare_exchange_weak(
                consumers,
                consumers | (1 << id),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(DmxConsumer(id)),
                Err(current) => consumers = current,
            }
        }
    }

    /// Producer side. `frame` starts with the start code, everything past 513 bytes is ignored.
    ///
    /// Returns true if a subscribed consumer never read the frame that got replaced.
    pub(crate) fn publish(&self, frame: &[u8]) -> bool {
        let frame = &frame[..frame.len().min(DMX_MAX_PACKAGE_SIZE)];
        let generation = self.generation.load(Ordering::Relaxed);

        self.generation
            .store(generation.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for (cell, byte) in self.data.iter().zip(frame) {
            cell.store(*byte, Ordering::Relaxed);
        }
        let slots = frame.len().saturating_sub(1).min(DMX_MAX_SLOTS);
        self.slots_in_packet.store(slots as u16, Ordering::Relaxed);

        self.generation
            .store(generation.wrapping_add(2), Ordering::Release);

        let consumers = self.consumers.load(Ordering::Relaxed);
        let unread = self.available.swap(consumers, Ordering::AcqRel);

        unread & consumers != 0
    }

    /// Slots of the last frame, the start code not included.
    pub fn slots_in_packet(&self) -> u16 {
        self.slots_in_packet.load(Ordering::Relaxed)
    }

    /// True if a frame was published since `consumer` last took one.
    pub fn is_available(&self, consumer: DmxConsumer) -> bool {
        self.available.load(Ordering::Acquire) & consumer.mask() != 0
    }

    /// Takes the newest frame if `consumer` hasn't seen it yet.
    pub fn take(&self, consumer: DmxConsumer) -> Option<DmxFrame> {
        let previous = self.available.fetch_and(!consumer.mask(), Ordering::AcqRel);
        if previous & consumer.mask() == 0 {
            return None;
        }

        Some(self.current())
    }

    /// Copy of the last published frame, whether it was taken before or not.
    /// Empty before the first frame.
    pub fn current(&self) -> DmxFrame {
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            if generation % 2 == 1 {
                core::hint::spin_loop();
                continue;
            }

            let length = self.slots_in_packet.load(Ordering::Relaxed) as usize;
            let mut frame = DmxFrame::new();
            if generation != 0 {
                for cell in &self.data[..(length + 1).min(DMX_MAX_PACKAGE_SIZE)] {
                    // never more than 513 cells
                    let _ = frame.push(cell.load(Ordering::Relaxed));
                }
            }

            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == generation {
                return frame;
            }
        }
    }
}

/// Remembers the previous frame of one consumer and reports only frames that differ from it.
#[derive(Debug, Default)]
pub struct DmxChangeDetector {
    previous: DmxFrame,
}

impl DmxChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the newest frame if it is new for `consumer` and its payload or length differs
    /// from the last frame this detector returned.
    pub fn changed(&mut self, buffer: &DmxBuffer, consumer: DmxConsumer) -> Option<DmxFrame> {
        let frame = buffer.take(consumer)?;

        if frame == self.previous {
            return None;
        }

        self.previous = frame.clone();
        Some(frame)
    }

    pub fn previous(&self) -> &DmxFrame {
        &self.previous
    }
}
