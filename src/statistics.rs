//! Counters and timings of one port.
//!
//! Updated from the interrupt handlers, read from anywhere. Values are advisory, a snapshot taken
//! while a frame is being published may mix counters of two frames.

use core::sync::atomic::Ordering;

use portable_atomic::{AtomicU16, AtomicU32};

/// A copy of all [Statistics] values.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatisticsSnapshot {
    /// DMX frames with start code 0x00 that were published.
    pub dmx_packets: u32,
    /// RDM frames that passed the checksum.
    pub rdm_packets: u32,
    pub rdm_checksum_errors: u32,
    pub discovery_responses_received: u32,
    pub rdm_packets_sent: u32,
    pub discovery_responses_sent: u32,
    /// RDM frames lost because the consumer didn't read the ring in time.
    pub rdm_ring_overruns: u32,
    /// DMX frames replaced before every consumer had taken them.
    pub dmx_unread_overwritten: u32,
    /// DMX frames received during the last full second.
    pub updates_per_second: u32,
    /// Microseconds between the last two bytes of the last DMX frame.
    pub slot_to_slot: u32,
    /// Microseconds between the last two breaks.
    pub break_to_break: u32,
    /// Slots of the last DMX frame, the start code not included.
    pub slots_in_packet: u16,
}

#[derive(Default)]
pub struct Statistics {
    dmx_packets: AtomicU32,
    rdm_packets: AtomicU32,
    rdm_checksum_errors: AtomicU32,
    discovery_responses_received: AtomicU32,
    rdm_packets_sent: AtomicU32,
    discovery_responses_sent: AtomicU32,
    dmx_unread_overwritten: AtomicU32,
    updates_per_second: AtomicU32,
    dmx_packets_at_last_tick: AtomicU32,
    slot_to_slot: AtomicU32,
    break_to_break: AtomicU32,
    slots_in_packet: AtomicU16,
}

impl Statistics {
    pub const fn new() -> Self {
        Self {
            dmx_packets: AtomicU32::new(0),
            rdm_packets: AtomicU32::new(0),
            rdm_checksum_errors: AtomicU32::new(0),
            discovery_responses_received: AtomicU32::new(0),
            rdm_packets_sent: AtomicU32::new(0),
            discovery_responses_sent: AtomicU32::new(0),
            dmx_unread_overwritten: AtomicU32::new(0),
            updates_per_second: AtomicU32::new(0),
            dmx_packets_at_last_tick: AtomicU32::new(0),
            slot_to_slot: AtomicU32::new(0),
            break_to_break: AtomicU32::new(0),
            slots_in_packet: AtomicU16::new(0),
        }
    }

    pub(crate) fn record_dmx_packet(&self, slots_in_packet: u16, slot_to_slot: u32) {
        self.dmx_packets.fetch_add(1, Ordering::Relaxed);
        self.slots_in_packet
            .store(slots_in_packet, Ordering::Relaxed);
        self.slot_to_slot.store(slot_to_slot, Ordering::Relaxed);
    }

    pub(crate) fn record_break_to_break(&self, micros: u32) {
        self.break_to_break.store(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_rdm_packet(&self) {
        self.rdm_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rdm_checksum_error(&self) {
        self.rdm_checksum_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovery_response_received(&self) {
        self.discovery_responses_received
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rdm_sent(&self) {
        self.rdm_packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovery_response_sent(&self) {
        self.discovery_responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dmx_unread_overwritten(&self) {
        self.dmx_unread_overwritten.fetch_add(1, Ordering::Relaxed);
    }

    /// Call once per second.
    pub(crate) fn tick(&self) {
        let dmx_packets = self.dmx_packets.load(Ordering::Relaxed);
        let last = self
            .dmx_packets_at_last_tick
            .swap(dmx_packets, Ordering::Relaxed);

        self.updates_per_second
            .store(dmx_packets.wrapping_sub(last), Ordering::Relaxed);
    }

    pub fn updates_per_second(&self) -> u32 {
        self.updates_per_second.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            dmx_packets: self.dmx_packets.load(Ordering::Relaxed),
            rdm_packets: self.rdm_packets.load(Ordering::Relaxed),
            rdm_checksum_errors: self.rdm_checksum_errors.load(Ordering::Relaxed),
            discovery_responses_received: self
                .discovery_responses_received
                .load(Ordering::Relaxed),
            rdm_packets_sent: self.rdm_packets_sent.load(Ordering::Relaxed),
            discovery_responses_sent: self.discovery_responses_sent.load(Ordering::Relaxed),
            rdm_ring_overruns: 0,
            dmx_unread_overwritten: self.dmx_unread_overwritten.load(Ordering::Relaxed),
            updates_per_second: self.updates_per_second.load(Ordering::Relaxed),
            slot_to_slot: self.slot_to_slot.load(Ordering::Relaxed),
            break_to_break: self.break_to_break.load(Ordering::Relaxed),
            slots_in_packet: self.slots_in_packet.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.dmx_packets,
            &self.rdm_packets,
            &self.rdm_checksum_errors,
            &self.discovery_responses_received,
            &self.rdm_packets_sent,
            &self.discovery_responses_sent,
            &self.dmx_unread_overwritten,
            &self.updates_per_second,
            &self.dmx_packets_at_last_tick,
            &self.slot_to_slot,
            &self.break_to_break,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.slots_in_packet.store(0, Ordering::Relaxed);
    }
}
