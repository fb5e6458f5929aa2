//! Output timing of a DMX512 transmitter.

use crate::consts::{
    DMX_MAX_SLOTS, SLOT_TIME_MICROS, TRANSMIT_BREAK_TIME_MAX_MICROS,
    TRANSMIT_BREAK_TIME_MIN_MICROS, TRANSMIT_BREAK_TO_BREAK_TIME_MIN_MICROS,
    TRANSMIT_MAB_TIME_MAX_MICROS, TRANSMIT_MAB_TIME_MIN_MICROS,
};

/// Break, mark after break and period of a transmitted DMX frame, all in microseconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransmitTiming {
    break_time: u32,
    mab_time: u32,
    /// Slots after the start code.
    slots: u16,
    /// What was asked for, 0 means as fast as possible.
    period_requested: u32,
    period: u32,
}

impl TransmitTiming {
    pub fn new(break_time: u32, mab_time: u32, slots: u16, period_requested: u32) -> Self {
        let mut timing = Self {
            break_time: clamp_break_time(break_time),
            mab_time: clamp_mab_time(mab_time),
            slots: slots.min(DMX_MAX_SLOTS as u16),
            period_requested,
            period: 0,
        };
        timing.update_period();

        timing
    }

    fn update_period(&mut self) {
        self.period = clamp_period(
            self.period_requested,
            minimum_period(self.break_time, self.mab_time, self.slots),
        );
    }

    pub fn break_time(&self) -> u32 {
        self.break_time
    }

    pub fn mab_time(&self) -> u32 {
        self.mab_time
    }

    pub fn slots(&self) -> u16 {
        self.slots
    }

    /// The effective break to break time.
    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn period_requested(&self) -> u32 {
        self.period_requested
    }

    /// The effective refresh rate in Hz.
    pub fn refresh_rate(&self) -> u32 {
        1_000_000 / self.period.max(1)
    }

    pub fn set_break_time(&mut self, break_time: u32) {
        self.break_time = clamp_break_time(break_time);
        self.update_period();
    }

    pub fn set_mab_time(&mut self, mab_time: u32) {
        self.mab_time = clamp_mab_time(mab_time);
        self.update_period();
    }

    pub fn set_slots(&mut self, slots: u16) {
        self.slots = slots.min(DMX_MAX_SLOTS as u16);
        self.update_period();
    }

    pub fn set_period(&mut self, period: u32) {
        self.period_requested = period;
        self.update_period();
    }

    /// 0 Hz sends as fast as possible.
    pub fn set_refresh_rate(&mut self, refresh_rate: u32) {
        self.set_period(refresh_rate_to_period(refresh_rate));
    }
}

fn clamp_break_time(break_time: u32) -> u32 {
    break_time.clamp(TRANSMIT_BREAK_TIME_MIN_MICROS, TRANSMIT_BREAK_TIME_MAX_MICROS)
}

fn clamp_mab_time(mab_time: u32) -> u32 {
    mab_time.clamp(TRANSMIT_MAB_TIME_MIN_MICROS, TRANSMIT_MAB_TIME_MAX_MICROS)
}

/// Time on the wire of break, mark after break, start code and `slots` slots.
pub fn frame_time(break_time: u32, mab_time: u32, slots: u16) -> u32 {
    break_time
        .saturating_add(mab_time)
        .saturating_add((slots as u32 + 1).saturating_mul(SLOT_TIME_MICROS))
}

/// Shortest break to break time: one idle slot after the frame, never below 1204 µs.
pub fn minimum_period(break_time: u32, mab_time: u32, slots: u16) -> u32 {
    frame_time(break_time, mab_time, slots)
        .saturating_add(SLOT_TIME_MICROS)
        .max(TRANSMIT_BREAK_TO_BREAK_TIME_MIN_MICROS)
}

/// A request of 0 or anything shorter than `minimum` yields `minimum`.
pub fn clamp_period(requested: u32, minimum: u32) -> u32 {
    if requested < minimum {
        if requested != 0 {
            tracing::debug!(
                "output period {} µs too short, using {} µs",
                requested,
                minimum
            );
        }
        return minimum;
    }

    requested
}

pub fn refresh_rate_to_period(refresh_rate: u32) -> u32 {
    match refresh_rate {
        0 => 0,
        rate => 1_000_000 / rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{
        TRANSMIT_BREAK_TIME_TYPICAL_MICROS, TRANSMIT_MAB_TIME_TYPICAL_MICROS,
        TRANSMIT_PERIOD_DEFAULT_MICROS,
    };
    use proptest::prelude::*;

    #[test]
    fn test_full_universe_minimum() {
        // 176 + 16 + 513 * 44 + 44
        assert_eq!(
            minimum_period(
                TRANSMIT_BREAK_TIME_TYPICAL_MICROS,
                TRANSMIT_MAB_TIME_TYPICAL_MICROS,
                512
            ),
            22_808
        );
    }

    #[test]
    fn test_short_frame_uses_break_to_break_minimum() {
        assert_eq!(minimum_period(176, 16, 1), 1204);
    }

    #[test]
    fn test_default_refresh_rate_is_kept() {
        let timing = TransmitTiming::new(176, 16, 512, TRANSMIT_PERIOD_DEFAULT_MICROS);
        assert_eq!(timing.period(), 25_000);
        assert_eq!(timing.refresh_rate(), 40);
    }

    #[test]
    fn test_fast_as_possible() {
        let mut timing = TransmitTiming::new(176, 16, 512, 25_000);
        timing.set_refresh_rate(0);
        assert_eq!(timing.period(), 22_808);

        timing.set_slots(24);
        assert_eq!(timing.period(), 176 + 16 + 25 * 44 + 44);
    }

    #[test]
    fn test_break_and_mab_are_clamped() {
        let timing = TransmitTiming::new(10, 1, 24, 0);
        assert_eq!(timing.break_time(), TRANSMIT_BREAK_TIME_MIN_MICROS);
        assert_eq!(timing.mab_time(), TRANSMIT_MAB_TIME_MIN_MICROS);
    }

    #[test]
    fn test_extreme_values_are_clamped() {
        let mut timing = TransmitTiming::new(u32::MAX, u32::MAX, u16::MAX, u32::MAX);
        assert_eq!(timing.break_time(), TRANSMIT_BREAK_TIME_MAX_MICROS);
        assert_eq!(timing.mab_time(), TRANSMIT_MAB_TIME_MAX_MICROS);
        assert_eq!(timing.slots(), 512);
        assert_eq!(timing.period(), u32::MAX);

        timing.set_period(0);
        assert_eq!(timing.period(), 1_000_000 + 1_000_000 + 513 * 44 + 44);

        timing.set_break_time(u32::MAX);
        timing.set_mab_time(u32::MAX);
        assert_eq!(timing.break_time(), TRANSMIT_BREAK_TIME_MAX_MICROS);
    }

    #[test]
    fn test_frame_time_saturates() {
        assert_eq!(frame_time(u32::MAX, u32::MAX, u16::MAX), u32::MAX);
        assert_eq!(minimum_period(u32::MAX, 16, 512), u32::MAX);
    }

    #[test]
    fn test_longer_break_recalculates_period() {
        let mut timing = TransmitTiming::new(176, 16, 512, 22_900);
        assert_eq!(timing.period(), 22_900);

        timing.set_break_time(400);
        assert_eq!(timing.period(), 400 + 16 + 513 * 44 + 44);
        assert_eq!(timing.period_requested(), 22_900);
    }

    proptest! {
        #[test]
        fn period_never_below_minimum(
            break_time in any::<u32>(),
            mab_time in any::<u32>(),
            slots in any::<u16>(),
            requested in any::<u32>(),
        ) {
            let timing = TransmitTiming::new(break_time, mab_time, slots, requested);
            let minimum = minimum_period(timing.break_time(), timing.mab_time(), timing.slots());

            if requested < minimum {
                prop_assert_eq!(timing.period(), minimum);
            } else {
                prop_assert_eq!(timing.period(), requested);
            }
        }
    }
}
