//! Timer driven transmit state machine.
//!
//! Every timer interrupt ends the current phase of the line and starts the next one:
//! break, mark after break, data, then either the gap until the next break or, for one-shot
//! frames, waiting for the uart to drain.

use crate::consts::{
    DMX_MAX_PACKAGE_SIZE, DMX_NULL_START, RDM_MAX_PACKAGE_SIZE, RDM_TRANSMIT_BREAK_TIME_MICROS,
    RDM_TRANSMIT_MAB_TIME_MICROS, SLOT_TIME_MICROS,
};
use crate::dmx_uart_driver::{DmxTimer, DmxUart, TimerChannel};
use crate::timing::TransmitTiming;
use crate::utils::remaining_micros;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitState {
    Idle,
    /// Waiting for the responder packet spacing before a one-shot frame.
    Turnaround,
    Break,
    Mab,
    Data,
    /// Between the end of a continuous frame and the next break.
    Inter,
    /// A one-shot frame was written, waiting for the last stop bit.
    Drain,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitMode {
    /// Send the DMX buffer over and over.
    Continuous,
    /// Send a single frame, with or without break.
    OneShot { with_break: bool },
}

/// Reported by [TransmitSequencer::on_timer].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitEvent {
    /// A continuous frame was written to the uart.
    FrameSent,
    /// A one-shot frame left the uart completely.
    OneShotDone { with_break: bool },
}

pub struct TransmitSequencer {
    state: TransmitState,
    mode: TransmitMode,
    timing: TransmitTiming,
    dmx_data: [u8; DMX_MAX_PACKAGE_SIZE],
    one_shot: heapless::Vec<u8, RDM_MAX_PACKAGE_SIZE>,
    break_at: u32,
}

impl TransmitSequencer {
    pub fn new(timing: TransmitTiming) -> Self {
        let mut dmx_data = [0; DMX_MAX_PACKAGE_SIZE];
        dmx_data[0] = DMX_NULL_START;

        Self {
            state: TransmitState::Idle,
            mode: TransmitMode::Continuous,
            timing,
            dmx_data,
            one_shot: heapless::Vec::new(),
            break_at: 0,
        }
    }

    pub fn state(&self) -> TransmitState {
        self.state
    }

    pub fn mode(&self) -> TransmitMode {
        self.mode
    }

    pub fn timing(&self) -> &TransmitTiming {
        &self.timing
    }

    /// Changes take effect with the next break.
    pub fn timing_mut(&mut self) -> &mut TransmitTiming {
        &mut self.timing
    }

    /// Start code and slots that go out in continuous mode.
    pub fn dmx_data(&self) -> &[u8] {
        &self.dmx_data[..self.timing.slots() as usize + 1]
    }

    /// Copies `data` (start code first) into the continuous output and makes its length the
    /// slot count.
    pub fn set_dmx_data(&mut self, data: &[u8]) {
        let length = data.len().min(DMX_MAX_PACKAGE_SIZE);
        self.dmx_data[..length].copy_from_slice(&data[..length]);
        self.timing.set_slots(length.saturating_sub(1) as u16);
    }

    /// Slots `1..` keep their values, slots past the old length are zero.
    pub fn set_dmx_slots(&mut self, slots: u16) {
        let old_length = self.timing.slots() as usize + 1;
        self.timing.set_slots(slots);
        let new_length = self.timing.slots() as usize + 1;

        if new_length > old_length {
            self.dmx_data[old_length..new_length].fill(0);
        }
    }

    /// All slots zero, the start code back to 0x00.
    pub fn clear_data(&mut self) {
        self.dmx_data.fill(0);
        self.dmx_data[0] = DMX_NULL_START;
    }

    /// A continuous frame is on the line or a one-shot frame hasn't finished yet.
    /// Waiting between two continuous frames doesn't count.
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, TransmitState::Idle | TransmitState::Inter)
    }

    /// Starts sending the DMX buffer. The first break starts right away.
    pub fn start_continuous<T: DmxTimer>(&mut self, timer: &mut T) {
        self.mode = TransmitMode::Continuous;
        self.state = TransmitState::Inter;
        timer.schedule(TimerChannel::Slot, timer.now_micros());
    }

    /// Queues a single frame that starts at `start_at`. Without break the bytes go out
    /// right after the turnaround, as discovery responses require.
    pub fn start_one_shot<T: DmxTimer>(
        &mut self,
        timer: &mut T,
        data: &[u8],
        with_break: bool,
        start_at: u32,
    ) {
        self.one_shot.clear();
        // the caller checked the length against the capacity
        let _ = self
            .one_shot
            .extend_from_slice(&data[..data.len().min(RDM_MAX_PACKAGE_SIZE)]);

        self.mode = TransmitMode::OneShot { with_break };
        self.state = TransmitState::Turnaround;
        timer.schedule(TimerChannel::Slot, start_at);
    }

    /// Hard stop. Whatever is on the line is cut off.
    pub fn stop<U: DmxUart, T: DmxTimer>(&mut self, uart: &mut U, timer: &mut T) {
        timer.cancel(TimerChannel::Slot);
        if self.state == TransmitState::Break {
            uart.set_break(false);
        }
        self.state = TransmitState::Idle;
    }

    fn start_break<U: DmxUart, T: DmxTimer>(
        &mut self,
        uart: &mut U,
        timer: &mut T,
        now: u32,
        break_time: u32,
    ) {
        uart.set_break(true);
        self.break_at = now;
        self.state = TransmitState::Break;
        timer.schedule(TimerChannel::Slot, now.wrapping_add(break_time));
    }

    /// Call from the interrupt of [TimerChannel::Slot] while the port is an output.
    pub fn on_timer<U: DmxUart, T: DmxTimer>(
        &mut self,
        uart: &mut U,
        timer: &mut T,
    ) -> Option<TransmitEvent> {
        let now = timer.now_micros();

        match (self.state, self.mode) {
            (TransmitState::Idle, _) => None,
            (TransmitState::Inter, _) => {
                self.start_break(uart, timer, now, self.timing.break_time());
                None
            },
            (TransmitState::Turnaround, TransmitMode::OneShot { with_break: true }) => {
                self.start_break(uart, timer, now, RDM_TRANSMIT_BREAK_TIME_MICROS);
                None
            },
            (TransmitState::Turnaround, _) => {
                self.break_at = now;
                self.send_data(uart, timer, now)
            },
            (TransmitState::Break, mode) => {
                uart.set_break(false);
                self.state = TransmitState::Mab;

                let mab_time = match mode {
                    TransmitMode::Continuous => self.timing.mab_time(),
                    TransmitMode::OneShot { .. } => RDM_TRANSMIT_MAB_TIME_MICROS,
                };
                timer.schedule(TimerChannel::Slot, now.wrapping_add(mab_time));
                None
            },
            (TransmitState::Mab, _) => self.send_data(uart, timer, now),
            (TransmitState::Data, _) => {
                tracing::trace!("transmit timer fired during data");
                None
            },
            (TransmitState::Drain, TransmitMode::OneShot { with_break }) => {
                if uart.is_tx_busy() {
                    timer.schedule(TimerChannel::Slot, now.wrapping_add(SLOT_TIME_MICROS));
                    return None;
                }

                self.state = TransmitState::Idle;
                Some(TransmitEvent::OneShotDone { with_break })
            },
            (TransmitState::Drain, TransmitMode::Continuous) => {
                self.state = TransmitState::Inter;
                timer.schedule(TimerChannel::Slot, now);
                None
            },
        }
    }

    fn send_data<U: DmxUart, T: DmxTimer>(
        &mut self,
        uart: &mut U,
        timer: &mut T,
        now: u32,
    ) -> Option<TransmitEvent> {
        self.state = TransmitState::Data;

        match self.mode {
            TransmitMode::Continuous => {
                let length = self.timing.slots() as usize + 1;
                write_blocking(uart, &self.dmx_data[..length]);

                let end = timer.now_micros();
                let period = self.timing.period();
                let wait = remaining_micros(end, self.break_at, period);
                if wait == 0 {
                    tracing::trace!("output period of {} µs exceeded", period);
                }

                self.state = TransmitState::Inter;
                timer.schedule(TimerChannel::Slot, end.wrapping_add(wait));
                Some(TransmitEvent::FrameSent)
            },
            TransmitMode::OneShot { .. } => {
                write_blocking(uart, &self.one_shot);

                self.state = TransmitState::Drain;
                timer.schedule(TimerChannel::Slot, now.wrapping_add(SLOT_TIME_MICROS));
                None
            },
        }
    }
}

/// Writes every byte, spinning while the transmit fifo is full.
///
/// This is the only place that waits inside an interrupt. It is bounded by the frame length,
/// the fifo drains one byte per 44 µs, and it only runs once the frame is committed.
fn write_blocking<U: DmxUart>(uart: &mut U, data: &[u8]) {
    for &byte in data {
        while uart.is_tx_full() {
            core::hint::spin_loop();
        }
        uart.write_byte(byte);
    }
}
