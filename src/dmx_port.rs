//! One DMX512/RDM port: the receive framer, the transmit sequencer and the hardware they run on.
//!
//! A [DmxPort] is owned by the interrupt handlers, typically inside a
//! `critical_section::Mutex<RefCell<_>>`. Everything the foreground only reads lives in a
//! [DmxPortShared] that can be a `static`, so reading frames never has to lock the port.

use crate::consts::{
    DMX_MAX_PACKAGE_SIZE, DMX_MAX_SLOTS, DMX_NULL_START, HOUSEKEEPING_PERIOD_MICROS,
    RDM_MAX_PACKAGE_SIZE, RDM_RESPONDER_PACKET_SPACING_MICROS, RDM_RING_DEFAULT_ENTRIES,
    RECEIVE_SLOT_TIMEOUT_GUARD_MICROS, TRANSMIT_BREAK_TIME_TYPICAL_MICROS,
    TRANSMIT_MAB_TIME_TYPICAL_MICROS, TRANSMIT_PERIOD_DEFAULT_MICROS,
};
use crate::dmx_buffer::{DmxBuffer, DmxConsumer, DmxFrame};
use crate::dmx_receiver::{LineEvent, ReceiveFramer, ReceivedFrame, TimeoutAction};
use crate::dmx_transmitter::{TransmitEvent, TransmitSequencer, TransmitState};
use crate::dmx_uart_driver::{DirectionPin, DmxTimer, DmxUart, TimerChannel};
use crate::rdm_data::{encode_discovery_response, RdmData, RdmResponseData};
use crate::rdm_responder::{PollingError, RdmAnswer, RdmResponder, RdmResponderHandlerFunc};
use crate::rdm_ring::{RdmFrame, RdmFrameKind, RdmRing};
use crate::statistics::{Statistics, StatisticsSnapshot};
use crate::timing::{refresh_rate_to_period, TransmitTiming};
use crate::utils::remaining_micros;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmxPortError {
    /// A frame is still on the line.
    TransmitBusy,
    /// Answers can only be sent while the port listens.
    WrongDirection,
    /// Contains the length that was refused.
    PayloadTooLong(usize),
    EmptyPayload,
}

impl core::fmt::Display for DmxPortError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DmxPortError::TransmitBusy => write!(f, "transmitter is busy"),
            DmxPortError::WrongDirection => write!(f, "port has the wrong direction"),
            DmxPortError::PayloadTooLong(length) => {
                write!(f, "payload of {} bytes is too long", length)
            },
            DmxPortError::EmptyPayload => write!(f, "payload is empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DmxPortError {}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortDirection {
    /// Neither side runs, the transceiver listens.
    Idle,
    Output,
    Input,
}

/// Timing and behaviour of a [DmxPort]. Values below the protocol minimums are raised to them.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmxPortConfig {
    /// Transmitted break in µs.
    pub break_time: u32,
    /// Transmitted mark after break in µs.
    pub mab_time: u32,
    /// Requested break to break time in µs, 0 sends as fast as possible.
    pub period: u32,
    /// Slots sent after the start code.
    pub slots: u16,
    /// Minimum time in µs between the end of a received RDM request and our answer.
    pub rdm_packet_spacing: u32,
    /// Collect discovery responses, which arrive without a break. Needed on controllers.
    pub capture_discovery_responses: bool,
    /// Added to the observed slot time before a short frame is closed.
    pub slot_timeout_guard: u32,
}

impl Default for DmxPortConfig {
    fn default() -> Self {
        Self {
            break_time: TRANSMIT_BREAK_TIME_TYPICAL_MICROS,
            mab_time: TRANSMIT_MAB_TIME_TYPICAL_MICROS,
            period: TRANSMIT_PERIOD_DEFAULT_MICROS,
            slots: DMX_MAX_SLOTS as u16,
            rdm_packet_spacing: RDM_RESPONDER_PACKET_SPACING_MICROS,
            capture_discovery_responses: false,
            slot_timeout_guard: RECEIVE_SLOT_TIMEOUT_GUARD_MICROS,
        }
    }
}

/// State of a port that is written by its interrupts and read by everyone else.
pub struct DmxPortShared<const N: usize = RDM_RING_DEFAULT_ENTRIES> {
    dmx: DmxBuffer,
    rdm: RdmRing<N>,
    statistics: Statistics,
}

impl<const N: usize> Default for DmxPortShared<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DmxPortShared<N> {
    pub const fn new() -> Self {
        Self {
            dmx: DmxBuffer::new(),
            rdm: RdmRing::new(),
            statistics: Statistics::new(),
        }
    }

    pub fn dmx_buffer(&self) -> &DmxBuffer {
        &self.dmx
    }

    /// See [DmxBuffer::subscribe].
    pub fn subscribe(&self) -> Option<DmxConsumer> {
        self.dmx.subscribe()
    }

    pub fn dmx_available(&self, consumer: DmxConsumer) -> bool {
        self.dmx.is_available(consumer)
    }

    /// The newest frame if `consumer` didn't take it yet.
    pub fn dmx_receive(&self, consumer: DmxConsumer) -> Option<DmxFrame> {
        self.dmx.take(consumer)
    }

    pub fn current_dmx_data(&self) -> DmxFrame {
        self.dmx.current()
    }

    /// The oldest RDM frame not read yet. There must be only one caller of this
    /// at a time, including [DmxPort::poll_rdm_responder].
    pub fn rdm_receive(&self) -> Option<RdmFrame> {
        self.rdm.pop()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            rdm_ring_overruns: self.rdm.overruns(),
            ..self.statistics.snapshot()
        }
    }

    pub fn reset_statistics(&self) {
        self.statistics.reset();
        self.rdm.reset_overruns();
    }

    pub fn updates_per_second(&self) -> u32 {
        self.statistics.updates_per_second()
    }

    fn publish(&self, frame: ReceivedFrame<'_>) -> Option<u32> {
        match frame {
            ReceivedFrame::Dmx {
                data,
                slot_to_slot,
                break_to_break,
            } => {
                if self.dmx.publish(data) {
                    self.statistics.record_dmx_unread_overwritten();
                }
                self.statistics
                    .record_dmx_packet(data.len().saturating_sub(1) as u16, slot_to_slot);
                if let Some(break_to_break) = break_to_break {
                    self.statistics.record_break_to_break(break_to_break);
                }
                None
            },
            ReceivedFrame::Rdm { data, received_at } => {
                self.rdm.publish(data, received_at);
                self.statistics.record_rdm_packet();
                Some(received_at)
            },
            ReceivedFrame::DiscoveryResponse { data, received_at } => {
                self.rdm.publish(data, received_at);
                self.statistics.record_discovery_response_received();
                Some(received_at)
            },
            ReceivedFrame::RdmRejected => {
                self.statistics.record_rdm_checksum_error();
                None
            },
        }
    }
}

pub struct DmxPort<'a, U, T, D, const N: usize = RDM_RING_DEFAULT_ENTRIES>
where
    U: DmxUart,
    T: DmxTimer,
    D: DirectionPin,
{
    shared: &'a DmxPortShared<N>,
    uart: U,
    timer: T,
    direction_pin: D,
    framer: ReceiveFramer,
    sequencer: TransmitSequencer,
    direction: PortDirection,
    rdm_packet_spacing: u32,
    last_rdm_received_at: Option<u32>,
    housekeeping_at: u32,
}

impl<'a, U, T, D, const N: usize> DmxPort<'a, U, T, D, N>
where
    U: DmxUart,
    T: DmxTimer,
    D: DirectionPin,
{
    /// Creates an idle port and starts the once per second bookkeeping.
    pub fn new(
        shared: &'a DmxPortShared<N>,
        mut uart: U,
        mut timer: T,
        mut direction_pin: D,
        config: DmxPortConfig,
    ) -> Self {
        uart.disable();
        direction_pin.set_input();

        let mut framer = ReceiveFramer::new(config.capture_discovery_responses);
        framer.set_timeout_guard(config.slot_timeout_guard);

        let housekeeping_at = timer.now_micros().wrapping_add(HOUSEKEEPING_PERIOD_MICROS);
        timer.schedule(TimerChannel::Housekeeping, housekeeping_at);

        Self {
            shared,
            uart,
            timer,
            direction_pin,
            framer,
            sequencer: TransmitSequencer::new(TransmitTiming::new(
                config.break_time,
                config.mab_time,
                config.slots,
                config.period,
            )),
            direction: PortDirection::Idle,
            rdm_packet_spacing: config.rdm_packet_spacing,
            last_rdm_received_at: None,
            housekeeping_at,
        }
    }

    pub fn shared(&self) -> &'a DmxPortShared<N> {
        self.shared
    }

    pub fn port_direction(&self) -> PortDirection {
        self.direction
    }

    /// Stops whatever runs, switches the RS485 driver and, if `enable_data` is set, starts the
    /// new side. Frames in progress are dropped.
    pub fn set_port_direction(&mut self, direction: PortDirection, enable_data: bool) {
        self.halt();

        match direction {
            PortDirection::Output => self.direction_pin.set_output(),
            PortDirection::Input | PortDirection::Idle => self.direction_pin.set_input(),
        }

        if self.direction != direction {
            tracing::debug!("port direction {:?} -> {:?}", self.direction, direction);
        }
        self.direction = direction;

        if !enable_data {
            return;
        }

        match direction {
            PortDirection::Output => {
                self.uart.enable_transmit();
                self.sequencer.start_continuous(&mut self.timer);
            },
            PortDirection::Input => {
                self.framer.reset();
                self.uart.enable_receive();
            },
            PortDirection::Idle => {},
        }
    }

    /// Stops the active side and the uart, the direction pin is left alone.
    fn halt(&mut self) {
        match self.direction {
            PortDirection::Output => self.sequencer.stop(&mut self.uart, &mut self.timer),
            PortDirection::Input => self.framer.reset(),
            PortDirection::Idle => {},
        }
        self.uart.disable();
        self.timer.cancel(TimerChannel::Slot);
    }

    /// Byte received and break interrupt.
    pub fn on_uart_event(&mut self, event: LineEvent) {
        if self.direction != PortDirection::Input {
            return;
        }

        if let Some(frame) = self.framer.step(event) {
            if let Some(received_at) = self.shared.publish(frame) {
                self.last_rdm_received_at = Some(received_at);
            }
        }

        if let Some(at) = self.framer.deadline() {
            self.timer.schedule(TimerChannel::Slot, at);
        }
    }

    /// Timer compare interrupt.
    pub fn on_timer(&mut self, channel: TimerChannel) {
        match channel {
            TimerChannel::Housekeeping => {
                self.shared.statistics.tick();
                self.housekeeping_at = self
                    .housekeeping_at
                    .wrapping_add(HOUSEKEEPING_PERIOD_MICROS);
                self.timer
                    .schedule(TimerChannel::Housekeeping, self.housekeeping_at);
            },
            TimerChannel::Slot => match self.direction {
                PortDirection::Input => self.on_receive_timeout(),
                PortDirection::Output => self.on_transmit_timer(),
                PortDirection::Idle => {},
            },
        }
    }

    fn on_receive_timeout(&mut self) {
        let now = self.timer.now_micros();

        match self.framer.on_timeout(now) {
            TimeoutAction::Closed(frame) => {
                self.shared.publish(frame);
            },
            TimeoutAction::Rearm(at) => self.timer.schedule(TimerChannel::Slot, at),
            TimeoutAction::Idle => {},
        }
    }

    fn on_transmit_timer(&mut self) {
        if self.sequencer.state() == TransmitState::Turnaround {
            self.direction_pin.set_output();
            self.uart.enable_transmit();
        }

        let event = self.sequencer.on_timer(&mut self.uart, &mut self.timer);

        if let Some(TransmitEvent::OneShotDone { with_break }) = event {
            if with_break {
                self.shared.statistics.record_rdm_sent();
            } else {
                self.shared.statistics.record_discovery_response_sent();
            }

            tracing::trace!("one-shot frame sent, back to input");
            self.set_port_direction(PortDirection::Input, true);
        }
    }

    pub fn set_break_time(&mut self, break_time: u32) {
        self.sequencer.timing_mut().set_break_time(break_time);
    }

    pub fn get_break_time(&self) -> u32 {
        self.sequencer.timing().break_time()
    }

    pub fn set_mab_time(&mut self, mab_time: u32) {
        self.sequencer.timing_mut().set_mab_time(mab_time);
    }

    pub fn get_mab_time(&self) -> u32 {
        self.sequencer.timing().mab_time()
    }

    /// 0 sends as fast as possible, shorter periods than a frame needs are raised to that.
    pub fn set_period_time(&mut self, period: u32) {
        self.sequencer.timing_mut().set_period(period);
    }

    /// The effective period.
    pub fn get_period_time(&self) -> u32 {
        self.sequencer.timing().period()
    }

    pub fn set_refresh_rate(&mut self, refresh_rate: u32) {
        self.set_period_time(refresh_rate_to_period(refresh_rate));
    }

    pub fn get_refresh_rate(&self) -> u32 {
        self.sequencer.timing().refresh_rate()
    }

    pub fn get_dmx_slots(&self) -> u16 {
        self.sequencer.timing().slots()
    }

    pub fn set_dmx_slots(&mut self, slots: u16) {
        self.sequencer.set_dmx_slots(slots);
    }

    /// Data to send continuously, start code first. The length sets the slot count.
    pub fn set_send_data(&mut self, data: &[u8]) -> Result<(), DmxPortError> {
        if data.is_empty() {
            return Err(DmxPortError::EmptyPayload);
        }

        if data.len() > DMX_MAX_PACKAGE_SIZE {
            return Err(DmxPortError::PayloadTooLong(data.len()));
        }

        self.sequencer.set_dmx_data(data);
        Ok(())
    }

    /// Like [DmxPort::set_send_data] with the DMX start code 0x00 in front of `slots`.
    pub fn set_send_data_without_start_code(&mut self, slots: &[u8]) -> Result<(), DmxPortError> {
        if slots.len() > DMX_MAX_SLOTS {
            return Err(DmxPortError::PayloadTooLong(slots.len()));
        }

        let mut frame = [0u8; DMX_MAX_PACKAGE_SIZE];
        frame[0] = DMX_NULL_START;
        frame[1..=slots.len()].copy_from_slice(slots);

        self.set_send_data(&frame[..=slots.len()])
    }

    pub fn get_send_data(&self) -> &[u8] {
        self.sequencer.dmx_data()
    }

    pub fn clear_data(&mut self) {
        self.sequencer.clear_data();
    }

    fn send_one_shot(
        &mut self,
        data: &[u8],
        with_break: bool,
        start_at: u32,
    ) -> Result<(), DmxPortError> {
        if data.is_empty() {
            return Err(DmxPortError::EmptyPayload);
        }

        if data.len() > RDM_MAX_PACKAGE_SIZE {
            return Err(DmxPortError::PayloadTooLong(data.len()));
        }

        if self.direction == PortDirection::Output && self.sequencer.is_busy() {
            return Err(DmxPortError::TransmitBusy);
        }

        // the driver is enabled once the turnaround has passed
        self.halt();
        if self.direction != PortDirection::Output {
            tracing::debug!("port direction {:?} -> {:?}", self.direction, PortDirection::Output);
        }
        self.direction = PortDirection::Output;
        self.sequencer
            .start_one_shot(&mut self.timer, data, with_break, start_at);

        Ok(())
    }

    /// When an answer to the last received RDM frame may start.
    fn turnaround_at(&self) -> u32 {
        let now = self.timer.now_micros();

        match self.last_rdm_received_at {
            Some(received_at) => {
                now.wrapping_add(remaining_micros(now, received_at, self.rdm_packet_spacing))
            },
            None => now,
        }
    }

    /// Sends break, mark after break and `data` once, then listens again.
    pub fn rdm_send_raw(&mut self, data: &[u8]) -> Result<(), DmxPortError> {
        let now = self.timer.now_micros();
        self.send_one_shot(data, true, now)
    }

    /// Sends `data` without a break once the responder packet spacing has passed since the
    /// last received RDM frame, then listens again. The receiver stops right away, the RS485
    /// driver is switched to output when the spacing is over.
    pub fn rdm_send_discovery_response(&mut self, data: &[u8]) -> Result<(), DmxPortError> {
        if self.direction != PortDirection::Input {
            return Err(DmxPortError::WrongDirection);
        }

        let start_at = self.turnaround_at();
        self.send_one_shot(data, false, start_at)
    }

    /// Sends an ACK/NACK response once the responder packet spacing has passed.
    pub fn rdm_send_response(&mut self, response: &RdmResponseData) -> Result<(), DmxPortError> {
        if self.direction != PortDirection::Input {
            return Err(DmxPortError::WrongDirection);
        }

        let package = RdmData::Response(response.clone()).serialize();
        let start_at = self.turnaround_at();
        self.send_one_shot(&package, true, start_at)
    }

    pub fn rdm_send_answer(&mut self, answer: RdmAnswer) -> Result<(), DmxPortError> {
        match answer {
            RdmAnswer::Response(response) => self.rdm_send_response(&response),
            RdmAnswer::DiscoveryResponse(uid) => {
                self.rdm_send_discovery_response(&encode_discovery_response(uid))
            },
            RdmAnswer::NoResponse => Ok(()),
        }
    }

    /// Call this function as often as you can. It takes one frame from the RDM ring, lets
    /// `responder` handle it and sends the answer.
    ///
    /// Returns false if no frame was waiting.
    pub fn poll_rdm_responder<HandlerError>(
        &mut self,
        responder: &mut RdmResponder,
        handler: &mut dyn RdmResponderHandlerFunc<Error = HandlerError>,
    ) -> Result<bool, PollingError<HandlerError>> {
        let frame = match self.shared.rdm_receive() {
            None => return Ok(false),
            Some(frame) => frame,
        };

        if frame.kind() != RdmFrameKind::Message {
            return Err(PollingError::NotMatching);
        }

        let request = match RdmData::deserialize(&frame.data) {
            Ok(RdmData::Request(request)) => request,
            Ok(RdmData::Response(_)) => return Err(PollingError::NotMatching),
            Err(error) => return Err(PollingError::DeserializationError(error)),
        };

        let answer = responder
            .handle_rdm_request(request, handler)
            .map_err(PollingError::HandlerError)?;
        self.rdm_send_answer(answer)?;

        Ok(true)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.statistics()
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Gives the hardware back.
    pub fn release(self) -> (U, T, D) {
        (self.uart, self.timer, self.direction_pin)
    }
}
