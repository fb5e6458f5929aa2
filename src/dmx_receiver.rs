//! Byte level receive state machine.
//!
//! [ReceiveFramer::step] is called for every break and every byte the uart reports. It never
//! fails: anything unexpected drops the frame in progress and waits for the next break.

use crate::consts::{
    DISCOVERY_PREAMBLE_MAX_LENGTH, DMX_MAX_PACKAGE_SIZE, DMX_NULL_START,
    RDM_DISCOVERY_RESPONSE_SIZE, RDM_MAX_DISCOVERY_RESPONSE_SIZE, RDM_MAX_PACKAGE_SIZE,
    RDM_MESSAGE_MIN_LENGTH, RECEIVE_SLOT_TIMEOUT_GUARD_MICROS, PREAMBLE_BYTE, SC_RDM,
    SC_SUB_MESSAGE, SEPARATOR_BYTE, SLOT_TIME_MICROS,
};
use crate::utils::elapsed_micros;

/// What the uart interrupt saw. `at` is the timer value when it happened.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineEvent {
    Break { at: u32 },
    Byte { data: u8, at: u32 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveState {
    Idle,
    /// Waiting for the start code. The uart only reports the break itself, so this also
    /// covers the mark after break.
    Break,
    DmxData,
    RdmData,
    RdmChecksumHigh,
    RdmChecksumLow,
    DiscoveryPreamble,
    DiscoveryUid,
    DiscoveryChecksum,
}

/// A frame that is complete. The data borrows the framer and is valid until the next event.
#[derive(Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceivedFrame<'a> {
    /// Start code and slots of a DMX frame.
    Dmx {
        data: &'a [u8],
        /// Microseconds between the last two bytes.
        slot_to_slot: u32,
        /// Microseconds since the break of the previous DMX frame, if that one was DMX too.
        break_to_break: Option<u32>,
    },
    /// A complete RDM message with a valid checksum, checksum included.
    Rdm { data: &'a [u8], received_at: u32 },
    /// Preamble, separator, masked uid and masked checksum. Not validated.
    DiscoveryResponse { data: &'a [u8], received_at: u32 },
    /// An RDM message failed the checksum or sub start code check and was dropped.
    RdmRejected,
}

/// What the slot timer has to do after [ReceiveFramer::on_timeout].
#[derive(Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutAction<'a> {
    /// Nothing is waiting for a timeout.
    Idle,
    /// Bytes came in since the timer was armed, fire again at this time.
    Rearm(u32),
    /// A short DMX frame was closed.
    Closed(ReceivedFrame<'a>),
}

pub struct ReceiveFramer {
    state: ReceiveState,
    dmx_data: [u8; DMX_MAX_PACKAGE_SIZE],
    rdm_data: [u8; RDM_MAX_PACKAGE_SIZE],
    index: usize,
    checksum: u16,
    preamble_length: usize,
    last_byte_at: u32,
    slot_to_slot: u32,
    break_at: u32,
    previous_dmx_break_at: Option<u32>,
    break_to_break: Option<u32>,
    deadline: Option<u32>,
    capture_discovery: bool,
    timeout_guard: u32,
}

impl Default for ReceiveFramer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ReceiveFramer {
    pub const fn new(capture_discovery: bool) -> Self {
        Self {
            state: ReceiveState::Idle,
            dmx_data: [0; DMX_MAX_PACKAGE_SIZE],
            rdm_data: [0; RDM_MAX_PACKAGE_SIZE],
            index: 0,
            checksum: 0,
            preamble_length: 0,
            last_byte_at: 0,
            slot_to_slot: SLOT_TIME_MICROS,
            break_at: 0,
            previous_dmx_break_at: None,
            break_to_break: None,
            deadline: None,
            capture_discovery,
            timeout_guard: RECEIVE_SLOT_TIMEOUT_GUARD_MICROS,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Collect discovery responses that arrive without a break.
    pub fn set_capture_discovery(&mut self, enable: bool) {
        self.capture_discovery = enable;
    }

    pub fn set_timeout_guard(&mut self, guard: u32) {
        self.timeout_guard = guard;
    }

    /// When the slot timer has to fire, None if no frame is waiting for a timeout.
    pub fn deadline(&self) -> Option<u32> {
        self.deadline
    }

    /// Drops whatever is in progress, used when the port stops receiving.
    pub fn reset(&mut self) {
        self.state = ReceiveState::Idle;
        self.deadline = None;
        self.previous_dmx_break_at = None;
    }

    fn slot_timeout(&self) -> u32 {
        self.slot_to_slot.max(SLOT_TIME_MICROS) + self.timeout_guard
    }

    fn arm(&mut self, at: u32) {
        self.deadline = Some(at.wrapping_add(self.slot_timeout()));
    }

    fn to_idle(&mut self) {
        self.state = ReceiveState::Idle;
        self.deadline = None;
    }

    pub fn step(&mut self, event: LineEvent) -> Option<ReceivedFrame<'_>> {
        let (data, at) = match event {
            LineEvent::Break { at } => {
                self.state = ReceiveState::Break;
                self.deadline = None;
                self.break_at = at;
                return None;
            },
            LineEvent::Byte { data, at } => (data, at),
        };

        let previous_byte_at = self.last_byte_at;
        self.last_byte_at = at;

        match self.state {
            ReceiveState::Idle => {
                if self.capture_discovery && data == PREAMBLE_BYTE {
                    self.rdm_data[0] = data;
                    self.index = 1;
                    self.preamble_length = 1;
                    self.slot_to_slot = SLOT_TIME_MICROS;
                    self.state = ReceiveState::DiscoveryPreamble;
                    self.arm(at);
                }
                None
            },
            ReceiveState::Break => {
                self.start_code(data, at);
                None
            },
            ReceiveState::DmxData => {
                self.slot_to_slot = elapsed_micros(at, previous_byte_at);
                self.dmx_data[self.index] = data;
                self.index += 1;

                if self.index == DMX_MAX_PACKAGE_SIZE {
                    self.to_idle();
                    return Some(self.dmx_frame());
                }

                self.arm(at);
                None
            },
            ReceiveState::RdmData => {
                self.rdm_data[self.index] = data;
                self.index += 1;
                self.checksum = self.checksum.wrapping_add(data as u16);

                let message_length = self.rdm_data[2] as usize;
                if self.index == 3 && message_length < RDM_MESSAGE_MIN_LENGTH {
                    self.to_idle();
                } else if self.index >= 3 && self.index == message_length {
                    self.state = ReceiveState::RdmChecksumHigh;
                }
                None
            },
            ReceiveState::RdmChecksumHigh => {
                self.rdm_data[self.index] = data;
                self.index += 1;
                self.checksum = self.checksum.wrapping_sub((data as u16) << 8);
                self.state = ReceiveState::RdmChecksumLow;
                None
            },
            ReceiveState::RdmChecksumLow => {
                self.rdm_data[self.index] = data;
                self.index += 1;
                self.checksum = self.checksum.wrapping_sub(data as u16);
                self.to_idle();

                if self.checksum != 0 || self.rdm_data[1] != SC_SUB_MESSAGE {
                    return Some(ReceivedFrame::RdmRejected);
                }

                Some(ReceivedFrame::Rdm {
                    data: &self.rdm_data[..self.index],
                    received_at: at,
                })
            },
            ReceiveState::DiscoveryPreamble => {
                self.slot_to_slot = elapsed_micros(at, previous_byte_at);
                match data {
                    PREAMBLE_BYTE if self.preamble_length < DISCOVERY_PREAMBLE_MAX_LENGTH => {
                        self.rdm_data[self.index] = data;
                        self.index += 1;
                        self.preamble_length += 1;
                        self.arm(at);
                    },
                    SEPARATOR_BYTE => {
                        self.rdm_data[self.index] = data;
                        self.index += 1;
                        self.state = ReceiveState::DiscoveryUid;
                        self.arm(at);
                    },
                    _ => self.to_idle(),
                }
                None
            },
            ReceiveState::DiscoveryUid | ReceiveState::DiscoveryChecksum => {
                self.slot_to_slot = elapsed_micros(at, previous_byte_at);
                self.rdm_data[self.index] = data;
                self.index += 1;

                // preamble and separator
                let body_length = self.index - self.preamble_length - 1;
                if body_length == RDM_DISCOVERY_RESPONSE_SIZE {
                    self.to_idle();
                    debug_assert!(self.index <= RDM_MAX_DISCOVERY_RESPONSE_SIZE);
                    return Some(ReceivedFrame::DiscoveryResponse {
                        data: &self.rdm_data[..self.index],
                        received_at: at,
                    });
                }

                if body_length == 12 {
                    self.state = ReceiveState::DiscoveryChecksum;
                }
                self.arm(at);
                None
            },
        }
    }

    fn start_code(&mut self, data: u8, at: u32) {
        match data {
            DMX_NULL_START => {
                self.break_to_break = self
                    .previous_dmx_break_at
                    .map(|previous| elapsed_micros(self.break_at, previous));
                self.previous_dmx_break_at = Some(self.break_at);

                self.dmx_data[0] = data;
                self.index = 1;
                self.slot_to_slot = SLOT_TIME_MICROS;
                self.state = ReceiveState::DmxData;
                self.arm(at);
            },
            SC_RDM => {
                self.previous_dmx_break_at = None;
                self.rdm_data[0] = data;
                self.index = 1;
                self.checksum = data as u16;
                self.state = ReceiveState::RdmData;
            },
            _ => {
                self.previous_dmx_break_at = None;
                self.to_idle();
            },
        }
    }

    fn dmx_frame(&self) -> ReceivedFrame<'_> {
        ReceivedFrame::Dmx {
            data: &self.dmx_data[..self.index],
            slot_to_slot: self.slot_to_slot,
            break_to_break: self.break_to_break,
        }
    }

    /// Called when the slot timer fires. Closes the frame only if it is still collecting and no
    /// byte came in for a full slot timeout, otherwise asks to be called again.
    pub fn on_timeout(&mut self, now: u32) -> TimeoutAction<'_> {
        match self.state {
            ReceiveState::DmxData
            | ReceiveState::DiscoveryPreamble
            | ReceiveState::DiscoveryUid
            | ReceiveState::DiscoveryChecksum => {},
            _ => {
                self.deadline = None;
                return TimeoutAction::Idle;
            },
        }

        if elapsed_micros(now, self.last_byte_at) < self.slot_timeout() {
            self.arm(self.last_byte_at);
            return self
                .deadline
                .map_or(TimeoutAction::Idle, TimeoutAction::Rearm);
        }

        let state = self.state;
        self.to_idle();

        if state == ReceiveState::DmxData {
            return TimeoutAction::Closed(self.dmx_frame());
        }

        // an incomplete discovery response
        TimeoutAction::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdm_data::{encode_discovery_response, RdmData, RdmRequestData};
    use crate::rdm_types::{DataPack, RequestCommandClass};
    use crate::unique_identifier::{PackageAddress, UniqueIdentifier};
    use proptest::prelude::*;

    struct Line {
        now: u32,
    }

    impl Line {
        fn new() -> Self {
            Self { now: 1_000 }
        }

        fn brk(&mut self) -> LineEvent {
            self.now += 176 + 16;
            LineEvent::Break { at: self.now - 16 }
        }

        fn byte(&mut self, data: u8) -> LineEvent {
            self.now += SLOT_TIME_MICROS;
            LineEvent::Byte { data, at: self.now }
        }
    }

    fn owned(frame: Option<ReceivedFrame<'_>>) -> Option<(u8, Vec<u8>)> {
        match frame? {
            ReceivedFrame::Dmx { data, .. } => Some((0, data.to_vec())),
            ReceivedFrame::Rdm { data, .. } => Some((1, data.to_vec())),
            ReceivedFrame::DiscoveryResponse { data, .. } => Some((2, data.to_vec())),
            ReceivedFrame::RdmRejected => Some((3, Vec::new())),
        }
    }

    fn rdm_request(parameter_data: &[u8]) -> Vec<u8> {
        RdmData::Request(RdmRequestData {
            destination_uid: PackageAddress::Broadcast,
            source_uid: UniqueIdentifier::new(0x7FF0, 0x0102_0304).unwrap(),
            transaction_number: 9,
            port_id: 1,
            message_count: 0,
            sub_device: 0,
            command_class: RequestCommandClass::DiscoveryCommand,
            parameter_id: 0x0001,
            parameter_data: DataPack::from_slice(parameter_data).unwrap(),
        })
        .serialize()
        .to_vec()
    }

    fn feed(framer: &mut ReceiveFramer, line: &mut Line, bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut frames = Vec::new();
        for &byte in bytes {
            let event = line.byte(byte);
            if let Some(frame) = owned(framer.step(event)) {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_full_universe() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        let mut frame = vec![DMX_NULL_START];
        frame.extend((0..512).map(|slot| slot as u8));

        assert!(framer.step(line.brk()).is_none());
        let frames = feed(&mut framer, &mut line, &frame);

        assert_eq!(frames, vec![(0, frame)]);
        assert_eq!(framer.state(), ReceiveState::Idle);
        assert_eq!(framer.deadline(), None);
    }

    #[test]
    fn test_short_frame_closed_by_timeout() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        framer.step(line.brk());
        let frame: Vec<u8> = core::iter::once(0).chain(1..=40).collect();
        assert!(feed(&mut framer, &mut line, &frame).is_empty());

        let last_byte_at = line.now;
        let deadline = framer.deadline().unwrap();
        assert_eq!(deadline, last_byte_at + SLOT_TIME_MICROS + 12);

        // too early, the timer was armed for a byte that came in later
        assert_eq!(
            framer.on_timeout(last_byte_at + 20),
            TimeoutAction::Rearm(deadline)
        );

        match framer.on_timeout(deadline) {
            TimeoutAction::Closed(ReceivedFrame::Dmx { data, slot_to_slot, .. }) => {
                assert_eq!(data, frame.as_slice());
                assert_eq!(data.len() - 1, 40);
                assert_eq!(slot_to_slot, SLOT_TIME_MICROS);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(framer.on_timeout(deadline + 100), TimeoutAction::Idle);
    }

    #[test]
    fn test_timeout_adapts_to_slow_transmitters() {
        let mut framer = ReceiveFramer::new(false);
        framer.step(LineEvent::Break { at: 0 });
        framer.step(LineEvent::Byte { data: 0, at: 200 });
        framer.step(LineEvent::Byte { data: 1, at: 300 });

        assert_eq!(framer.deadline(), Some(300 + 100 + 12));
    }

    #[test]
    fn test_break_to_break() {
        let mut framer = ReceiveFramer::new(false);

        framer.step(LineEvent::Break { at: 0 });
        framer.step(LineEvent::Byte { data: 0, at: 200 });
        framer.step(LineEvent::Break { at: 22_000 });
        framer.step(LineEvent::Byte { data: 0, at: 22_200 });
        framer.step(LineEvent::Byte { data: 7, at: 22_244 });

        match framer.on_timeout(30_000) {
            TimeoutAction::Closed(ReceivedFrame::Dmx { break_to_break, .. }) => {
                assert_eq!(break_to_break, Some(22_000));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rdm_message() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();
        let message = rdm_request(&[0; 12]);

        framer.step(line.brk());
        let frames = feed(&mut framer, &mut line, &message);
        assert_eq!(frames, vec![(1, message)]);
    }

    #[test]
    fn test_rdm_wrong_sub_start_code() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();
        let mut message = rdm_request(&[]);
        message[1] = 0x02;
        let length = message.len();
        let checksum = crate::utils::calculate_checksum(&message[..length - 2]);
        message[length - 2..].copy_from_slice(&checksum.to_be_bytes());

        framer.step(line.brk());
        assert_eq!(
            feed(&mut framer, &mut line, &message),
            vec![(3, Vec::new())]
        );
    }

    #[test]
    fn test_rdm_message_length_too_small() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        framer.step(line.brk());
        feed(&mut framer, &mut line, &[SC_RDM, SC_SUB_MESSAGE, 3]);
        assert_eq!(framer.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_unknown_start_code_ignored() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        framer.step(line.brk());
        assert!(feed(&mut framer, &mut line, &[0x17, 1, 2, 3]).is_empty());
        assert_eq!(framer.state(), ReceiveState::Idle);
        assert_eq!(framer.deadline(), None);
    }

    #[test]
    fn test_break_discards_frame_in_progress() {
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        framer.step(line.brk());
        feed(&mut framer, &mut line, &[0, 1, 2, 3]);
        framer.step(line.brk());
        assert_eq!(framer.state(), ReceiveState::Break);
        assert_eq!(framer.deadline(), None);
    }

    #[test]
    fn test_discovery_response_capture() {
        let uid = UniqueIdentifier::new(0x1234, 0x5678_9ABC).unwrap();
        let response = encode_discovery_response(uid);

        let mut framer = ReceiveFramer::new(true);
        let mut line = Line::new();
        assert_eq!(
            feed(&mut framer, &mut line, &response),
            vec![(2, response.to_vec())]
        );

        // shortened preamble
        assert_eq!(
            feed(&mut framer, &mut line, &response[5..]),
            vec![(2, response[5..].to_vec())]
        );
    }

    #[test]
    fn test_discovery_response_ignored_without_capture() {
        let uid = UniqueIdentifier::new(0x1234, 0x5678_9ABC).unwrap();
        let mut framer = ReceiveFramer::new(false);
        let mut line = Line::new();

        assert!(feed(&mut framer, &mut line, &encode_discovery_response(uid)).is_empty());
    }

    #[test]
    fn test_discovery_response_too_much_preamble() {
        let mut framer = ReceiveFramer::new(true);
        let mut line = Line::new();

        feed(&mut framer, &mut line, &[PREAMBLE_BYTE; 8]);
        assert_eq!(framer.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_incomplete_discovery_response_dropped_on_timeout() {
        let mut framer = ReceiveFramer::new(true);
        let mut line = Line::new();

        feed(&mut framer, &mut line, &[PREAMBLE_BYTE, SEPARATOR_BYTE, 0xAA, 0x55]);
        let deadline = framer.deadline().unwrap();
        assert_eq!(framer.on_timeout(deadline), TimeoutAction::Idle);
        assert_eq!(framer.state(), ReceiveState::Idle);
    }

    proptest! {
        #[test]
        fn dmx_frames_of_any_length(payload in proptest::collection::vec(any::<u8>(), 1..=512)) {
            let mut framer = ReceiveFramer::new(false);
            let mut line = Line::new();
            let mut frame = vec![DMX_NULL_START];
            frame.extend_from_slice(&payload);

            framer.step(line.brk());
            let mut frames = feed(&mut framer, &mut line, &frame);

            if let Some(deadline) = framer.deadline() {
                if let TimeoutAction::Closed(closed) = framer.on_timeout(deadline) {
                    frames.extend(owned(Some(closed)));
                }
            }

            prop_assert_eq!(frames, vec![(0, frame)]);
        }

        #[test]
        fn single_bit_corruption_is_dropped(
            parameter_data in proptest::collection::vec(any::<u8>(), 0..=24),
            position in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut framer = ReceiveFramer::new(false);
            let mut line = Line::new();
            let mut message = rdm_request(&parameter_data);
            let position = position.index(message.len());
            // a different message length changes where the checksum is expected
            prop_assume!(position != 2);
            message[position] ^= 1 << bit;

            framer.step(line.brk());
            let frames = feed(&mut framer, &mut line, &message);
            prop_assert!(frames.iter().all(|(kind, _)| *kind != 1));
        }

        #[test]
        fn resync_after_garbage(
            garbage in proptest::collection::vec(any::<u8>(), 0..600),
            break_in_garbage in any::<bool>(),
        ) {
            let mut framer = ReceiveFramer::new(true);
            let mut line = Line::new();

            if break_in_garbage {
                framer.step(line.brk());
            }
            for &byte in &garbage {
                let event = line.byte(byte);
                let _ = framer.step(event);
            }

            let message = rdm_request(&[1, 2, 3]);
            framer.step(line.brk());
            let frames = feed(&mut framer, &mut line, &message);
            prop_assert_eq!(frames, vec![(1, message)]);
        }
    }
}
