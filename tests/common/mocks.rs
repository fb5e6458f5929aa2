//! Simulated uart, timer and direction pin sharing one clock and one event log.

use std::cell::RefCell;
use std::rc::Rc;

use dmx_rdm_transceiver::consts::SLOT_TIME_MICROS;
use dmx_rdm_transceiver::dmx_port::{DmxPort, DmxPortConfig, DmxPortShared};
use dmx_rdm_transceiver::dmx_receiver::LineEvent;
use dmx_rdm_transceiver::dmx_uart_driver::{DirectionPin, DmxTimer, DmxUart, TimerChannel};

/// Everything the port did to the hardware, in order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HwEvent {
    UartDisabled,
    ReceiveEnabled,
    TransmitEnabled,
    Break { enable: bool, at: u32 },
    Byte { data: u8, at: u32 },
    PinOutput,
    PinInput,
}

#[derive(Debug, Default)]
pub struct Hardware {
    pub now: u32,
    pub events: Vec<HwEvent>,
    /// Compare values indexed by [channel_index].
    pub scheduled: [Option<u32>; 2],
}

impl Hardware {
    pub fn written(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HwEvent::Byte { data, .. } => Some(*data),
                _ => None,
            })
            .collect()
    }

    pub fn break_starts(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HwEvent::Break { enable: true, at } => Some(*at),
                _ => None,
            })
            .collect()
    }
}

pub type SharedHardware = Rc<RefCell<Hardware>>;

pub fn channel_index(channel: TimerChannel) -> usize {
    match channel {
        TimerChannel::Slot => 0,
        TimerChannel::Housekeeping => 1,
    }
}

pub struct MockUart(pub SharedHardware);

impl DmxUart for MockUart {
    /// Every byte takes one slot time on the line.
    fn write_byte(&mut self, byte: u8) {
        let mut hardware = self.0.borrow_mut();
        let at = hardware.now;
        hardware.events.push(HwEvent::Byte { data: byte, at });
        hardware.now += SLOT_TIME_MICROS;
    }

    fn is_tx_full(&self) -> bool {
        false
    }

    fn is_tx_busy(&self) -> bool {
        false
    }

    fn set_break(&mut self, enable: bool) {
        let mut hardware = self.0.borrow_mut();
        let at = hardware.now;
        hardware.events.push(HwEvent::Break { enable, at });
    }

    fn enable_receive(&mut self) {
        self.0.borrow_mut().events.push(HwEvent::ReceiveEnabled);
    }

    fn enable_transmit(&mut self) {
        self.0.borrow_mut().events.push(HwEvent::TransmitEnabled);
    }

    fn disable(&mut self) {
        self.0.borrow_mut().events.push(HwEvent::UartDisabled);
    }
}

pub struct MockTimer(pub SharedHardware);

impl DmxTimer for MockTimer {
    fn now_micros(&self) -> u32 {
        self.0.borrow().now
    }

    fn schedule(&mut self, channel: TimerChannel, at: u32) {
        self.0.borrow_mut().scheduled[channel_index(channel)] = Some(at);
    }

    fn cancel(&mut self, channel: TimerChannel) {
        self.0.borrow_mut().scheduled[channel_index(channel)] = None;
    }
}

pub struct MockPin(pub SharedHardware);

impl DirectionPin for MockPin {
    fn set_output(&mut self) {
        self.0.borrow_mut().events.push(HwEvent::PinOutput);
    }

    fn set_input(&mut self) {
        self.0.borrow_mut().events.push(HwEvent::PinInput);
    }
}

pub type MockPort<'a> = DmxPort<'a, MockUart, MockTimer, MockPin>;

pub fn new_port(shared: &DmxPortShared, config: DmxPortConfig) -> (MockPort<'_>, SharedHardware) {
    let hardware = SharedHardware::default();
    let port = DmxPort::new(
        shared,
        MockUart(hardware.clone()),
        MockTimer(hardware.clone()),
        MockPin(hardware.clone()),
        config,
    );

    (port, hardware)
}

/// Runs the clock up to `until`, firing every compare value on the way in order.
pub fn advance_to(port: &mut MockPort<'_>, hardware: &SharedHardware, until: u32) {
    loop {
        let next = {
            let hardware = hardware.borrow();
            [TimerChannel::Slot, TimerChannel::Housekeeping]
                .into_iter()
                .filter_map(|channel| {
                    hardware.scheduled[channel_index(channel)]
                        .filter(|at| *at <= until)
                        .map(|at| (channel, at))
                })
                .min_by_key(|(_, at)| *at)
        };

        let Some((channel, at)) = next else {
            break;
        };

        {
            let mut hardware = hardware.borrow_mut();
            hardware.scheduled[channel_index(channel)] = None;
            hardware.now = hardware.now.max(at);
        }
        port.on_timer(channel);
    }

    let mut hardware = hardware.borrow_mut();
    hardware.now = hardware.now.max(until);
}

/// Puts `bytes` on the line one slot apart, optionally after a break and mark after break.
/// Returns when the last byte arrived.
pub fn receive(
    port: &mut MockPort<'_>,
    hardware: &SharedHardware,
    bytes: &[u8],
    with_break: bool,
) -> u32 {
    let mut at = hardware.borrow().now;

    if with_break {
        advance_to(port, hardware, at);
        port.on_uart_event(LineEvent::Break { at });
        at += 176 + 16;
    }

    for &data in bytes {
        at += SLOT_TIME_MICROS;
        advance_to(port, hardware, at);
        port.on_uart_event(LineEvent::Byte { data, at });
    }

    at
}
