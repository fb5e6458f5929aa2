//! Interrupt driven DMX512 (ANSI E1.11) and DMX-RDM (ANSI E1.20) line transceiver for UARTs
//! attached to a RS485 bus. This library features no-std as well as no-alloc support
//! (no heap allocation) and runs on any MCU with a UART that reports bytes and breaks, a free
//! running microsecond timer and a GPIO for the driver enable.
//!
//! Please refer to the [official specifications](https://tsp.esta.org/) published by the ESTA.
//!
//! <div class="warning">This library is wip, it has not yet received extensive testing and the api
//! might not be final.</div>
//!
//! # Structure
//!
//! A [dmx_port::DmxPort] owns the hardware and is driven by two interrupts:
//! [dmx_port::DmxPort::on_uart_event] for every received byte or break and
//! [dmx_port::DmxPort::on_timer] for the timer compare channels. Received frames are published
//! into a [dmx_port::DmxPortShared], which the rest of the firmware reads without touching the
//! port.
//!
//! # Usage
//!
//! ## Receiver
//!
//! ```rust
//! use dmx_rdm_transceiver::dmx_port::{DmxPort, DmxPortConfig, DmxPortShared, PortDirection};
//! use dmx_rdm_transceiver::dmx_receiver::LineEvent;
//! use dmx_rdm_transceiver::dmx_uart_driver::{DirectionPin, DmxTimer, DmxUart, TimerChannel};
//! # struct Uart;
//! # impl DmxUart for Uart {
//! #     fn write_byte(&mut self, _byte: u8) {}
//! #     fn is_tx_full(&self) -> bool { false }
//! #     fn is_tx_busy(&self) -> bool { false }
//! #     fn set_break(&mut self, _enable: bool) {}
//! #     fn enable_receive(&mut self) {}
//! #     fn enable_transmit(&mut self) {}
//! #     fn disable(&mut self) {}
//! # }
//! # struct Timer(u32);
//! # impl DmxTimer for Timer {
//! #     fn now_micros(&self) -> u32 { self.0 }
//! #     fn schedule(&mut self, _channel: TimerChannel, _at: u32) {}
//! #     fn cancel(&mut self, _channel: TimerChannel) {}
//! # }
//! # struct Pin;
//! # impl DirectionPin for Pin {
//! #     fn set_output(&mut self) {}
//! #     fn set_input(&mut self) {}
//! # }
//!
//! static SHARED: DmxPortShared = DmxPortShared::new();
//!
//! let mut port = DmxPort::new(&SHARED, Uart, Timer(1_000), Pin, DmxPortConfig::default());
//! port.set_port_direction(PortDirection::Input, true);
//!
//! let consumer = SHARED.subscribe().unwrap();
//!
//! // What the uart interrupt reports for a frame with three slots.
//! port.on_uart_event(LineEvent::Break { at: 0 });
//! for (slot, data) in [0x00, 10, 20, 30].into_iter().enumerate() {
//!     port.on_uart_event(LineEvent::Byte { data, at: 200 + slot as u32 * 44 });
//! }
//! // No more bytes, the slot timer closes the frame.
//! port.on_timer(TimerChannel::Slot);
//!
//! let frame = SHARED.dmx_receive(consumer).unwrap();
//! assert_eq!(frame.as_slice(), &[0x00, 10, 20, 30]);
//! ```
//!
//! ## Responder
//!
//! ```rust,no_run
//! use dmx_rdm_transceiver::dmx_port::DmxPort;
//! use dmx_rdm_transceiver::dmx_uart_driver::{DirectionPin, DmxTimer, DmxUart};
//! use dmx_rdm_transceiver::rdm_data::RdmRequestData;
//! use dmx_rdm_transceiver::rdm_responder::{
//!     RdmResponder, RdmResponderConfig, RdmResponderContext, RdmResponderHandlerFunc, RdmResult,
//! };
//! use dmx_rdm_transceiver::rdm_types::{DataPack, NackReason, RequestCommandClass};
//! use dmx_rdm_transceiver::unique_identifier::UniqueIdentifier;
//!
//! struct RdmHandler {
//!     identify: bool,
//! }
//!
//! const PID_IDENTIFY_DEVICE: u16 = 0x1000;
//!
//! impl RdmResponderHandlerFunc for RdmHandler {
//!     type Error = core::convert::Infallible;
//!
//!     fn handle_rdm(
//!         &mut self,
//!         request: &RdmRequestData,
//!         _: &mut RdmResponderContext,
//!     ) -> Result<RdmResult, Self::Error> {
//!         Ok(match (request.parameter_id, request.command_class) {
//!             (PID_IDENTIFY_DEVICE, RequestCommandClass::GetCommand) => {
//!                 RdmResult::Acknowledged(DataPack::from_slice(&[self.identify as u8]).unwrap())
//!             },
//!             (PID_IDENTIFY_DEVICE, RequestCommandClass::SetCommand) => {
//!                 match request.parameter_data.as_slice() {
//!                     [identify] => {
//!                         self.identify = *identify != 0;
//!                         RdmResult::Acknowledged(DataPack::new())
//!                     },
//!                     _ => RdmResult::NotAcknowledged(NackReason::FormatError as u16),
//!                 }
//!             },
//!             _ => RdmResult::NotAcknowledged(NackReason::UnknownPid as u16),
//!         })
//!     }
//! }
//!
//! fn main_loop<U: DmxUart, T: DmxTimer, D: DirectionPin>(port: &mut DmxPort<U, T, D>) -> ! {
//!     let mut responder =
//!         RdmResponder::new(RdmResponderConfig::new(UniqueIdentifier::new(0x7FF0, 1).unwrap()));
//!     let mut rdm_handler = RdmHandler { identify: false };
//!
//!     loop {
//!         // In a real firmware the port sits in a critical section mutex.
//!         if let Err(error) = port.poll_rdm_responder(&mut responder, &mut rdm_handler) {
//!             println!("'{error}' during polling");
//!         }
//!     }
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod consts;
/// Last received DMX frame with per consumer acknowledge bits.
pub mod dmx_buffer;
/// The engine of one port.
pub mod dmx_port;
/// Byte level receive state machine.
pub mod dmx_receiver;
/// Timer driven transmit state machine.
pub mod dmx_transmitter;
/// Traits the hardware has to implement.
pub mod dmx_uart_driver;
mod layouts;
pub mod pids;
pub mod rdm_data;
/// Parser for handling rdm requests without an underlying driver.
/// Mainly for highly interrupt driven applications.
pub mod rdm_responder;
/// Captured RDM frames, from the receive interrupt to the foreground.
pub mod rdm_ring;
pub mod rdm_types;
pub mod statistics;
pub mod timing;
pub mod unique_identifier;
pub mod utils;
