//! Hardware a [crate::dmx_port::DmxPort] runs on.
//!
//! Implementations only touch registers, they never block and never keep state of their own
//! about DMX frames. All three traits are called from interrupt context.

/// Object to implement access to the uart.
/// It has to communicate at 250000 baud, 8 data bits, no parity, 2 stop bits.
pub trait DmxUart {
    /// Puts one byte into the transmit fifo. Only called after [DmxUart::is_tx_full]
    /// returned false.
    fn write_byte(&mut self, byte: u8);

    /// True while the transmit fifo can't take another byte.
    fn is_tx_full(&self) -> bool;

    /// True until the last stop bit has left the shift register.
    fn is_tx_busy(&self) -> bool;

    /// Drives the line low (break) or releases it (mark).
    fn set_break(&mut self, enable: bool);

    /// Enables the byte received and break detected interrupts.
    fn enable_receive(&mut self);

    /// Enables the transmitter, the line idles at mark.
    fn enable_transmit(&mut self);

    /// Disables both directions and all uart interrupts.
    fn disable(&mut self);
}

/// The two compare channels of the timer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerChannel {
    /// Receive slot timeout and transmit sequencing. Shared since the bus is half duplex.
    Slot,
    /// Once per second bookkeeping.
    Housekeeping,
}

/// A free running microsecond timer with two compare channels.
pub trait DmxTimer {
    /// Current time in microseconds. Wraps at `u32::MAX`.
    fn now_micros(&self) -> u32;

    /// Fires [crate::dmx_port::DmxPort::on_timer] for `channel` once `now_micros() == at`.
    /// Replaces a compare value that is still pending.
    fn schedule(&mut self, channel: TimerChannel, at: u32);

    fn cancel(&mut self, channel: TimerChannel);
}

/// Driver enable pin of the RS485 transceiver.
pub trait DirectionPin {
    fn set_output(&mut self);

    fn set_input(&mut self);
}
