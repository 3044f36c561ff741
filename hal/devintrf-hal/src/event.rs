//! Transport events
//!
//! Transports report asynchronous conditions (data arrived, FIFO full,
//! timeouts) through an optional callback registered on the handle.
//! Callbacks normally run inside an interrupt handler and must not block.

/// Device interface event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Receive timed out
    RxTimeout,
    /// Data received
    RxData,
    /// Receive FIFO full; the oldest data is dropped if the callback
    /// consumes nothing
    RxFifoFull,
    /// Transmit timed out
    TxTimeout,
    /// Ready to transmit
    TxReady,
    /// Transmit FIFO full; the oldest data is dropped if the callback
    /// consumes nothing
    TxFifoFull,
    /// State changed. State data is transport specific (line state for a
    /// UART, for example)
    StateChange,
}

impl Event {
    /// Check if this is one of the FIFO-full events
    pub fn is_fifo_full(self) -> bool {
        matches!(self, Event::RxFifoFull | Event::TxFifoFull)
    }

    /// Check if this event concerns the receive direction
    pub fn is_rx(self) -> bool {
        matches!(self, Event::RxTimeout | Event::RxData | Event::RxFifoFull)
    }
}

/// Data passed along with an event
#[derive(Debug)]
pub enum EventData<'a> {
    /// Event carries no data
    None,
    /// Received data, data to transmit (up to the slice length), or state
    /// data, depending on the event
    Buffer(&'a mut [u8]),
    /// The transport keeps its own FIFO, currently holding this many bytes
    Fifo(usize),
}

impl EventData<'_> {
    /// Length of the data attached to the event
    pub fn len(&self) -> usize {
        match self {
            EventData::None => 0,
            EventData::Buffer(buf) => buf.len(),
            EventData::Fifo(len) => *len,
        }
    }

    /// Check if no data is attached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event callback
///
/// Returns the number of bytes processed. For FIFO-full events a return of
/// zero lets the transport push the oldest data out.
pub type EventCallback = fn(Event, EventData<'_>) -> usize;
