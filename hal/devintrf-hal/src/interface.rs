//! Transport trait
//!
//! [`DeviceInterface`] is what a concrete transport implements. Drivers do
//! not call these methods directly; they go through [`DeviceHandle`], which
//! adds the busy flag, the enable reference count and retries.
//!
//! [`DeviceHandle`]: crate::DeviceHandle

/// Data transport implementation
///
/// Every method takes `&self`: the owning handle may be shared between
/// thread mode and interrupt handlers, so implementations keep their
/// mutable state behind a critical-section mutex or atomics.
///
/// Operations a transport has no use for keep their default no-op body.
/// Data operations must be bounded and must not block indefinitely, since
/// they can be called from interrupt context.
pub trait DeviceInterface {
    /// Error returned when a transfer cannot be started
    type Error;

    /// Power up the interface
    ///
    /// Called by the handle only on the first enable.
    fn enable(&self) {}

    /// Power down the interface for energy saving
    ///
    /// Called by the handle only when the last user disables it. The
    /// interface must be able to come back through [`enable`](Self::enable)
    /// without a full re-initialization.
    fn disable(&self) {}

    /// Current transfer rate in transfers per second
    ///
    /// This is not a clock frequency. Depending on the transport it means
    /// bits/s, bytes/s or whatever unit of transfer applies.
    fn rate(&self) -> u32;

    /// Set the transfer rate in transfers per second
    ///
    /// # Returns
    /// The rate actually applied: the achievable rate closest to the
    /// requested one.
    fn set_rate(&self, rate: u32) -> u32;

    /// Prepare to receive with subsequent [`rx_data`](Self::rx_data) calls
    ///
    /// Start condition for I2C, chip select for SPI, DMA setup, or nothing.
    /// When called while a transmit bracket is still open this is a
    /// repeated start: the transmit phase must not be terminated.
    ///
    /// # Arguments
    /// * `dev_addr` - Device selection (bus address, chip select index, ...)
    fn start_rx(&self, dev_addr: u32) -> Result<(), Self::Error>;

    /// Receive into `buf`
    ///
    /// # Returns
    /// Number of bytes read, possibly less than `buf.len()`.
    fn rx_data(&self, buf: &mut [u8]) -> usize;

    /// Post-processing after the receive phase
    fn stop_rx(&self) {}

    /// Prepare to transmit with subsequent [`tx_data`](Self::tx_data) calls
    ///
    /// # Arguments
    /// * `dev_addr` - Device selection (bus address, chip select index, ...)
    fn start_tx(&self, dev_addr: u32) -> Result<(), Self::Error>;

    /// Transmit `data`
    ///
    /// # Returns
    /// Number of bytes sent, possibly less than `data.len()`.
    fn tx_data(&self, data: &[u8]) -> usize;

    /// Transmit a command phase
    ///
    /// A command (register address, opcode) is followed either by more
    /// transmit data or by a repeated start into a receive phase. Transports
    /// that cannot keep a bus transaction open between calls may hold the
    /// command back and send it together with whatever follows. The default
    /// sends it right away through [`tx_data`](Self::tx_data).
    ///
    /// # Returns
    /// Number of command bytes accepted
    fn tx_command(&self, cmd: &[u8]) -> usize {
        self.tx_data(cmd)
    }

    /// Post-processing after the transmit phase
    fn stop_tx(&self) {}

    /// Reset the interface
    fn reset(&self) {}

    /// Ask the far end for permission to send `len` bytes
    ///
    /// Transports with flow control override this. Others are always clear
    /// to send.
    fn request_to_send(&self, _len: usize) -> bool {
        true
    }
}

impl<T: DeviceInterface + ?Sized> DeviceInterface for &T {
    type Error = T::Error;

    fn enable(&self) {
        T::enable(self)
    }

    fn disable(&self) {
        T::disable(self)
    }

    fn rate(&self) -> u32 {
        T::rate(self)
    }

    fn set_rate(&self, rate: u32) -> u32 {
        T::set_rate(self, rate)
    }

    fn start_rx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        T::start_rx(self, dev_addr)
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        T::rx_data(self, buf)
    }

    fn stop_rx(&self) {
        T::stop_rx(self)
    }

    fn start_tx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        T::start_tx(self, dev_addr)
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        T::tx_data(self, data)
    }

    fn tx_command(&self, cmd: &[u8]) -> usize {
        T::tx_command(self, cmd)
    }

    fn stop_tx(&self) {
        T::stop_tx(self)
    }

    fn reset(&self) {
        T::reset(self)
    }

    fn request_to_send(&self, len: usize) -> bool {
        T::request_to_send(self, len)
    }
}
