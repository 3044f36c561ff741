//! Transaction guards
//!
//! A guard is only handed out by a successful start, and stopping it is the
//! only way to release the busy flag. A failed start therefore never needs
//! (and cannot get) a matching stop.

use core::mem;

use crate::error::TransactionError;
use crate::handle::DeviceHandle;
use crate::interface::DeviceInterface;

/// Open receive bracket
///
/// Dropping the guard stops the bracket, same as [`stop`](Self::stop).
#[must_use = "dropping the transaction stops it immediately"]
pub struct RxTransaction<'a, T: DeviceInterface> {
    handle: &'a DeviceHandle<T>,
}

impl<'a, T: DeviceInterface> RxTransaction<'a, T> {
    pub(crate) fn new(handle: &'a DeviceHandle<T>) -> Self {
        Self { handle }
    }

    /// Receive into `buf`
    ///
    /// # Returns
    /// Number of bytes read, possibly less than `buf.len()`
    pub fn rx_data(&mut self, buf: &mut [u8]) -> usize {
        self.handle.transport().rx_data(buf)
    }

    /// The handle this bracket is open on
    pub fn handle(&self) -> &'a DeviceHandle<T> {
        self.handle
    }

    /// Complete the receive phase and release the handle
    pub fn stop(self) {
        drop(self);
    }
}

impl<T: DeviceInterface> Drop for RxTransaction<'_, T> {
    fn drop(&mut self) {
        self.handle.transport().stop_rx();
        self.handle.release();
    }
}

/// Open transmit bracket
///
/// Dropping the guard stops the bracket, same as [`stop`](Self::stop).
#[must_use = "dropping the transaction stops it immediately"]
pub struct TxTransaction<'a, T: DeviceInterface> {
    handle: &'a DeviceHandle<T>,
}

impl<'a, T: DeviceInterface> TxTransaction<'a, T> {
    pub(crate) fn new(handle: &'a DeviceHandle<T>) -> Self {
        Self { handle }
    }

    /// Transmit `data`
    ///
    /// # Returns
    /// Number of bytes sent, possibly less than `data.len()`
    pub fn tx_data(&mut self, data: &[u8]) -> usize {
        self.handle.transport().tx_data(data)
    }

    /// Transmit a command phase
    ///
    /// See [`DeviceInterface::tx_command`].
    pub fn tx_command(&mut self, cmd: &[u8]) -> usize {
        self.handle.transport().tx_command(cmd)
    }

    /// The handle this bracket is open on
    pub fn handle(&self) -> &'a DeviceHandle<T> {
        self.handle
    }

    /// Switch to a receive phase without releasing the handle
    ///
    /// This is the repeated start of a register read: the transmit phase
    /// is not stopped, the transport is asked to start receiving from
    /// `dev_addr` and the busy flag carries over to the returned guard.
    ///
    /// If the transport cannot start, the transmit bracket is stopped and
    /// the handle released.
    pub fn restart_rx(
        self,
        dev_addr: u32,
    ) -> Result<RxTransaction<'a, T>, TransactionError<T::Error>> {
        let handle = self.handle;

        match handle.transport().start_rx(dev_addr) {
            Ok(()) => {
                // Ownership of the busy flag moves to the receive guard
                mem::forget(self);
                Ok(RxTransaction::new(handle))
            }
            Err(e) => {
                debug!("repeated start failed for device {}", dev_addr);
                drop(self);
                Err(TransactionError::Start(e))
            }
        }
    }

    /// Complete the transmit phase and release the handle
    pub fn stop(self) {
        drop(self);
    }
}

impl<T: DeviceInterface> Drop for TxTransaction<'_, T> {
    fn drop(&mut self) {
        self.handle.transport().stop_tx();
        self.handle.release();
    }
}
