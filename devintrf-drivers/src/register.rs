//! Register-addressed device
//!
//! Most I2C and SPI sensors expose an array of 8-bit registers: a read
//! sends the register address and reads back after a repeated start, a
//! write sends the register address followed by the value. This wraps a
//! shared device handle with that access pattern for one device address.

use devintrf_hal::{DeviceHandle, DeviceInterface, TransactionError};

/// Register access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError<E> {
    /// The bracket could not be opened
    Transaction(TransactionError<E>),
    /// Fewer bytes moved than requested
    ShortTransfer { expected: usize, actual: usize },
}

impl<E> From<TransactionError<E>> for RegisterError<E> {
    fn from(e: TransactionError<E>) -> Self {
        RegisterError::Transaction(e)
    }
}

/// One device on a shared interface
///
/// Holds an enable reference on the interface for as long as it lives, so
/// the interface stays powered while any device on it is in use.
pub struct RegisterDevice<'a, T: DeviceInterface> {
    bus: &'a DeviceHandle<T>,
    dev_addr: u32,
}

impl<'a, T: DeviceInterface> RegisterDevice<'a, T> {
    /// Attach to the device at `dev_addr` and enable the interface
    pub fn new(bus: &'a DeviceHandle<T>, dev_addr: u32) -> Self {
        bus.enable();
        Self { bus, dev_addr }
    }

    /// Device address on the interface
    pub fn dev_addr(&self) -> u32 {
        self.dev_addr
    }

    /// Read `buf.len()` bytes starting at register `reg`
    pub fn read_register(&self, reg: u8, buf: &mut [u8]) -> Result<(), RegisterError<T::Error>> {
        let actual = self.bus.read(self.dev_addr, &[reg], buf)?;
        check(buf.len(), actual)
    }

    /// Write `data` starting at register `reg`
    pub fn write_register(&self, reg: u8, data: &[u8]) -> Result<(), RegisterError<T::Error>> {
        let actual = self.bus.write(self.dev_addr, &[reg], data)?;
        check(data.len(), actual)
    }

    /// Read a single register
    pub fn read_u8(&self, reg: u8) -> Result<u8, RegisterError<T::Error>> {
        let mut value = [0u8; 1];
        self.read_register(reg, &mut value)?;
        Ok(value[0])
    }

    /// Write a single register
    pub fn write_u8(&self, reg: u8, value: u8) -> Result<(), RegisterError<T::Error>> {
        self.write_register(reg, &[value])
    }

    /// Read-modify-write the bits of `reg` selected by `mask`
    ///
    /// The write is skipped when the bits already hold `value`.
    ///
    /// # Returns
    /// The new register value
    pub fn update_bits(&self, reg: u8, mask: u8, value: u8) -> Result<u8, RegisterError<T::Error>> {
        let old = self.read_u8(reg)?;
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write_u8(reg, new)?;
        }
        Ok(new)
    }
}

impl<T: DeviceInterface> Drop for RegisterDevice<'_, T> {
    fn drop(&mut self) {
        self.bus.disable();
    }
}

fn check<E>(expected: usize, actual: usize) -> Result<(), RegisterError<E>> {
    if actual < expected {
        return Err(RegisterError::ShortTransfer { expected, actual });
    }
    Ok(())
}
