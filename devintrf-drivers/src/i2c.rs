//! I2C bus master transport
//!
//! `embedded-hal` I2C calls are whole transactions, while the device
//! interface moves data in phases. Plain transmit data goes on the wire in
//! `tx_data`, so its count reflects what the device acknowledged. A command
//! phase is held back in a small buffer instead:
//!
//! - more transmit data follows: command and data go out as adjacent
//!   writes in one transaction
//! - a receive follows: one `write_read` with a repeated start, which is
//!   what register reads need
//! - the bracket stops: the command is written on its own

use core::cell::RefCell;

use devintrf_hal::i2c::{I2cConfig, MAX_7BIT_ADDRESS};
use devintrf_hal::DeviceInterface;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, Operation};
use heapless::Vec;

/// Default size of the command buffer
pub const DEFAULT_COMMAND_CAPACITY: usize = 8;

/// I2C transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cTransportError {
    /// Device address does not fit in 7 bits
    InvalidAddress,
}

struct State<B, const N: usize> {
    bus: B,
    config: I2cConfig,
    address: u8,
    /// Command bytes not yet on the wire
    pending: Vec<u8, N>,
    powered: bool,
    last_error: Option<ErrorKind>,
}

impl<B: I2c, const N: usize> State<B, N> {
    /// Send a held-back command as a plain write
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        if let Err(e) = self.bus.write(self.address, &self.pending) {
            warn!("i2c write to {} failed", self.address);
            self.last_error = Some(e.kind());
        }
        self.pending.clear();
    }
}

/// I2C master transport
///
/// `N` is the command capacity: the longest command a bracket can hold
/// back. `tx_command` beyond that returns a short count.
pub struct I2cTransport<B, const N: usize = DEFAULT_COMMAND_CAPACITY> {
    state: Mutex<CriticalSectionRawMutex, RefCell<State<B, N>>>,
}

impl<B: I2c, const N: usize> I2cTransport<B, N> {
    /// Create a transport over `bus`
    ///
    /// The configured frequency is snapped to a supported bus mode.
    pub fn new(bus: B, config: I2cConfig) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                bus,
                config: I2cConfig::nearest(config.frequency),
                address: 0,
                pending: Vec::new(),
                powered: false,
                last_error: None,
            })),
        }
    }

    /// Current bus configuration
    ///
    /// Board code reads this after a rate change to reprogram the
    /// peripheral clock.
    pub fn config(&self) -> I2cConfig {
        self.with_state(|state| state.config)
    }

    /// Check if the transport is powered up
    pub fn is_powered(&self) -> bool {
        self.with_state(|state| state.powered)
    }

    /// Take the last bus error, if any
    pub fn take_error(&self) -> Option<ErrorKind> {
        self.with_state(|state| state.last_error.take())
    }

    /// Run `f` with exclusive access to the bus
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        self.with_state(|state| f(&mut state.bus))
    }

    /// Consume the transport and return the bus
    pub fn into_inner(self) -> B {
        self.state.into_inner().into_inner().bus
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<B, N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

fn seven_bit(dev_addr: u32) -> Result<u8, I2cTransportError> {
    if dev_addr > MAX_7BIT_ADDRESS {
        return Err(I2cTransportError::InvalidAddress);
    }
    Ok(dev_addr as u8)
}

impl<B: I2c, const N: usize> DeviceInterface for I2cTransport<B, N> {
    type Error = I2cTransportError;

    fn enable(&self) {
        self.with_state(|state| state.powered = true);
    }

    fn disable(&self) {
        self.with_state(|state| {
            state.pending.clear();
            state.powered = false;
        });
    }

    fn rate(&self) -> u32 {
        self.with_state(|state| state.config.frequency)
    }

    fn set_rate(&self, rate: u32) -> u32 {
        self.with_state(|state| {
            state.config = I2cConfig::nearest(rate);
            state.config.frequency
        })
    }

    fn start_rx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        let address = seven_bit(dev_addr)?;
        self.with_state(|state| {
            // A repeated start to another device terminates the held command
            if !state.pending.is_empty() && state.address != address {
                state.flush();
            }
            state.address = address;
        });
        Ok(())
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        self.with_state(|state| {
            let result = if state.pending.is_empty() {
                state.bus.read(state.address, buf)
            } else {
                state.bus.write_read(state.address, &state.pending, buf)
            };
            state.pending.clear();

            match result {
                Ok(()) => buf.len(),
                Err(e) => {
                    warn!("i2c read from {} failed", state.address);
                    state.last_error = Some(e.kind());
                    0
                }
            }
        })
    }

    fn stop_rx(&self) {
        self.with_state(|state| state.flush());
    }

    fn start_tx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        let address = seven_bit(dev_addr)?;
        self.with_state(|state| {
            state.address = address;
            state.pending.clear();
        });
        Ok(())
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        self.with_state(|state| {
            let result = if state.pending.is_empty() {
                state.bus.write(state.address, data)
            } else {
                state.bus.transaction(
                    state.address,
                    &mut [Operation::Write(&state.pending[..]), Operation::Write(data)],
                )
            };
            state.pending.clear();

            match result {
                Ok(()) => data.len(),
                Err(e) => {
                    warn!("i2c write to {} failed", state.address);
                    state.last_error = Some(e.kind());
                    0
                }
            }
        })
    }

    fn tx_command(&self, cmd: &[u8]) -> usize {
        self.with_state(|state| {
            let room = N - state.pending.len();
            let count = cmd.len().min(room);
            if state.pending.extend_from_slice(&cmd[..count]).is_err() {
                return 0;
            }
            if count < cmd.len() {
                debug!("i2c command buffer full, {} of {} bytes held", count, cmd.len());
            }
            count
        })
    }

    fn stop_tx(&self) {
        self.with_state(|state| state.flush());
    }

    fn reset(&self) {
        self.with_state(|state| {
            state.pending.clear();
            state.last_error = None;
        });
    }
}
