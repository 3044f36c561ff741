//! Chip-selected SPI transport
//!
//! Several peripherals share one SPI bus, each with its own chip-select
//! line. The device address passed to a start is the index of the
//! chip-select pin; the pin stays asserted until the bracket stops.

use core::cell::RefCell;

use devintrf_hal::spi::SpiConfig;
use devintrf_hal::DeviceInterface;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Error as _, ErrorKind, SpiBus};

/// SPI transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiTransportError<E> {
    /// No chip-select pin at this index
    NoSuchDevice,
    /// Driving the chip-select pin failed
    ChipSelect(E),
}

struct State<B, CS, const N: usize> {
    bus: B,
    chip_selects: [CS; N],
    selected: Option<usize>,
    config: SpiConfig,
    last_error: Option<ErrorKind>,
}

impl<B: SpiBus, CS: OutputPin, const N: usize> State<B, CS, N> {
    fn select(&mut self, index: usize) -> Result<(), SpiTransportError<CS::Error>> {
        if index >= N {
            return Err(SpiTransportError::NoSuchDevice);
        }

        // Restarting on the selected device keeps the line asserted
        if self.selected == Some(index) {
            return Ok(());
        }
        self.deselect();

        self.chip_selects[index]
            .set_low()
            .map_err(SpiTransportError::ChipSelect)?;
        self.selected = Some(index);
        Ok(())
    }

    fn deselect(&mut self) {
        if let Some(index) = self.selected.take() {
            if let Err(e) = self.bus.flush() {
                self.last_error = Some(e.kind());
            }
            if self.chip_selects[index].set_high().is_err() {
                warn!("spi chip select {} release failed", index);
            }
        }
    }
}

/// SPI bus transport with `N` chip-select lines
///
/// Chip-select pins are active low.
pub struct SpiTransport<B, CS, const N: usize> {
    state: Mutex<CriticalSectionRawMutex, RefCell<State<B, CS, N>>>,
}

impl<B: SpiBus, CS: OutputPin, const N: usize> SpiTransport<B, CS, N> {
    /// Create a transport over `bus`
    ///
    /// All chip-select lines are driven inactive (high).
    pub fn new(bus: B, mut chip_selects: [CS; N], config: SpiConfig) -> Self {
        for (index, cs) in chip_selects.iter_mut().enumerate() {
            if cs.set_high().is_err() {
                warn!("spi chip select {} init failed", index);
            }
        }

        let config = SpiConfig {
            frequency: config.achievable(config.frequency),
            ..config
        };

        Self {
            state: Mutex::new(RefCell::new(State {
                bus,
                chip_selects,
                selected: None,
                config,
                last_error: None,
            })),
        }
    }

    /// Current bus configuration
    pub fn config(&self) -> SpiConfig {
        self.with_state(|state| state.config)
    }

    /// Index of the currently selected device
    pub fn selected(&self) -> Option<usize> {
        self.with_state(|state| state.selected)
    }

    /// Take the last bus error, if any
    pub fn take_error(&self) -> Option<ErrorKind> {
        self.with_state(|state| state.last_error.take())
    }

    /// Run `f` with exclusive access to the bus
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        self.with_state(|state| f(&mut state.bus))
    }

    /// Run `f` with exclusive access to one chip-select pin
    pub fn with_chip_select<R>(&self, index: usize, f: impl FnOnce(&mut CS) -> R) -> Option<R> {
        self.with_state(|state| state.chip_selects.get_mut(index).map(f))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<B, CS, N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<B: SpiBus, CS: OutputPin, const N: usize> DeviceInterface for SpiTransport<B, CS, N> {
    type Error = SpiTransportError<CS::Error>;

    fn disable(&self) {
        self.with_state(|state| state.deselect());
    }

    fn rate(&self) -> u32 {
        self.with_state(|state| state.config.frequency)
    }

    fn set_rate(&self, rate: u32) -> u32 {
        self.with_state(|state| {
            state.config.frequency = state.config.achievable(rate);
            state.config.frequency
        })
    }

    fn start_rx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        self.with_state(|state| state.select(dev_addr as usize))
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        self.with_state(|state| match state.bus.read(buf) {
            Ok(()) => buf.len(),
            Err(e) => {
                warn!("spi read failed");
                state.last_error = Some(e.kind());
                0
            }
        })
    }

    fn stop_rx(&self) {
        self.with_state(|state| state.deselect());
    }

    fn start_tx(&self, dev_addr: u32) -> Result<(), Self::Error> {
        self.with_state(|state| state.select(dev_addr as usize))
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        self.with_state(|state| match state.bus.write(data) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("spi write failed");
                state.last_error = Some(e.kind());
                0
            }
        })
    }

    fn stop_tx(&self) {
        self.with_state(|state| state.deselect());
    }

    fn reset(&self) {
        self.with_state(|state| {
            state.deselect();
            state.last_error = None;
        });
    }
}
