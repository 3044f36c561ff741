//! UART transport
//!
//! Received bytes are collected into a FIFO by [`service_rx`], which the
//! board calls from the UART receive interrupt. `rx_data` drains the FIFO
//! first and then reads whatever the peripheral already holds, so the
//! transport also works when nobody services the interrupt.
//!
//! A UART is point to point: the device address is ignored.

use core::cell::RefCell;
use core::convert::Infallible;

use devintrf_hal::uart::UartConfig;
use devintrf_hal::{DeviceHandle, DeviceInterface, Event, EventData};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_io::{Read, ReadReady, Write, WriteReady};
use heapless::Deque;

/// Default receive FIFO size
pub const DEFAULT_RX_FIFO_SIZE: usize = 64;

/// Bytes moved from the peripheral per read in [`service_rx`]
const SERVICE_CHUNK: usize = 16;

struct State<U, const N: usize> {
    uart: U,
    config: UartConfig,
    rx_fifo: Deque<u8, N>,
    /// Bytes discarded because the FIFO was full
    dropped: usize,
}

impl<U: Read + ReadReady, const N: usize> State<U, N> {
    /// Read what the peripheral already holds without blocking
    fn read_ready(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        match self.uart.read_ready() {
            Ok(true) => self.uart.read(buf).unwrap_or(0),
            _ => 0,
        }
    }
}

/// UART transport with an `N`-byte receive FIFO
pub struct UartTransport<U, const N: usize = DEFAULT_RX_FIFO_SIZE> {
    state: Mutex<CriticalSectionRawMutex, RefCell<State<U, N>>>,
}

impl<U, const N: usize> UartTransport<U, N>
where
    U: Read + ReadReady + Write + WriteReady,
{
    /// Create a transport over `uart`
    ///
    /// The configured baud rate is snapped to a standard rate.
    pub fn new(uart: U, config: UartConfig) -> Self {
        let config = UartConfig {
            baudrate: UartConfig::nearest_baudrate(config.baudrate),
            ..config
        };

        Self {
            state: Mutex::new(RefCell::new(State {
                uart,
                config,
                rx_fifo: Deque::new(),
                dropped: 0,
            })),
        }
    }

    /// Current line configuration
    pub fn config(&self) -> UartConfig {
        self.with_state(|state| state.config)
    }

    /// Bytes waiting in the receive FIFO
    pub fn rx_pending(&self) -> usize {
        self.with_state(|state| state.rx_fifo.len())
    }

    /// Total bytes dropped on FIFO overflow
    pub fn dropped(&self) -> usize {
        self.with_state(|state| state.dropped)
    }

    /// Run `f` with exclusive access to the peripheral
    pub fn with_uart<R>(&self, f: impl FnOnce(&mut U) -> R) -> R {
        self.with_state(|state| f(&mut state.uart))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<U, N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Move ready bytes from the peripheral into `buf`
    fn read_peripheral(&self, buf: &mut [u8]) -> usize {
        self.with_state(|state| state.read_ready(buf))
    }

    /// Push as much of `data` into the FIFO as fits
    fn push_rx(&self, data: &[u8]) -> usize {
        self.with_state(|state| {
            let mut stored = 0;
            for &byte in data {
                if state.rx_fifo.push_back(byte).is_err() {
                    break;
                }
                stored += 1;
            }
            stored
        })
    }

    /// Discard the `count` oldest FIFO bytes
    ///
    /// # Returns
    /// Number of bytes actually discarded
    fn drop_oldest(&self, count: usize) -> usize {
        self.with_state(|state| {
            let mut removed = 0;
            while removed < count && state.rx_fifo.pop_front().is_some() {
                removed += 1;
            }
            state.dropped += removed;
            removed
        })
    }

    /// Count bytes that never made it into the FIFO
    fn discard(&self, count: usize) {
        self.with_state(|state| state.dropped += count);
    }
}

impl<U, const N: usize> DeviceInterface for UartTransport<U, N>
where
    U: Read + ReadReady + Write + WriteReady,
{
    type Error = Infallible;

    fn rate(&self) -> u32 {
        self.with_state(|state| state.config.baudrate)
    }

    fn set_rate(&self, rate: u32) -> u32 {
        self.with_state(|state| {
            state.config.baudrate = UartConfig::nearest_baudrate(rate);
            state.config.baudrate
        })
    }

    fn start_rx(&self, _dev_addr: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        self.with_state(|state| {
            let mut count = 0;
            while count < buf.len() {
                match state.rx_fifo.pop_front() {
                    Some(byte) => {
                        buf[count] = byte;
                        count += 1;
                    }
                    None => break,
                }
            }
            count + state.read_ready(&mut buf[count..])
        })
    }

    fn start_tx(&self, _dev_addr: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        self.with_state(|state| match state.uart.write(data) {
            Ok(count) => count,
            Err(_) => {
                warn!("uart write failed");
                0
            }
        })
    }

    fn stop_tx(&self) {
        self.with_state(|state| {
            if state.uart.flush().is_err() {
                warn!("uart flush failed");
            }
        });
    }

    fn reset(&self) {
        self.with_state(|state| state.rx_fifo.clear());
    }

    /// Clear to send when the peripheral can accept data
    fn request_to_send(&self, _len: usize) -> bool {
        self.with_state(|state| state.uart.write_ready().unwrap_or(false))
    }
}

/// Receive interrupt service
///
/// Call from the UART receive interrupt. Moves ready bytes into the FIFO
/// and reports through the handle's event callback:
///
/// - [`Event::RxFifoFull`] when the FIFO cannot take more. If the callback
///   consumes nothing, the oldest bytes are dropped to make room.
/// - [`Event::RxData`] once at the end if anything was received.
///
/// # Returns
/// Number of bytes taken from the peripheral
pub fn service_rx<U, const N: usize>(handle: &DeviceHandle<UartTransport<U, N>>) -> usize
where
    U: Read + ReadReady + Write + WriteReady,
{
    let transport = handle.transport();
    let mut chunk = [0u8; SERVICE_CHUNK];
    let mut total = 0;

    // At most one FIFO's worth per call
    while total < N.max(SERVICE_CHUNK) {
        let read = transport.read_peripheral(&mut chunk);
        if read == 0 {
            break;
        }
        total += read;

        let mut pending = &chunk[..read];
        while !pending.is_empty() {
            let stored = transport.push_rx(pending);
            pending = &pending[stored..];
            if pending.is_empty() {
                break;
            }

            let consumed = handle.notify(Event::RxFifoFull, EventData::Fifo(transport.rx_pending()));
            let stored = transport.push_rx(pending);
            pending = &pending[stored..];
            if consumed == 0 || stored == 0 {
                warn!("uart rx fifo full, dropping {} bytes", pending.len());
                if transport.drop_oldest(pending.len()) == 0 {
                    transport.discard(pending.len());
                    break;
                }
            }
        }
    }

    if total > 0 {
        handle.notify(Event::RxData, EventData::Fifo(transport.rx_pending()));
    }
    total
}
