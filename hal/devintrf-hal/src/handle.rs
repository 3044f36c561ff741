//! Device handle
//!
//! [`DeviceHandle`] owns one transport and carries the state shared by
//! every user of it: the busy flag guarding the transaction bracket and the
//! enable reference count. Both are atomics, so a handle can live in a
//! `static` and be used from thread mode and interrupt handlers alike.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::TransactionError;
use crate::event::{Event, EventCallback, EventData};
use crate::interface::DeviceInterface;
use crate::transaction::{RxTransaction, TxTransaction};

/// Default interrupt priority
pub const DEFAULT_INTERRUPT_PRIORITY: u8 = 6;

/// Default number of extra attempts for composite transfers
pub const DEFAULT_MAX_RETRY: u8 = 5;

/// Static handle settings, fixed at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandleConfig {
    /// Interrupt priority. Meaning is transport specific
    pub interrupt_priority: u8,
    /// Extra attempts made by composite transfers when nothing was
    /// transferred or the bracket could not be opened
    pub max_retry: u8,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl HandleConfig {
    /// Default settings
    pub const DEFAULT: Self = Self {
        interrupt_priority: DEFAULT_INTERRUPT_PRIORITY,
        max_retry: DEFAULT_MAX_RETRY,
    };

    /// Single attempt, no retries
    pub const NO_RETRY: Self = Self {
        interrupt_priority: DEFAULT_INTERRUPT_PRIORITY,
        max_retry: 0,
    };
}

/// Shared handle to a transport
///
/// Several logical devices may share one handle, for example multiple
/// peripherals on one I2C bus. The enable count keeps the bus powered until
/// the last of them disables it, and the busy flag lets only one of them
/// run a transaction at a time.
pub struct DeviceHandle<T> {
    transport: T,
    config: HandleConfig,
    event_callback: Option<EventCallback>,
    /// Set while a start..stop bracket is open
    busy: AtomicBool,
    enable_count: AtomicU32,
}

impl<T: DeviceInterface> DeviceHandle<T> {
    /// Create a handle owning `transport`
    ///
    /// The handle starts not busy, with an enable count of zero.
    pub const fn new(transport: T, config: HandleConfig) -> Self {
        Self {
            transport,
            config,
            event_callback: None,
            busy: AtomicBool::new(false),
            enable_count: AtomicU32::new(0),
        }
    }

    /// Create a handle with an event callback registered
    pub const fn with_callback(transport: T, config: HandleConfig, callback: EventCallback) -> Self {
        Self {
            transport,
            config,
            event_callback: Some(callback),
            busy: AtomicBool::new(false),
            enable_count: AtomicU32::new(0),
        }
    }

    /// Get the handle settings
    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// Interrupt priority of the transport
    pub fn interrupt_priority(&self) -> u8 {
        self.config.interrupt_priority
    }

    /// Extra attempts made by composite transfers
    pub fn max_retry(&self) -> u8 {
        self.config.max_retry
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the handle and return the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    // --- Power ---

    /// Turn the interface on
    ///
    /// Only the first enable powers the transport up; later calls just
    /// count another user.
    pub fn enable(&self) {
        if self.enable_count.fetch_add(1, Ordering::AcqRel) == 0 {
            debug!("interface powered up");
            self.transport.enable();
        }
    }

    /// Turn the interface off
    ///
    /// The transport is powered down when the last user disables it. The
    /// count saturates at zero: a disable with no matching enable is
    /// ignored.
    pub fn disable(&self) {
        let previous = self
            .enable_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });

        match previous {
            Ok(1) => {
                debug!("interface powered down");
                self.transport.disable();
            }
            Ok(_) => {}
            Err(_) => warn!("disable without matching enable ignored"),
        }
    }

    /// Number of users currently keeping the interface enabled
    pub fn enable_count(&self) -> u32 {
        self.enable_count.load(Ordering::Acquire)
    }

    /// Check if the interface is enabled
    pub fn is_enabled(&self) -> bool {
        self.enable_count() > 0
    }

    // --- Rate ---

    /// Current transfer rate in transfers per second
    pub fn rate(&self) -> u32 {
        self.transport.rate()
    }

    /// Request a transfer rate
    ///
    /// # Returns
    /// The achievable rate closest to `rate` that was actually applied.
    pub fn set_rate(&self, rate: u32) -> u32 {
        let actual = self.transport.set_rate(rate);
        if actual != rate {
            debug!("rate {} requested, {} applied", rate, actual);
        }
        actual
    }

    // --- Transaction brackets ---

    /// Check if a transaction bracket is open
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Open a receive bracket
    ///
    /// Fails immediately with [`TransactionError::Busy`] if a bracket is
    /// already open, without touching the transport. If the transport fails
    /// to start, the busy flag is released before returning.
    pub fn start_rx(
        &self,
        dev_addr: u32,
    ) -> Result<RxTransaction<'_, T>, TransactionError<T::Error>> {
        self.acquire()?;

        match self.transport.start_rx(dev_addr) {
            Ok(()) => Ok(RxTransaction::new(self)),
            Err(e) => {
                self.release();
                debug!("start_rx failed for device {}", dev_addr);
                Err(TransactionError::Start(e))
            }
        }
    }

    /// Open a transmit bracket
    ///
    /// Same busy discipline as [`start_rx`](Self::start_rx).
    pub fn start_tx(
        &self,
        dev_addr: u32,
    ) -> Result<TxTransaction<'_, T>, TransactionError<T::Error>> {
        self.acquire()?;

        match self.transport.start_tx(dev_addr) {
            Ok(()) => Ok(TxTransaction::new(self)),
            Err(e) => {
                self.release();
                debug!("start_tx failed for device {}", dev_addr);
                Err(TransactionError::Start(e))
            }
        }
    }

    fn acquire(&self) -> Result<(), TransactionError<T::Error>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| {
                trace!("bracket rejected, interface busy");
                TransactionError::Busy
            })
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    // --- Composite transfers ---

    /// Full receive sequence: start, receive, stop
    ///
    /// # Returns
    /// Number of bytes read
    pub fn rx(&self, dev_addr: u32, buf: &mut [u8]) -> Result<usize, TransactionError<T::Error>> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.retry(|| {
            let mut rx = self.start_rx(dev_addr)?;
            let count = rx.rx_data(buf);
            rx.stop();
            Ok(nonzero(count))
        })
    }

    /// Full transmit sequence: start, transmit, stop
    ///
    /// # Returns
    /// Number of bytes sent
    pub fn tx(&self, dev_addr: u32, data: &[u8]) -> Result<usize, TransactionError<T::Error>> {
        if data.is_empty() {
            return Ok(0);
        }

        self.retry(|| {
            let mut tx = self.start_tx(dev_addr)?;
            let count = tx.tx_data(data);
            tx.stop();
            Ok(nonzero(count))
        })
    }

    /// Register-style read
    ///
    /// Sends `cmd` (a register address or command code), then reads the
    /// response into `buf` after a repeated start, all inside one bracket.
    /// An empty `cmd` skips the command phase.
    ///
    /// # Returns
    /// Number of bytes read
    pub fn read(
        &self,
        dev_addr: u32,
        cmd: &[u8],
        buf: &mut [u8],
    ) -> Result<usize, TransactionError<T::Error>> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.retry(|| {
            let mut rx = if cmd.is_empty() {
                self.start_rx(dev_addr)?
            } else {
                let mut tx = self.start_tx(dev_addr)?;
                if tx.tx_command(cmd) < cmd.len() {
                    tx.stop();
                    return Ok(None);
                }
                tx.restart_rx(dev_addr)?
            };

            let count = rx.rx_data(buf);
            rx.stop();
            Ok(nonzero(count))
        })
    }

    /// Register-style write
    ///
    /// Sends `cmd` (a register address or command code) followed by `data`
    /// inside one bracket.
    ///
    /// # Returns
    /// Number of data bytes sent, not counting `cmd`
    pub fn write(
        &self,
        dev_addr: u32,
        cmd: &[u8],
        data: &[u8],
    ) -> Result<usize, TransactionError<T::Error>> {
        if cmd.is_empty() && data.is_empty() {
            return Ok(0);
        }

        self.retry(|| {
            let mut tx = self.start_tx(dev_addr)?;
            if !cmd.is_empty() && tx.tx_command(cmd) < cmd.len() {
                tx.stop();
                return Ok(None);
            }

            // Command-only writes are complete once the command went out
            if data.is_empty() {
                tx.stop();
                return Ok(Some(0));
            }

            let count = tx.tx_data(data);
            tx.stop();
            Ok(nonzero(count))
        })
    }

    /// Run `attempt` until it moves data, up to `max_retry` extra times
    ///
    /// `Ok(None)` means nothing was transferred. The outcome of the last
    /// attempt is returned.
    fn retry<F>(&self, mut attempt: F) -> Result<usize, TransactionError<T::Error>>
    where
        F: FnMut() -> Result<Option<usize>, TransactionError<T::Error>>,
    {
        let mut retries = self.config.max_retry;
        loop {
            let result = attempt();
            match result {
                Ok(Some(count)) => return Ok(count),
                _ if retries == 0 => return result.map(|count| count.unwrap_or(0)),
                _ => retries -= 1,
            }
        }
    }

    // --- Misc ---

    /// Reset the interface
    ///
    /// Not guarded by the busy flag.
    pub fn reset(&self) {
        self.transport.reset();
    }

    /// Ask the far end for permission to send `len` bytes
    pub fn request_to_send(&self, len: usize) -> bool {
        self.transport.request_to_send(len)
    }

    /// Dispatch a transport event to the registered callback
    ///
    /// Called by the transport's interrupt glue. Runs in that context, so
    /// the callback must not block.
    ///
    /// # Returns
    /// Bytes processed by the callback, or 0 if none is registered
    pub fn notify(&self, event: Event, data: EventData<'_>) -> usize {
        match self.event_callback {
            Some(callback) => callback(event, data),
            None => 0,
        }
    }

    /// Check if an event callback is registered
    pub fn has_event_callback(&self) -> bool {
        self.event_callback.is_some()
    }
}

fn nonzero(count: usize) -> Option<usize> {
    (count > 0).then_some(count)
}
