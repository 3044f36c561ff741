//! Generic device interface
//!
//! This crate defines one transaction contract that every data transport
//! implements: I2C, UART, chip-selected SPI, or a soft protocol such as SLIP
//! layered on top of another transport. Device drivers written against
//! [`DeviceHandle`] work unchanged on any of them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Device drivers (sensors, flash, ...)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  DeviceHandle (this crate)              │
//! │  busy flag · enable count · retries     │
//! └─────────────────────────────────────────┘
//!                     │  DeviceInterface
//!         ┌───────────┼───────────┬───────────┐
//!         ▼           ▼           ▼           ▼
//!     ┌───────┐   ┌───────┐   ┌───────┐   ┌───────┐
//!     │  I2C  │   │  SPI  │   │ UART  │   │ SLIP  │
//!     └───────┘   └───────┘   └───────┘   └───────┘
//! ```
//!
//! # Transactions
//!
//! A transaction is a bracket: `start_rx`/`start_tx` opens it, data calls
//! move bytes, and stopping closes it. Only one bracket may be open on a
//! handle at a time. A second start, whether from thread mode or from an
//! interrupt handler, fails immediately with [`TransactionError::Busy`]
//! instead of waiting.
//!
//! ```ignore
//! let mut tx = handle.start_tx(0x48)?;
//! let sent = tx.tx_data(&[0x01, 0x60]);
//! tx.stop();
//! ```
//!
//! The composite operations [`DeviceHandle::rx`], [`DeviceHandle::tx`],
//! [`DeviceHandle::read`] and [`DeviceHandle::write`] run a whole bracket
//! for you.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod error;
pub mod event;
pub mod handle;
pub mod i2c;
pub mod interface;
pub mod spi;
pub mod transaction;
pub mod uart;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience
pub use error::TransactionError;
pub use event::{Event, EventCallback, EventData};
pub use handle::{DeviceHandle, HandleConfig};
pub use interface::DeviceInterface;
pub use transaction::{RxTransaction, TxTransaction};
