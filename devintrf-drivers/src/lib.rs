//! Transport implementations
//!
//! This crate provides concrete implementations of the
//! [`DeviceInterface`](devintrf_hal::DeviceInterface) trait on top of
//! `embedded-hal` and `embedded-io` peripherals:
//!
//! - I2C bus master with repeated-start register reads
//! - Chip-selected SPI bus
//! - UART with an interrupt-serviced receive FIFO
//! - SLIP framing layered over another device handle
//!
//! plus [`register::RegisterDevice`], a generic register-addressed device
//! that works over any of them.
//!
//! Every transport keeps its peripheral behind a critical-section mutex,
//! so a [`DeviceHandle`](devintrf_hal::DeviceHandle) wrapping it is `Sync`
//! and can be placed in a `static` shared with interrupt handlers.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod i2c;
pub mod register;
pub mod slip;
pub mod spi;
pub mod uart;

pub use i2c::{I2cTransport, I2cTransportError};
pub use register::{RegisterDevice, RegisterError};
pub use slip::{SlipError, SlipTransport};
pub use spi::{SpiTransport, SpiTransportError};
pub use uart::UartTransport;
