//! SLIP framing transport (RFC 1055)
//!
//! A soft protocol layered over another device handle, typically a UART.
//! Each transmit bracket becomes one frame and each receive bracket reads
//! (part of) one frame.
//!
//! Frame format:
//! - END (0xC0) before and after the payload
//! - END in the payload is sent as ESC ESC_END (0xDB 0xDC)
//! - ESC in the payload is sent as ESC ESC_ESC (0xDB 0xDD)
//!
//! Power and rate requests forward to the link handle, so the link's
//! enable count accounts for the SLIP user alongside anyone else sharing
//! the link.

use core::cell::RefCell;

use devintrf_hal::{DeviceHandle, DeviceInterface, RxTransaction, TransactionError, TxTransaction};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

/// Frame delimiter
pub const END: u8 = 0xC0;
/// Escape byte
pub const ESC: u8 = 0xDB;
/// Escaped END
pub const ESC_END: u8 = 0xDC;
/// Escaped ESC
pub const ESC_ESC: u8 = 0xDD;

/// Encoded bytes handed to the link per `tx_data` call
const ENCODE_CHUNK: usize = 32;

/// Encode one payload byte
///
/// Returns the encoded bytes and how many of them are used.
pub fn encode_byte(byte: u8) -> ([u8; 2], usize) {
    match byte {
        END => ([ESC, ESC_END], 2),
        ESC => ([ESC, ESC_ESC], 2),
        other => ([other, 0], 1),
    }
}

/// SLIP transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlipError<E> {
    /// The link bracket could not be opened
    Link(TransactionError<E>),
    /// The link did not take the opening END
    LinkRefused,
}

impl<E> From<TransactionError<E>> for SlipError<E> {
    fn from(e: TransactionError<E>) -> Self {
        SlipError::Link(e)
    }
}

/// Number of payload bytes whose encoding fits entirely in `encoded_len`
/// bytes of output
fn payload_len(payload: &[u8], encoded_len: usize) -> usize {
    let mut used = 0;
    for (index, &byte) in payload.iter().enumerate() {
        used += encode_byte(byte).1;
        if used > encoded_len {
            return index;
        }
    }
    payload.len()
}

struct State<'a, T: DeviceInterface> {
    tx: Option<TxTransaction<'a, T>>,
    rx: Option<RxTransaction<'a, T>>,
    /// Previous received byte was ESC
    rx_escape: bool,
    /// Payload received in the current receive bracket
    rx_payload: bool,
    /// END seen after payload in the current receive bracket
    frame_complete: bool,
}

/// SLIP transport over a link handle
pub struct SlipTransport<'a, T: DeviceInterface> {
    link: &'a DeviceHandle<T>,
    link_addr: u32,
    state: Mutex<CriticalSectionRawMutex, RefCell<State<'a, T>>>,
}

impl<'a, T: DeviceInterface> SlipTransport<'a, T> {
    /// Create a SLIP transport over `link`
    ///
    /// # Arguments
    /// * `link` - Handle of the underlying transport
    /// * `link_addr` - Device address used for link brackets
    pub fn new(link: &'a DeviceHandle<T>, link_addr: u32) -> Self {
        Self {
            link,
            link_addr,
            state: Mutex::new(RefCell::new(State {
                tx: None,
                rx: None,
                rx_escape: false,
                rx_payload: false,
                frame_complete: false,
            })),
        }
    }

    /// The underlying link handle
    pub fn link(&self) -> &'a DeviceHandle<T> {
        self.link
    }

    /// Check if the current receive bracket has seen the end of a frame
    pub fn frame_complete(&self) -> bool {
        self.with_state(|state| state.frame_complete)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<'a, T>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<'a, T: DeviceInterface> DeviceInterface for SlipTransport<'a, T> {
    type Error = SlipError<T::Error>;

    fn enable(&self) {
        self.link.enable();
    }

    fn disable(&self) {
        self.link.disable();
    }

    fn rate(&self) -> u32 {
        self.link.rate()
    }

    fn set_rate(&self, rate: u32) -> u32 {
        self.link.set_rate(rate)
    }

    fn start_rx(&self, _dev_addr: u32) -> Result<(), Self::Error> {
        let rx = self.link.start_rx(self.link_addr)?;
        self.with_state(|state| {
            state.rx = Some(rx);
            state.rx_escape = false;
            state.rx_payload = false;
            state.frame_complete = false;
        });
        Ok(())
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        self.with_state(|state| {
            let Some(rx) = state.rx.as_mut() else {
                return 0;
            };

            let mut count = 0;
            let mut byte = [0u8; 1];
            // Byte at a time so nothing past END is taken from the link
            while count < buf.len() && !state.frame_complete {
                if rx.rx_data(&mut byte) == 0 {
                    break;
                }

                let decoded = match (state.rx_escape, byte[0]) {
                    (false, END) => {
                        // Leading END only flushes line noise
                        state.frame_complete = state.rx_payload;
                        continue;
                    }
                    (false, ESC) => {
                        state.rx_escape = true;
                        continue;
                    }
                    (false, other) => other,
                    (true, ESC_END) => END,
                    (true, ESC_ESC) => ESC,
                    // Protocol violation: keep the byte as received
                    (true, other) => other,
                };
                state.rx_escape = false;
                state.rx_payload = true;

                buf[count] = decoded;
                count += 1;
            }
            count
        })
    }

    fn stop_rx(&self) {
        // Dropping the link guard stops the link bracket
        self.with_state(|state| {
            state.rx = None;
            state.rx_escape = false;
        });
    }

    fn start_tx(&self, _dev_addr: u32) -> Result<(), Self::Error> {
        let mut tx = self.link.start_tx(self.link_addr)?;
        if tx.tx_data(&[END]) == 0 {
            warn!("slip link refused frame start");
            return Err(SlipError::LinkRefused);
        }
        self.with_state(|state| state.tx = Some(tx));
        Ok(())
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        self.with_state(|state| {
            let Some(tx) = state.tx.as_mut() else {
                return 0;
            };

            let mut sent = 0;
            for block in data.chunks(ENCODE_CHUNK / 2) {
                let mut encoded: Vec<u8, ENCODE_CHUNK> = Vec::new();
                for &byte in block {
                    let (bytes, len) = encode_byte(byte);
                    if encoded.extend_from_slice(&bytes[..len]).is_err() {
                        return sent;
                    }
                }

                let written = tx.tx_data(&encoded);
                if written < encoded.len() {
                    return sent + payload_len(block, written);
                }
                sent += block.len();
            }
            sent
        })
    }

    fn stop_tx(&self) {
        self.with_state(|state| {
            if let Some(mut tx) = state.tx.take() {
                if tx.tx_data(&[END]) == 0 {
                    warn!("slip link refused frame end");
                }
                tx.stop();
            }
        });
    }

    fn reset(&self) {
        self.with_state(|state| {
            state.rx_escape = false;
            state.rx_payload = false;
            state.frame_complete = false;
        });
        self.link.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::UartTransport;
    use devintrf_hal::uart::UartConfig;
    use devintrf_hal::HandleConfig;
    use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write, WriteReady};
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeUart {
        incoming: VecDeque<u8>,
        sent: std::vec::Vec<u8>,
        write_limit: Option<usize>,
    }

    impl ErrorType for FakeUart {
        type Error = ErrorKind;
    }

    impl Read for FakeUart {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let count = buf.len().min(self.incoming.len());
            for slot in buf.iter_mut().take(count) {
                *slot = self.incoming.pop_front().unwrap_or(0);
            }
            Ok(count)
        }
    }

    impl ReadReady for FakeUart {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.incoming.is_empty())
        }
    }

    impl Write for FakeUart {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            let count = match self.write_limit.as_mut() {
                Some(limit) => {
                    let count = buf.len().min(*limit);
                    *limit -= count;
                    count
                }
                None => buf.len(),
            };
            self.sent.extend_from_slice(&buf[..count]);
            Ok(count)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl WriteReady for FakeUart {
        fn write_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(true)
        }
    }

    type Link = DeviceHandle<UartTransport<FakeUart, 64>>;

    fn link() -> Link {
        DeviceHandle::new(
            UartTransport::new(FakeUart::default(), UartConfig::default()),
            HandleConfig::NO_RETRY,
        )
    }

    fn sent(link: &Link) -> std::vec::Vec<u8> {
        link.transport().with_uart(|uart| uart.sent.clone())
    }

    #[test]
    fn test_frame_is_escaped_and_delimited() {
        let link = link();
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        assert_eq!(slip.tx(0, &[0x01, END, ESC, 0x02]), Ok(4));
        assert_eq!(
            sent(&link),
            vec![END, 0x01, ESC, ESC_END, ESC, ESC_ESC, 0x02, END]
        );
        assert!(!link.is_busy());
    }

    #[test]
    fn test_long_payload_spans_chunks() {
        let link = link();
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);
        let payload = [0x11u8; 40];
        assert_eq!(slip.tx(0, &payload), Ok(40));
        assert_eq!(sent(&link).len(), 42);
    }

    #[test]
    fn test_receive_decodes_until_end() {
        let link = link();
        link.transport().with_uart(|uart| {
            uart.incoming
                .extend([END, 0x41, ESC, ESC_END, 0x42, END, 0x99].iter().copied())
        });
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        let mut rx = slip.start_rx(0).unwrap();
        let mut buf = [0u8; 16];
        let count = rx.rx_data(&mut buf);
        assert_eq!(&buf[..count], &[0x41, END, 0x42]);
        assert!(slip.transport().frame_complete());
        rx.stop();

        // Byte after END is left for the next frame
        let remaining = link.transport().with_uart(|uart| uart.incoming.len());
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_frame_end_found_across_reads() {
        let link = link();
        link.transport().with_uart(|uart| {
            uart.incoming
                .extend([END, 1, 2, END, 3, 4, END].iter().copied())
        });
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        let mut rx = slip.start_rx(0).unwrap();
        let mut first = [0u8; 2];
        assert_eq!(rx.rx_data(&mut first), 2);
        assert_eq!(first, [1, 2]);
        assert!(!slip.transport().frame_complete());

        // Payload filled the buffer; the next read only finds the END
        let mut rest = [0u8; 4];
        assert_eq!(rx.rx_data(&mut rest), 0);
        assert!(slip.transport().frame_complete());
        rx.stop();

        let mut rx = slip.start_rx(0).unwrap();
        let count = rx.rx_data(&mut rest);
        assert_eq!(&rest[..count], &[3, 4]);
        assert!(slip.transport().frame_complete());
    }

    #[test]
    fn test_refused_frame_start_fails_start() {
        let link = link();
        link.transport().with_uart(|uart| uart.write_limit = Some(0));
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        assert_eq!(
            slip.tx(0, &[1]),
            Err(TransactionError::Start(SlipError::LinkRefused))
        );
        assert!(!slip.is_busy());
        assert!(!link.is_busy());
    }

    #[test]
    fn test_link_held_for_bracket() {
        let link = link();
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        let tx = slip.start_tx(0).unwrap();
        assert!(link.is_busy());
        // Anyone else on the link is shut out until the frame is done
        assert!(matches!(link.start_tx(0), Err(TransactionError::Busy)));
        tx.stop();
        assert!(!link.is_busy());
    }

    #[test]
    fn test_busy_link_fails_start() {
        let link = link();
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        let _other = link.start_rx(0).unwrap();
        assert_eq!(
            slip.tx(0, &[1]),
            Err(TransactionError::Start(SlipError::Link(TransactionError::Busy)))
        );
        assert!(!slip.is_busy());
    }

    #[test]
    fn test_short_link_write_counts_whole_bytes() {
        let link = link();
        // Leading END plus 0x01 and the first half of the ESC pair
        link.transport().with_uart(|uart| uart.write_limit = Some(3));
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        let mut tx = slip.start_tx(0).unwrap();
        assert_eq!(tx.tx_data(&[0x01, END, 0x02]), 1);
        tx.stop();
    }

    #[test]
    fn test_power_and_rate_forward_to_link() {
        let link = link();
        let slip = DeviceHandle::new(SlipTransport::new(&link, 0), HandleConfig::NO_RETRY);

        link.enable();
        slip.enable();
        assert_eq!(link.enable_count(), 2);
        slip.disable();
        assert_eq!(link.enable_count(), 1);

        assert_eq!(slip.set_rate(57600), 57600);
        assert_eq!(link.rate(), 57600);
    }

    proptest! {
        #[test]
        fn prop_any_payload_survives_framing(
            payload in proptest::collection::vec(any::<u8>(), 1..48)
        ) {
            let out = link();
            let slip = DeviceHandle::new(SlipTransport::new(&out, 0), HandleConfig::NO_RETRY);
            prop_assert_eq!(slip.tx(0, &payload), Ok(payload.len()));

            // Feed the wire bytes back in on a second link
            let wire = sent(&out);
            let back = link();
            back.transport().with_uart(|uart| uart.incoming.extend(wire.iter().copied()));
            let slip = DeviceHandle::new(SlipTransport::new(&back, 0), HandleConfig::NO_RETRY);

            let mut buf = [0u8; 64];
            let count = slip.rx(0, &mut buf);
            prop_assert_eq!(count, Ok(payload.len()));
            prop_assert_eq!(&buf[..payload.len()], &payload[..]);
        }
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(payload_len(&[1, 2, 3], 3), 3);
        assert_eq!(payload_len(&[1, END, 3], 2), 1);
        assert_eq!(payload_len(&[1, END, 3], 3), 2);
        assert_eq!(payload_len(&[], 0), 0);
    }
}
