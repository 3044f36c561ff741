//! Recording transport for unit tests

use std::sync::Mutex;
use std::vec::Vec;

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::interface::DeviceInterface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartRx(u32),
    RxData(usize),
    StopRx,
    StartTx(u32),
    TxData(Vec<u8>),
    StopTx,
}

/// Transport that records every data-path call
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    fail_start: AtomicBool,
    fail_start_rx: AtomicBool,
    tx_limit: AtomicUsize,
    rx_limit: AtomicUsize,
    rx_fill: AtomicUsize,
    rate: AtomicUsize,
    power_ups: AtomicUsize,
    power_downs: AtomicUsize,
    resets: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
            fail_start_rx: AtomicBool::new(false),
            tx_limit: AtomicUsize::new(usize::MAX),
            rx_limit: AtomicUsize::new(usize::MAX),
            rx_fill: AtomicUsize::new(0),
            rate: AtomicUsize::new(64),
            power_ups: AtomicUsize::new(0),
            power_downs: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    /// Make both start operations fail
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make only receive starts fail
    pub fn fail_start_rx(&self, fail: bool) {
        self.fail_start_rx.store(fail, Ordering::SeqCst);
    }

    /// Cap the bytes accepted per `tx_data` call
    pub fn limit_tx(&self, limit: usize) {
        self.tx_limit.store(limit, Ordering::SeqCst);
    }

    /// Cap the bytes returned per `rx_data` call
    pub fn limit_rx(&self, limit: usize) {
        self.rx_limit.store(limit, Ordering::SeqCst);
    }

    /// Byte value written by `rx_data`
    pub fn set_rx_fill(&self, value: u8) {
        self.rx_fill.store(value as usize, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tx_phases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::TxData(_)))
            .count()
    }

    pub fn power_ups(&self) -> usize {
        self.power_ups.load(Ordering::SeqCst)
    }

    pub fn power_downs(&self) -> usize {
        self.power_downs.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceInterface for MockTransport {
    type Error = ();

    fn enable(&self) {
        self.power_ups.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.power_downs.fetch_add(1, Ordering::SeqCst);
    }

    fn rate(&self) -> u32 {
        self.rate.load(Ordering::SeqCst) as u32
    }

    /// Achievable rates are multiples of 64
    fn set_rate(&self, rate: u32) -> u32 {
        let actual = ((rate + 32) / 64).max(1) * 64;
        self.rate.store(actual as usize, Ordering::SeqCst);
        actual
    }

    fn start_rx(&self, dev_addr: u32) -> Result<(), ()> {
        self.record(Call::StartRx(dev_addr));
        if self.fail_start.load(Ordering::SeqCst) || self.fail_start_rx.load(Ordering::SeqCst) {
            return Err(());
        }
        Ok(())
    }

    fn rx_data(&self, buf: &mut [u8]) -> usize {
        self.record(Call::RxData(buf.len()));
        let count = buf.len().min(self.rx_limit.load(Ordering::SeqCst));
        let fill = self.rx_fill.load(Ordering::SeqCst) as u8;
        buf[..count].fill(fill);
        count
    }

    fn stop_rx(&self) {
        self.record(Call::StopRx);
    }

    fn start_tx(&self, dev_addr: u32) -> Result<(), ()> {
        self.record(Call::StartTx(dev_addr));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(());
        }
        Ok(())
    }

    fn tx_data(&self, data: &[u8]) -> usize {
        self.record(Call::TxData(data.to_vec()));
        data.len().min(self.tx_limit.load(Ordering::SeqCst))
    }

    fn stop_tx(&self) {
        self.record(Call::StopTx);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}
