#![allow(dead_code)]

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use portmaster::error::ProbeError;
use portmaster::probe::Prober;
use portmaster::types::{Algorithm, ProbeMethod, ScanConfig, Verdict};

/// Prober that never touches the network. Records call order and the peak
/// number of probes running at once.
#[derive(Default)]
pub struct FakeProber {
    pub open: HashSet<u16>,
    pub failing: HashSet<u16>,
    pub panicking: HashSet<u16>,
    pub delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<u16>>,
}

impl FakeProber {
    pub fn with_open(open: &[u16]) -> Self {
        Self {
            open: open.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<u16> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _addr: IpAddr, port: u16, _method: ProbeMethod) -> Result<Verdict, ProbeError> {
        self.calls.lock().unwrap().push(port);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&port) {
            panic!("probe for port {port} blew up");
        }
        if self.failing.contains(&port) {
            return Err(ProbeError::Io("connection reset".into()));
        }
        Ok(if self.open.contains(&port) {
            Verdict::Open
        } else {
            Verdict::Closed
        })
    }
}

pub fn config(lo: u32, hi: u32, algorithm: Algorithm, common: bool, concurrency: usize) -> ScanConfig {
    ScanConfig::new("127.0.0.1", lo, hi, algorithm, ProbeMethod::Connect, common, concurrency).unwrap()
}
