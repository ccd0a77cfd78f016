use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ::time::{macros::format_description, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};

use crate::types::{PortFinding, ScanConfig, ScanSnapshot, ScanStatus, ScanSummary};

/// Mutable record of one scan. Written only by the coordinator; everything
/// else reads [`ScanSnapshot`]s.
#[derive(Debug)]
pub struct ScanSession {
    scan_id: String,
    config: ScanConfig,
    status: ScanStatus,
    open_ports: Vec<PortFinding>,
    progress: u64,
    total_ports: u64,
    started_at: OffsetDateTime,
    started: Instant,
    ended_at: Option<OffsetDateTime>,
    elapsed: Option<Duration>,
}

impl ScanSession {
    pub fn new(scan_id: String, config: ScanConfig, total_ports: u64, started_at: OffsetDateTime) -> Self {
        Self {
            scan_id,
            config,
            status: ScanStatus::Running,
            open_ports: Vec::new(),
            progress: 0,
            total_ports,
            started_at,
            started: Instant::now(),
            ended_at: None,
            elapsed: None,
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    pub fn total_ports(&self) -> u64 {
        self.total_ports
    }

    pub fn open_ports(&self) -> &[PortFinding] {
        &self.open_ports
    }

    /// Record one finished probe, appending `finding` when the port was open.
    /// Progress never passes the total.
    pub fn record(&mut self, finding: Option<PortFinding>) {
        if let Some(f) = finding {
            self.open_ports.push(f);
        }
        if self.progress < self.total_ports {
            self.progress += 1;
        }
    }

    /// Move to `Completed` and stamp the end time. Returns `false` if the
    /// session had already been finished.
    pub fn finish(&mut self) -> bool {
        if self.status == ScanStatus::Completed {
            return false;
        }
        self.status = ScanStatus::Completed;
        self.ended_at = Some(OffsetDateTime::now_utc());
        self.elapsed = Some(self.started.elapsed());
        true
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scan_id: self.scan_id.clone(),
            target: self.config.target.clone(),
            algorithm: self.config.algorithm.label().to_string(),
            method: self.config.method,
            common_ports_first: self.config.common_ports_first,
            port_range_start: self.config.port_start,
            port_range_end: self.config.port_end,
            status: self.status,
            progress: self.progress,
            total_ports: self.total_ports,
            open_ports: self.open_ports.clone(),
            start_time: format_timestamp(self.started_at),
            end_time: self.ended_at.map(format_timestamp),
            elapsed_time: self.elapsed.map(|d| format!("{:.2}", d.as_secs_f64())),
        }
    }
}

pub type SessionHandle = Arc<Mutex<ScanSession>>;

/// Process-owned registry of scan sessions keyed by scan id.
///
/// Entries are never removed while the process runs.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a running session for `config` under a fresh scan id.
    ///
    /// Ids look like `<target>_<unix seconds>`; a second scan of the same
    /// target within the same second gets a `_<n>` suffix.
    pub async fn register(&self, config: ScanConfig, total_ports: u64) -> (String, SessionHandle) {
        let started_at = OffsetDateTime::now_utc();
        let base = format!("{}_{}", config.target, started_at.unix_timestamp());

        let mut map = self.sessions.write().await;
        let mut scan_id = base.clone();
        let mut n = 2u32;
        while map.contains_key(&scan_id) {
            scan_id = format!("{base}_{n}");
            n += 1;
        }
        let session = Arc::new(Mutex::new(ScanSession::new(
            scan_id.clone(),
            config,
            total_ports,
            started_at,
        )));
        map.insert(scan_id.clone(), session.clone());
        (scan_id, session)
    }

    pub async fn get(&self, scan_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(scan_id).cloned()
    }

    pub async fn snapshot(&self, scan_id: &str) -> Option<ScanSnapshot> {
        let session = self.get(scan_id).await?;
        let guard = session.lock().await;
        Some(guard.snapshot())
    }

    /// History rows for every session, in map iteration order.
    pub async fn summaries(&self) -> Vec<ScanSummary> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            let guard = h.lock().await;
            out.push(ScanSummary::from(&guard.snapshot()));
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    ts.format(fmt)
        .unwrap_or_else(|_| String::from("1970-01-01 00:00:00 UTC"))
}
