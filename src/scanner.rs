use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::netdetect;
use crate::ports::PortPlan;
use crate::probe::{self, Prober};
use crate::risk;
use crate::service;
use crate::session::{SessionHandle, SessionStore};
use crate::types::{PortFinding, ProbeMethod, ScanConfig, ScanSnapshot, Verdict};

/// Runs scans: plans the port order, fans probes out under a concurrency
/// limit and folds every outcome into the scan's session.
#[derive(Clone)]
pub struct Coordinator {
    store: SessionStore,
    prober: Arc<dyn Prober>,
}

impl Coordinator {
    pub fn new(store: SessionStore, prober: Arc<dyn Prober>) -> Self {
        Self { store, prober }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Register a scan and run it in the background. Returns the scan id as
    /// soon as the session exists; the session is already `Running` (or
    /// `Completed`, for an empty range).
    pub async fn start(&self, config: ScanConfig) -> String {
        let (scan_id, session, plan) = self.prepare(config).await;
        let prober = self.prober.clone();
        tokio::spawn(execute(prober, session, plan));
        scan_id
    }

    /// Register a scan and wait for it to finish.
    pub async fn run(&self, config: ScanConfig) -> ScanSnapshot {
        let (_, session, plan) = self.prepare(config).await;
        execute(self.prober.clone(), session.clone(), plan).await;
        let guard = session.lock().await;
        guard.snapshot()
    }

    async fn prepare(&self, config: ScanConfig) -> (String, SessionHandle, PortPlan) {
        let plan = PortPlan::build(&config);
        let (scan_id, session) = self.store.register(config, plan.len() as u64).await;
        if plan.is_empty() {
            session.lock().await.finish();
        }
        (scan_id, session, plan)
    }
}

/// Probe every planned port with at most `max_concurrency` probes in flight,
/// then mark the session completed.
async fn execute(prober: Arc<dyn Prober>, session: SessionHandle, plan: PortPlan) {
    if plan.is_empty() {
        return;
    }
    let (scan_id, config) = {
        let s = session.lock().await;
        (s.scan_id().to_string(), s.config().clone())
    };
    info!(
        scan_id = %scan_id,
        target = %config.target,
        algorithm = %config.algorithm,
        method = %config.method,
        ports = plan.len(),
        concurrency = config.max_concurrency,
        "scan started"
    );

    if config.method.requires_raw_socket() && !probe::raw_sockets_available() {
        warn!(
            scan_id = %scan_id,
            method = %config.method,
            "raw sockets unavailable (needs root or CAP_NET_RAW); every port will report as not open"
        );
    }

    let addr: Result<IpAddr, ProbeError> = netdetect::resolve_target(&config.target).await;
    if let Err(e) = &addr {
        warn!(scan_id = %scan_id, error = %e, "target did not resolve");
    }

    let method = config.method;
    let sem = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut set = JoinSet::new();

    for port in plan.dispatch_order() {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("scan semaphore is never closed");
        let prober = prober.clone();
        let session = session.clone();
        let addr = addr.clone();

        set.spawn(async move {
            let _permit = permit; // held until the probe has been recorded

            let outcome = match addr {
                Ok(ip) => prober.probe(ip, port, method).await,
                Err(e) => Err(e),
            };
            let finding = finding_for(port, method, outcome);
            session.lock().await.record(finding);
        });
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            // The task died before recording; still count its port.
            warn!(scan_id = %scan_id, error = %e, "probe task failed");
            session.lock().await.record(None);
        }
    }

    let mut s = session.lock().await;
    s.finish();
    info!(
        scan_id = %scan_id,
        open = s.open_ports().len(),
        progress = s.progress(),
        total = s.total_ports(),
        elapsed_ms = s.elapsed().map(|d| d.as_millis() as u64).unwrap_or_default(),
        "scan completed"
    );
}

/// Turn one probe outcome into what the session records: a finding with risk
/// metadata for an open port, nothing otherwise. Probe errors count as not open.
pub fn finding_for(port: u16, method: ProbeMethod, outcome: Result<Verdict, ProbeError>) -> Option<PortFinding> {
    let verdict = match outcome {
        Ok(v) => v,
        Err(e) => {
            debug!(port, method = %method, error = %e, "probe failed");
            return None;
        }
    };
    if !verdict.is_open() {
        return None;
    }
    Some(PortFinding {
        port,
        verdict,
        service: service::service_name(port, method.protocol()),
        risk: risk::lookup(port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;

    #[test]
    fn errors_map_to_no_finding() {
        for e in [
            ProbeError::Timeout,
            ProbeError::Io("reset".into()),
            ProbeError::RawSocket("EPERM".into()),
            ProbeError::Resolve {
                host: "x".into(),
                reason: "nxdomain".into(),
            },
        ] {
            assert!(finding_for(80, ProbeMethod::Connect, Err(e)).is_none());
        }
    }

    #[test]
    fn closed_and_filtered_are_dropped() {
        assert!(finding_for(80, ProbeMethod::Syn, Ok(Verdict::Closed)).is_none());
        assert!(finding_for(80, ProbeMethod::Syn, Ok(Verdict::Filtered)).is_none());
    }

    #[test]
    fn open_port_carries_risk() {
        let f = finding_for(3389, ProbeMethod::Connect, Ok(Verdict::Open)).unwrap();
        assert_eq!(f.port, 3389);
        assert_eq!(f.verdict, Verdict::Open);
        assert_eq!(f.risk.name, "RDP");
        assert_eq!(f.risk.risk_level, RiskLevel::Critical);
        assert!(!f.service.is_empty());
    }
}
