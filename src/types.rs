use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ports;
use crate::risk::RiskDescriptor;

/// Order in which the planned port sequence is walked.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Queue discipline: ascending sweep, common ports in reference order.
    #[default]
    Bfs,
    /// Stack discipline: descending sweep, common ports reversed.
    Dfs,
}

impl Algorithm {
    pub fn label(self) -> &'static str {
        match self {
            Algorithm::Bfs => "BFS",
            Algorithm::Dfs => "DFS",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Probe technique used for every port of a scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    #[default]
    Connect,
    Syn,
    Ack,
    Fin,
    Null,
    Xmas,
    Udp,
}

impl ProbeMethod {
    pub const ALL: [ProbeMethod; 7] = [
        ProbeMethod::Connect,
        ProbeMethod::Syn,
        ProbeMethod::Ack,
        ProbeMethod::Fin,
        ProbeMethod::Null,
        ProbeMethod::Xmas,
        ProbeMethod::Udp,
    ];

    /// Methods that craft TCP segments by hand and therefore need a raw socket.
    pub fn requires_raw_socket(self) -> bool {
        matches!(
            self,
            ProbeMethod::Syn | ProbeMethod::Ack | ProbeMethod::Fin | ProbeMethod::Null | ProbeMethod::Xmas
        )
    }

    /// Transport protocol name used for service-table lookups.
    pub fn protocol(self) -> &'static str {
        match self {
            ProbeMethod::Udp => "udp",
            _ => "tcp",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeMethod::Connect => "connect",
            ProbeMethod::Syn => "syn",
            ProbeMethod::Ack => "ack",
            ProbeMethod::Fin => "fin",
            ProbeMethod::Null => "null",
            ProbeMethod::Xmas => "xmas",
            ProbeMethod::Udp => "udp",
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one probed port. Only `Open` is reported.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Open,
    Closed,
    Filtered,
}

impl Verdict {
    pub fn is_open(self) -> bool {
        matches!(self, Verdict::Open)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
}

/// Validated, immutable inputs of one scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub target: String,
    pub port_start: u16,
    pub port_end: u16,
    pub algorithm: Algorithm,
    pub method: ProbeMethod,
    pub common_ports_first: bool,
    pub max_concurrency: usize,
}

/// Upper bound applied to the requested concurrency.
pub const MAX_CONCURRENCY: usize = 5_000;

impl ScanConfig {
    /// Validate raw caller input. Bounds must be real ports; `start > end` is
    /// accepted and yields an empty scan. Concurrency is clamped to
    /// [`MAX_CONCURRENCY`].
    pub fn new(
        target: &str,
        port_start: u32,
        port_end: u32,
        algorithm: Algorithm,
        method: ProbeMethod,
        common_ports_first: bool,
        max_concurrency: usize,
    ) -> Result<Self, ConfigError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency { value: 0 });
        }
        Ok(Self {
            target: target.to_string(),
            port_start: ports::validate_port(port_start)?,
            port_end: ports::validate_port(port_end)?,
            algorithm,
            method,
            common_ports_first,
            max_concurrency: max_concurrency.min(MAX_CONCURRENCY),
        })
    }
}

/// One open port found during a scan, with its risk metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortFinding {
    pub port: u16,
    pub verdict: Verdict,
    pub service: String,
    #[serde(flatten)]
    pub risk: RiskDescriptor,
}

/// Point-in-time copy of a scan session, as served to callers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanSnapshot {
    pub scan_id: String,
    pub target: String,
    pub algorithm: String,
    pub method: ProbeMethod,
    pub common_ports_first: bool,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub status: ScanStatus,
    pub progress: u64,
    pub total_ports: u64,
    pub open_ports: Vec<PortFinding>,
    pub start_time: String,
    pub end_time: Option<String>,
    /// Seconds with two decimals, e.g. `"1.37"`.
    pub elapsed_time: Option<String>,
}

/// Row of the scan history listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanSummary {
    pub scan_id: String,
    pub target: String,
    pub algorithm: String,
    pub status: ScanStatus,
    pub start_time: String,
    pub open_ports: Vec<PortFinding>,
}

impl From<&ScanSnapshot> for ScanSummary {
    fn from(s: &ScanSnapshot) -> Self {
        Self {
            scan_id: s.scan_id.clone(),
            target: s.target.clone(),
            algorithm: s.algorithm.clone(),
            status: s.status,
            start_time: s.start_time.clone(),
            open_ports: s.open_ports.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        let ok = ScanConfig::new(" host ", 1, 1024, Algorithm::Bfs, ProbeMethod::Connect, true, 100).unwrap();
        assert_eq!(ok.target, "host");
        assert_eq!((ok.port_start, ok.port_end), (1, 1024));

        assert_eq!(
            ScanConfig::new("  ", 1, 2, Algorithm::Bfs, ProbeMethod::Connect, true, 1),
            Err(ConfigError::EmptyTarget)
        );
        assert_eq!(
            ScanConfig::new("h", 0, 2, Algorithm::Bfs, ProbeMethod::Connect, true, 1),
            Err(ConfigError::PortOutOfRange { value: 0 })
        );
        assert_eq!(
            ScanConfig::new("h", 1, 65536, Algorithm::Bfs, ProbeMethod::Connect, true, 1),
            Err(ConfigError::PortOutOfRange { value: 65536 })
        );
        assert_eq!(
            ScanConfig::new("h", 1, 2, Algorithm::Bfs, ProbeMethod::Connect, true, 0),
            Err(ConfigError::InvalidConcurrency { value: 0 })
        );
    }

    #[test]
    fn inverted_range_and_huge_concurrency_are_accepted() {
        let c = ScanConfig::new("h", 5, 1, Algorithm::Dfs, ProbeMethod::Udp, false, 1_000_000).unwrap();
        assert_eq!((c.port_start, c.port_end), (5, 1));
        assert_eq!(c.max_concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn wire_names() {
        assert_eq!(serde_json::to_string(&Algorithm::Dfs).unwrap(), "\"dfs\"");
        assert_eq!(serde_json::to_string(&ProbeMethod::Xmas).unwrap(), "\"xmas\"");
        assert_eq!(serde_json::to_string(&ScanStatus::Completed).unwrap(), "\"completed\"");
        let m: ProbeMethod = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(m, ProbeMethod::Null);
    }
}
