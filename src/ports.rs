use std::collections::HashSet;

use crate::error::ConfigError;
use crate::types::{Algorithm, ScanConfig};

/// Well-known service ports probed first when `common_ports_first` is set.
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900, 8080,
];

/// Common ports that fall inside `[lo, hi]`, in reference order.
pub fn common_ports_in_range(lo: u16, hi: u16) -> Vec<u16> {
    COMMON_PORTS
        .iter()
        .copied()
        .filter(|p| (lo..=hi).contains(p))
        .collect()
}

/// Parse a port range argument.
///
/// Supported forms:
/// - single port: `80`
/// - inclusive range: `1-1024`
///
/// `start > end` is accepted and describes an empty range.
pub fn parse_port_range(s: &str) -> Result<(u16, u16), ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::InvalidRange { input: s.to_string() });
    }
    if let Some((a, b)) = s.split_once('-') {
        let start = parse_port_str(a.trim(), s)?;
        let end = parse_port_str(b.trim(), s)?;
        return Ok((start, end));
    }
    let p = parse_port_str(s, s)?;
    Ok((p, p))
}

/// Check that a raw bound (as received from a caller) is a usable port.
pub fn validate_port(value: u32) -> Result<u16, ConfigError> {
    if value == 0 || value > u32::from(u16::MAX) {
        return Err(ConfigError::PortOutOfRange { value });
    }
    Ok(value as u16)
}

fn parse_port_str(s: &str, whole: &str) -> Result<u16, ConfigError> {
    let val: u32 = s.parse().map_err(|_| ConfigError::InvalidRange {
        input: whole.to_string(),
    })?;
    validate_port(val)
}

/// The ordered port sequence of one scan together with the discipline used to
/// dispatch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPlan {
    algorithm: Algorithm,
    sequence: Vec<u16>,
}

impl PortPlan {
    /// Build the plan for `config`.
    ///
    /// BFS: common ports in reference order, then the rest ascending.
    /// DFS: common ports in reverse order, then the rest descending.
    /// Every port of the range appears exactly once; an inverted range is empty.
    pub fn build(config: &ScanConfig) -> Self {
        let (lo, hi) = (config.port_start, config.port_end);
        let mut sequence = Vec::new();
        if lo <= hi {
            sequence.reserve(usize::from(hi - lo) + 1);
            let mut seen = HashSet::new();
            let mut common = if config.common_ports_first {
                common_ports_in_range(lo, hi)
            } else {
                Vec::new()
            };
            if config.algorithm == Algorithm::Dfs {
                common.reverse();
            }
            for p in common {
                if seen.insert(p) {
                    sequence.push(p);
                }
            }
            match config.algorithm {
                Algorithm::Bfs => sequence.extend((lo..=hi).filter(|p| !seen.contains(p))),
                Algorithm::Dfs => sequence.extend((lo..=hi).rev().filter(|p| !seen.contains(p))),
            }
        }
        Self {
            algorithm: config.algorithm,
            sequence,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Planned sequence, in the order it was built.
    pub fn sequence(&self) -> &[u16] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Ports in the order they are handed to probes: popped from the front
    /// (queue) for BFS, from the back (stack) for DFS.
    pub fn dispatch_order(self) -> DispatchOrder {
        DispatchOrder {
            algorithm: self.algorithm,
            inner: self.sequence.into_iter(),
        }
    }
}

/// Iterator returned by [`PortPlan::dispatch_order`].
#[derive(Debug)]
pub struct DispatchOrder {
    algorithm: Algorithm,
    inner: std::vec::IntoIter<u16>,
}

impl Iterator for DispatchOrder {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        match self.algorithm {
            Algorithm::Bfs => self.inner.next(),
            Algorithm::Dfs => self.inner.next_back(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for DispatchOrder {}
