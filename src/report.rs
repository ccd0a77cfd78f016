use std::fmt::Write as _;

use crate::types::ScanSnapshot;

pub const REPORT_TITLE: &str = "PortMaster Scan Report";

/// Render a plain-text report for a scan snapshot (finished or not).
pub fn render_text(s: &ScanSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{REPORT_TITLE}");
    let _ = writeln!(out, "{}", "=".repeat(REPORT_TITLE.len()));
    let _ = writeln!(out, "Target: {}", s.target);
    let _ = writeln!(out, "Algorithm: {}", s.algorithm);
    let _ = writeln!(out, "Method: {}", s.method);
    let _ = writeln!(out, "Start: {}", s.start_time);
    if let Some(end) = &s.end_time {
        let _ = writeln!(out, "End: {end}");
    }
    let _ = writeln!(out, "Total Ports: {}", s.total_ports);
    let _ = writeln!(out);
    let _ = writeln!(out, "Open Ports:");
    if s.open_ports.is_empty() {
        let _ = writeln!(out, "No open ports found.");
    } else {
        for p in &s.open_ports {
            let _ = writeln!(out, "{} ({}) - Risk: {}", p.port, p.service, p.risk.risk_level);
        }
    }
    out
}

/// Download file name for a report.
pub fn file_name(scan_id: &str) -> String {
    let safe: String = scan_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("scan-{safe}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk;
    use crate::types::{PortFinding, ProbeMethod, ScanStatus, Verdict};

    fn snapshot(open: &[u16]) -> ScanSnapshot {
        ScanSnapshot {
            scan_id: "10.0.0.1_1700000000".into(),
            target: "10.0.0.1".into(),
            algorithm: "BFS".into(),
            method: ProbeMethod::Connect,
            common_ports_first: true,
            port_range_start: 1,
            port_range_end: 1024,
            status: ScanStatus::Completed,
            progress: 1024,
            total_ports: 1024,
            open_ports: open
                .iter()
                .map(|&port| PortFinding {
                    port,
                    verdict: Verdict::Open,
                    service: "svc".into(),
                    risk: risk::lookup(port),
                })
                .collect(),
            start_time: "2024-05-01 10:00:00 UTC".into(),
            end_time: Some("2024-05-01 10:00:05 UTC".into()),
            elapsed_time: Some("5.00".into()),
        }
    }

    #[test]
    fn lists_open_ports_with_risk() {
        let text = render_text(&snapshot(&[80, 23]));
        assert!(text.starts_with(REPORT_TITLE));
        assert!(text.contains("Target: 10.0.0.1"));
        assert!(text.contains("Total Ports: 1024"));
        assert!(text.contains("80 (svc) - Risk: High"));
        assert!(text.contains("23 (svc) - Risk: Critical"));
        assert!(!text.contains("No open ports found."));
    }

    #[test]
    fn empty_scan_says_so() {
        let text = render_text(&snapshot(&[]));
        assert!(text.contains("No open ports found."));
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(file_name("a b/c_1"), "scan-a_b_c_1.txt");
    }
}
