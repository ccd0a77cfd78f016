use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Critical => "Critical",
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Static risk text attached to an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RiskDescriptor {
    pub name: String,
    pub risk_level: RiskLevel,
    pub risk_description: String,
    pub recommendations: String,
}

struct RiskEntry {
    port: u16,
    name: &'static str,
    level: RiskLevel,
    description: &'static str,
    recommendation: &'static str,
}

const fn entry(
    port: u16,
    name: &'static str,
    level: RiskLevel,
    description: &'static str,
    recommendation: &'static str,
) -> RiskEntry {
    RiskEntry {
        port,
        name,
        level,
        description,
        recommendation,
    }
}

use RiskLevel::{Critical, High, Low, Medium};

const RISK_TABLE: &[RiskEntry] = &[
    entry(21, "FTP", High, "File Transfer Protocol is prone to brute force.", "Use SFTP or FTPS."),
    entry(22, "SSH", Medium, "Encrypted shell access.", "Use key-based authentication."),
    entry(23, "Telnet", Critical, "Data is sent without encryption.", "Use SSH."),
    entry(25, "SMTP", Medium, "Can be abused as a spam relay.", "Require SMTP AUTH."),
    entry(53, "DNS", Medium, "Prone to cache poisoning.", "Deploy DNSSEC."),
    entry(80, "HTTP", High, "Traffic is not encrypted.", "Use HTTPS."),
    entry(110, "POP3", High, "Credentials are sent without encryption.", "Use POP3S."),
    entry(135, "RPC", High, "Frequently exploited.", "Block this port."),
    entry(139, "NetBIOS", High, "Exposed to file-sharing attacks.", "Block this port externally."),
    entry(143, "IMAP", High, "Mail is transferred without encryption.", "Use IMAPS."),
    entry(443, "HTTPS", Low, "Already encrypted.", "Keep TLS up to date."),
    entry(445, "SMB", Critical, "Common ransomware vector.", "Patch regularly."),
    entry(993, "IMAPS", Low, "Encrypted mail.", "SSL/TLS is adequate."),
    entry(995, "POP3S", Low, "Encrypted mail.", "SSL/TLS is adequate."),
    entry(1723, "PPTP", High, "Weak VPN protocol.", "Use OpenVPN."),
    entry(3306, "MySQL", High, "Database exposed to the network.", "Enable SSL."),
    entry(3389, "RDP", Critical, "Ransomware target.", "Put it behind a VPN and enable 2FA."),
    entry(5900, "VNC", Critical, "No strong encryption.", "Put it behind a VPN."),
    entry(8080, "HTTP Alt", High, "Proxy or web server without encryption.", "Use HTTPS."),
];

/// Risk descriptor for `port`. Ports missing from the table get the
/// `Unknown` descriptor.
pub fn lookup(port: u16) -> RiskDescriptor {
    match RISK_TABLE.iter().find(|e| e.port == port) {
        Some(e) => RiskDescriptor {
            name: e.name.to_string(),
            risk_level: e.level,
            risk_description: e.description.to_string(),
            recommendations: e.recommendation.to_string(),
        },
        None => unknown(),
    }
}

fn unknown() -> RiskDescriptor {
    RiskDescriptor {
        name: "Unknown".to_string(),
        risk_level: RiskLevel::Unknown,
        risk_description: "No information available.".to_string(),
        recommendations: "Research this service further.".to_string(),
    }
}
