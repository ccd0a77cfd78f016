//! Best-effort port → service name lookup backed by the system services table.
use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

const SERVICES_PATH: &str = "/etc/services";

pub const UNKNOWN_SERVICE: &str = "unknown";

/// (port, protocol) → service name.
#[derive(Debug, Default, Clone)]
pub struct ServiceTable {
    entries: HashMap<(u16, String), String>,
}

impl ServiceTable {
    /// Parse the `services(5)` format: `name port/proto [aliases...] [# comment]`.
    /// Malformed lines are skipped; the first name listed for a port wins.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for raw_line in content.lines() {
            let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, proto)) = port_proto.split_once('/') else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };
            entries
                .entry((port, proto.to_ascii_lowercase()))
                .or_insert_with(|| name.to_string());
        }
        Self { entries }
    }

    /// Load the system table; an unreadable file yields an empty table.
    pub fn load_system() -> Self {
        match std::fs::read_to_string(SERVICES_PATH) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                debug!(path = SERVICES_PATH, error = %e, "services table unavailable");
                Self::default()
            }
        }
    }

    pub fn get(&self, port: u16, protocol: &str) -> Option<&str> {
        self.entries
            .get(&(port, protocol.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn system_table() -> &'static ServiceTable {
    static TABLE: OnceLock<ServiceTable> = OnceLock::new();
    TABLE.get_or_init(ServiceTable::load_system)
}

/// Service name registered for `port`/`protocol`, or `"unknown"`.
pub fn service_name(port: u16, protocol: &str) -> String {
    system_table()
        .get(port, protocol)
        .unwrap_or(UNKNOWN_SERVICE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# Network services, Internet style
tcpmux          1/tcp                           # TCP port service multiplexer
ssh             22/tcp                          # SSH Remote Login Protocol
domain          53/tcp
domain          53/udp
http            80/tcp          www             # WorldWideWeb HTTP
www-alt         80/tcp
broken          notaport/tcp
noproto         99
"#;

    #[test]
    fn parses_names_by_protocol() {
        let t = ServiceTable::parse(SAMPLE);
        assert_eq!(t.get(22, "tcp"), Some("ssh"));
        assert_eq!(t.get(53, "udp"), Some("domain"));
        assert_eq!(t.get(22, "udp"), None);
    }

    #[test]
    fn first_entry_wins_and_junk_is_skipped() {
        let t = ServiceTable::parse(SAMPLE);
        assert_eq!(t.get(80, "tcp"), Some("http"));
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn missing_port_is_unknown() {
        assert_eq!(service_name(0, "tcp"), UNKNOWN_SERVICE);
    }
}
