use thiserror::Error;

/// Invalid caller input. Surfaced to the caller, never fatal to the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("port out of range: {value} (must be 1-65535)")]
    PortOutOfRange { value: u32 },

    #[error("invalid port range: '{input}'")]
    InvalidRange { input: String },

    #[error("invalid concurrency limit: {value} (must be >= 1)")]
    InvalidConcurrency { value: usize },
}

/// Why a single probe could not produce a verdict.
///
/// Never leaves the scan engine: the coordinator turns every variant into a
/// not-open result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("could not resolve '{host}': {reason}")]
    Resolve { host: String, reason: String },

    #[error("probe timed out")]
    Timeout,

    #[error("network error: {0}")]
    Io(String),

    #[error("raw socket unavailable: {0}")]
    RawSocket(String),

    #[error("{method} probes do not support {addr}")]
    Unsupported { method: &'static str, addr: String },

    #[error("probe task aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        ProbeError::Io(format!("{} ({:?})", e, e.kind()))
    }
}
