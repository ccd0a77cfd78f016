//! Library crate for portmaster exposing the scan engine and its web surface.
pub mod error;
pub mod netdetect;
pub mod ports;
pub mod probe;
pub mod report;
pub mod risk;
pub mod scanner;
pub mod server;
pub mod service;
pub mod session;
pub mod types;
