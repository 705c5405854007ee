//! Library entry for simbridge components used by the binary and tests.

pub mod bridge;
pub mod config;
pub mod metrics;
pub mod modem;
pub mod pdu;
pub mod publish;
pub mod text;
