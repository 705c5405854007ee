//! The AT command subset needed for SMS retrieval and deletion.

use std::fmt;

/// Terminator appended to every command on the wire.
pub const LINE_END: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// Liveness probe, also used for auto-baud detection
    Attention,
    DisableEcho,
    SimStatus,
    /// Read, write and receive storage all on the SIM
    SelectSimStorage,
    PduMode,
    /// Store incoming SMS and notify with `+CMTI`
    EnableNewMessageNotice,
    /// List every stored message (status 4 = all) in PDU form
    ListAll,
    Delete(u32),
}

impl AtCommand {
    /// Bytes to write, including the CRLF terminator.
    pub fn to_wire(&self) -> String {
        format!("{}{}", self, LINE_END)
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::Attention => f.write_str("AT"),
            AtCommand::DisableEcho => f.write_str("ATE0"),
            AtCommand::SimStatus => f.write_str("AT+CPIN?"),
            AtCommand::SelectSimStorage => f.write_str("AT+CPMS=\"SM\",\"SM\",\"SM\""),
            AtCommand::PduMode => f.write_str("AT+CMGF=0"),
            AtCommand::EnableNewMessageNotice => f.write_str("AT+CNMI=2,1,0,0,0"),
            AtCommand::ListAll => f.write_str("AT+CMGL=4"),
            AtCommand::Delete(index) => write!(f, "AT+CMGD={}", index),
        }
    }
}

/// Initialization sequence sent before entering the steady-state loop.
pub fn init_sequence(probe_attempts: usize) -> Vec<AtCommand> {
    let mut seq = vec![AtCommand::Attention; probe_attempts.max(1)];
    seq.extend([
        AtCommand::DisableEcho,
        AtCommand::SimStatus,
        AtCommand::SelectSimStorage,
        AtCommand::PduMode,
        AtCommand::EnableNewMessageNotice,
    ]);
    seq
}
