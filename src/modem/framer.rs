//! Incremental extractor for AT response records.
//!
//! Serial reads arrive in arbitrary chunks: a `+CMGL:` header can be split from
//! its PDU line, or a single read can carry several list entries followed by the
//! final `OK`. [`AtFramer`] accumulates bytes and hands out one complete
//! [`Record`] at a time, keeping any unfinished tail for the next push.
//!
//! Markers are only recognized at the start of a line, so the `+CMGL` inside an
//! echoed `AT+CMGL=4` never starts a record. The earliest marker line wins; if
//! its record is not complete yet, extraction stops and waits for more bytes.
use bytes::{Buf, BytesMut};
use log::{debug, warn};
use thiserror::Error;

use crate::metrics;

/// Hard cap on buffered, unparsed input.
pub const DEFAULT_CAPACITY: usize = 4096;
/// A partial line with no marker larger than this is discarded.
pub const DEFAULT_JUNK_LIMIT: usize = 2048;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("accumulation buffer overflow, {dropped} bytes discarded")]
pub struct FrameOverflow {
    pub dropped: usize,
}

/// One complete response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// `+CMGL: <index>,<status>[,<alpha>],<length>` plus the PDU line
    ListEntry { index: u32, status: String, length: Option<usize>, pdu: String },
    /// `+CMTI: "<mem>",<index>`
    NewMessage { storage: String, index: u32 },
    /// Informational lines such as `+CPIN: READY`
    Status { tag: String, value: String },
    Ok,
    Error { code: Option<u16> },
    /// A marker line whose fields did not parse
    Malformed { line: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    ListEntry,
    NewMessage,
    Status,
    Ok,
    Error,
}

const MARKERS: &[(&[u8], Marker)] = &[
    (b"+CMGL:", Marker::ListEntry),
    (b"+CMTI:", Marker::NewMessage),
    (b"+CPIN:", Marker::Status),
    (b"+CPMS:", Marker::Status),
    (b"+CMS ERROR:", Marker::Error),
    (b"+CME ERROR:", Marker::Error),
    (b"OK", Marker::Ok),
    (b"ERROR", Marker::Error),
];

fn marker_at(line: &[u8]) -> Option<Marker> {
    MARKERS.iter().find(|(m, _)| line.starts_with(m)).map(|(_, kind)| *kind)
}

fn newline_after(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?.iter().position(|&b| b == b'\n').map(|p| from + p)
}

fn line_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

pub struct AtFramer {
    buf: BytesMut,
    capacity: usize,
    junk_limit: usize,
}

impl Default for AtFramer {
    fn default() -> Self { Self::new(DEFAULT_CAPACITY, DEFAULT_JUNK_LIMIT) }
}

impl AtFramer {
    pub fn new(capacity: usize, junk_limit: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), capacity, junk_limit: junk_limit.min(capacity) }
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> &[u8] { &self.buf }

    /// Append newly read bytes. If they would overflow the buffer, everything
    /// buffered and the incoming chunk are dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<(), FrameOverflow> {
        if self.buf.len() + data.len() > self.capacity {
            let dropped = self.buf.len() + data.len();
            self.buf.clear();
            metrics::inc_buffer_overflows();
            return Err(FrameOverflow { dropped });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Lazily yield every complete record currently buffered.
    pub fn records(&mut self) -> impl Iterator<Item = Record> + '_ {
        std::iter::from_fn(move || self.next_record())
    }

    /// Extract the next complete record, or `None` when more input is needed.
    pub fn next_record(&mut self) -> Option<Record> {
        let mut line_start = 0;
        loop {
            if let Some(marker) = marker_at(&self.buf[line_start..]) {
                return self.take_record(line_start, marker);
            }
            match newline_after(&self.buf, line_start) {
                Some(nl) => line_start = nl + 1,
                None => break,
            }
        }
        // No marker anywhere: complete lines are noise, keep only the partial tail
        if line_start > 0 {
            debug!("Discarding {} bytes of unrecognized output", line_start);
            self.buf.advance(line_start);
        }
        if self.buf.len() > self.junk_limit {
            warn!("Unterminated line exceeded {} bytes, clearing buffer", self.junk_limit);
            self.buf.clear();
            metrics::inc_buffer_overflows();
        }
        None
    }

    fn take_record(&mut self, start: usize, marker: Marker) -> Option<Record> {
        let header_end = newline_after(&self.buf, start)?;
        let end = match marker {
            Marker::ListEntry => newline_after(&self.buf, header_end + 1)?,
            _ => header_end,
        };
        let raw = self.buf.split_to(end + 1).freeze();
        let header = line_text(&raw[start..header_end]);
        let record = match marker {
            Marker::ListEntry => {
                let pdu = line_text(&raw[header_end + 1..]);
                parse_list_header(&header, pdu)
            }
            Marker::NewMessage => parse_new_message(&header),
            Marker::Status => parse_status(&header),
            Marker::Ok if header == "OK" => Some(Record::Ok),
            Marker::Error => parse_error(&header),
            Marker::Ok => None,
        };
        Some(record.unwrap_or(Record::Malformed { line: header }))
    }
}

fn fields_after<'a>(line: &'a str, tag: &str) -> Vec<&'a str> {
    line.strip_prefix(tag).unwrap_or("").split(',').map(str::trim).collect()
}

fn parse_list_header(header: &str, pdu: String) -> Option<Record> {
    let fields = fields_after(header, "+CMGL:");
    let index = fields.first()?.parse().ok()?;
    let status = fields.get(1)?.trim_matches('"').to_string();
    let length = if fields.len() > 2 { fields.last().and_then(|f| f.parse().ok()) } else { None };
    Some(Record::ListEntry { index, status, length, pdu })
}

fn parse_new_message(line: &str) -> Option<Record> {
    let fields = fields_after(line, "+CMTI:");
    let storage = fields.first()?.trim_matches('"').to_string();
    let index = fields.get(1)?.parse().ok()?;
    Some(Record::NewMessage { storage, index })
}

fn parse_status(line: &str) -> Option<Record> {
    let (tag, value) = line.strip_prefix('+')?.split_once(':')?;
    Some(Record::Status { tag: tag.to_string(), value: value.trim().to_string() })
}

fn parse_error(line: &str) -> Option<Record> {
    if line == "ERROR" {
        return Some(Record::Error { code: None });
    }
    let (_, code) = line.split_once("ERROR:")?;
    Some(Record::Error { code: code.trim().parse().ok() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_error_lines() {
        let mut f = AtFramer::default();
        f.push(b"+CPIN: READY\r\n+CMS ERROR: 321\r\nERROR\r\n").unwrap();
        let got: Vec<Record> = f.records().collect();
        assert_eq!(got, vec![
            Record::Status { tag: "CPIN".into(), value: "READY".into() },
            Record::Error { code: Some(321) },
            Record::Error { code: None },
        ]);
    }

    #[test]
    fn partial_marker_is_kept() {
        let mut f = AtFramer::default();
        f.push(b"+CM").unwrap();
        assert_eq!(f.next_record(), None);
        assert_eq!(f.buffered(), b"+CM");
        f.push(b"TI: \"SM\",4\r\n").unwrap();
        assert_eq!(f.next_record(), Some(Record::NewMessage { storage: "SM".into(), index: 4 }));
        assert!(f.buffered().is_empty());
    }
}
