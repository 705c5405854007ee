//! GSM 03.40 SMS-DELIVER decoding
//!
//! Modems in PDU mode (`AT+CMGF=0`) list stored messages as hex strings. This
//! module turns one such string into a [`DecodedMessage`]: the sender address,
//! the message text and, for concatenated messages, the reference/part triple
//! carried in the user data header.
//!
//! Supported alphabets are GSM 7-bit (ASCII range only, see [`codec::unpack_gsm7`]),
//! UCS2 and 8-bit data (rendered through the same ASCII fallback).

pub mod codec;

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::text::BoundedText;
use codec::{decode_semi_octets, decode_ucs2, gsm7_char, hex_to_bytes, unpack_gsm7};

/// Maximum sender length in chars (E.164 digits plus optional '+').
pub const MAX_SENDER_LEN: usize = 31;
/// Maximum decoded text length in bytes.
pub const MAX_TEXT_LEN: usize = 511;
/// Anything shorter (in hex chars) cannot hold the mandatory SMS-DELIVER fields.
pub const MIN_PDU_HEX_LEN: usize = 20;

const IEI_CONCAT_8BIT: u8 = 0x00;
const IEI_CONCAT_16BIT: u8 = 0x08;
const TIMESTAMP_OCTETS: usize = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("PDU too short: {len} hex chars")]
    TooShort { len: usize },
    #[error("invalid hex digit in PDU")]
    InvalidHex,
    #[error("not an SMS-DELIVER PDU (type=0x{pdu_type:02X})")]
    NotDeliver { pdu_type: u8 },
    #[error("PDU truncated while reading {field}")]
    Truncated { field: &'static str },
}

/// Concatenated SMS information from the user data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Concatenation {
    pub reference: u16,
    pub total_parts: u8,
    pub part_index: u8,
}

/// One decoded SMS-DELIVER record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedMessage {
    pub sender: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concatenation: Option<Concatenation>,
}

/// Character set selected by the data coding scheme octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    Gsm7,
    EightBit,
    Ucs2,
}

impl Alphabet {
    /// Interpret a DCS octet per the GSM 03.38 coding groups.
    pub fn from_dcs(dcs: u8) -> Self {
        match dcs >> 4 {
            // general data coding, with or without automatic deletion
            0x0..=0x7 => match (dcs >> 2) & 0x03 {
                1 => Alphabet::EightBit,
                2 => Alphabet::Ucs2,
                _ => Alphabet::Gsm7,
            },
            0xC | 0xD => Alphabet::Gsm7,
            0xE => Alphabet::Ucs2,
            0xF if dcs & 0x04 != 0 => Alphabet::EightBit,
            _ => Alphabet::Gsm7,
        }
    }
}

/// Decode one hex PDU as listed by `AT+CMGL`.
pub fn decode(pdu_hex: &str) -> Result<DecodedMessage, DecodeError> {
    let mut out = DecodedMessage::default();
    decode_into(pdu_hex, &mut out)?;
    Ok(out)
}

/// Decode into an existing value. `out` is reset before anything else happens,
/// so after a failure it is always the empty message.
pub fn decode_into(pdu_hex: &str, out: &mut DecodedMessage) -> Result<(), DecodeError> {
    *out = DecodedMessage::default();
    let hex = pdu_hex.trim();
    if hex.len() < MIN_PDU_HEX_LEN {
        warn!("PDU too short: {} chars", hex.len());
        return Err(DecodeError::TooShort { len: hex.len() });
    }
    let bytes = hex_to_bytes(hex)?;
    let decoded = parse_deliver(hex, &bytes)?;
    debug!("Decoded PDU: from={} len={} concat={:?}", decoded.sender, decoded.text.len(), decoded.concatenation);
    *out = decoded;
    Ok(())
}

fn octet(bytes: &[u8], pos: usize, field: &'static str) -> Result<u8, DecodeError> {
    bytes.get(pos).copied().ok_or(DecodeError::Truncated { field })
}

fn parse_deliver(hex: &str, bytes: &[u8]) -> Result<DecodedMessage, DecodeError> {
    // SMSC block: length octet followed by that many octets
    let smsc_len = octet(bytes, 0, "SMSC length")? as usize;
    let mut pos = 1 + smsc_len;

    let pdu_type = octet(bytes, pos, "PDU type")?;
    pos += 1;
    if pdu_type & 0x03 != 0x00 {
        warn!("Not SMS-DELIVER: type=0x{:02X}", pdu_type);
        return Err(DecodeError::NotDeliver { pdu_type });
    }
    let has_udh = pdu_type & 0x40 != 0;

    let oa_digits = octet(bytes, pos, "originating address length")? as usize;
    let oa_type = octet(bytes, pos + 1, "originating address type")?;
    pos += 2;
    let oa_octets = (oa_digits + 1) / 2;
    if pos + oa_octets > bytes.len() {
        return Err(DecodeError::Truncated { field: "originating address" });
    }
    let sender = decode_address(&hex[pos * 2..(pos + oa_octets) * 2], &bytes[pos..pos + oa_octets], oa_digits, oa_type);
    pos += oa_octets;

    // protocol identifier is not interpreted
    octet(bytes, pos, "protocol identifier")?;
    pos += 1;
    let alphabet = Alphabet::from_dcs(octet(bytes, pos, "data coding scheme")?);
    pos += 1 + TIMESTAMP_OCTETS;
    let udl = octet(bytes, pos, "user data length")? as usize;
    pos += 1;
    let ud = bytes.get(pos..).unwrap_or(&[]);

    let mut concatenation = None;
    let mut udh_octets = 0;
    if has_udh {
        let udhl = octet(ud, 0, "user data header length")? as usize;
        udh_octets = 1 + udhl;
        if udh_octets > ud.len() {
            return Err(DecodeError::Truncated { field: "user data header" });
        }
        concatenation = parse_concatenation(&ud[1..udh_octets]);
    }

    let mut text = BoundedText::with_capacity(MAX_TEXT_LEN);
    match alphabet {
        Alphabet::Gsm7 => {
            let udh_bits = udh_octets * 8;
            let header_septets = (udh_bits + 6) / 7;
            let septets = udl.saturating_sub(header_septets);
            text.push_str(&unpack_gsm7(&ud[udh_octets..], septets, udh_bits));
        }
        Alphabet::Ucs2 => {
            let end = udl.min(ud.len());
            text.push_str(&decode_ucs2(&ud[..end], udh_octets.min(end)));
        }
        Alphabet::EightBit => {
            let end = udl.min(ud.len());
            for &b in ud.get(udh_octets..end).unwrap_or(&[]) {
                if !text.push(gsm7_char(b)) { break; }
            }
        }
    }
    if text.is_truncated() {
        warn!("Decoded text exceeded {} bytes, truncated", MAX_TEXT_LEN);
    }

    Ok(DecodedMessage { sender, text: text.into_string(), concatenation })
}

fn decode_address(hex: &str, raw: &[u8], digits: usize, addr_type: u8) -> String {
    let mut sender = BoundedText::with_capacity(MAX_SENDER_LEN);
    match addr_type & 0x70 {
        0x10 => {
            sender.push('+');
            sender.push_str(&decode_semi_octets(hex, digits));
        }
        // alphanumeric: `digits` counts semi-octets of packed 7-bit text
        0x50 => {
            sender.push_str(&unpack_gsm7(raw, digits * 4 / 7, 0));
        }
        _ => {
            sender.push_str(&decode_semi_octets(hex, digits));
        }
    }
    sender.into_string()
}

/// Walk the information elements of a user data header (without its length octet).
fn parse_concatenation(header: &[u8]) -> Option<Concatenation> {
    let mut found = None;
    let mut i = 0;
    while i + 1 < header.len() {
        let iei = header[i];
        let iel = header[i + 1] as usize;
        let Some(data) = header.get(i + 2..i + 2 + iel) else { break };
        let candidate = match (iei, data) {
            (IEI_CONCAT_8BIT, &[reference, total, part]) => Some((u16::from(reference), total, part)),
            (IEI_CONCAT_16BIT, &[hi, lo, total, part]) => Some((u16::from_be_bytes([hi, lo]), total, part)),
            _ => None,
        };
        if let Some((reference, total_parts, part_index)) = candidate {
            if total_parts > 0 && part_index > 0 {
                debug!("Concatenated SMS: ref={} part {}/{}", reference, part_index, total_parts);
                found = Some(Concatenation { reference, total_parts, part_index });
            }
        }
        i += 2 + iel;
    }
    found
}
