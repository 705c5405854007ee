//! Hex and bit-level primitives used by the PDU decoder.
//!
//! Everything here is pure and allocation-light: hex digit pairs to octets,
//! semi-octet (swapped nibble BCD) phone numbers, GSM 7-bit septet unpacking and
//! UCS2 to UTF-8 transcoding.

use super::DecodeError;

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Two ASCII hex digits (either case) to one octet.
pub fn hex_to_byte(pair: &[u8]) -> Result<u8, DecodeError> {
    match pair {
        [hi, lo] => match (nibble(*hi), nibble(*lo)) {
            (Some(h), Some(l)) => Ok((h << 4) | l),
            _ => Err(DecodeError::InvalidHex),
        },
        _ => Err(DecodeError::InvalidHex),
    }
}

/// Convert a whole hex string. Odd lengths are rejected as invalid hex.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, DecodeError> {
    let raw = hex.as_bytes();
    if raw.len() % 2 != 0 { return Err(DecodeError::InvalidHex); }
    raw.chunks(2).map(hex_to_byte).collect()
}

/// Decode a semi-octet number given as hex digits.
///
/// Within each encoded octet the second hex character (low nibble) carries the
/// earlier digit. Decoding stops at an `F` padding nibble and never yields more
/// than `digit_count` digits.
pub fn decode_semi_octets(hex_digits: &str, digit_count: usize) -> String {
    let mut out = String::with_capacity(digit_count);
    for pair in hex_digits.as_bytes().chunks(2) {
        let ordered = match pair {
            [hi, lo] => [*lo, *hi],
            [single] => [*single, b'F'],
            _ => break,
        };
        for c in ordered {
            if out.len() >= digit_count || c == b'F' || c == b'f' {
                return out;
            }
            out.push(c as char);
        }
    }
    out
}

/// Inverse of [`decode_semi_octets`]: odd digit counts are padded with `F`.
pub fn encode_semi_octets(digits: &str) -> String {
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| match pair {
            [first, second] => format!("{}{}", *second as char, *first as char),
            [first] => format!("F{}", *first as char),
            _ => String::new(),
        })
        .collect()
}

/// Map a GSM default-alphabet septet to a char, ASCII range only.
pub(crate) fn gsm7_char(septet: u8) -> char {
    match septet {
        0x0A => '\n',
        0x0D => '\r',
        0x20..=0x7E => septet as char,
        _ => '?',
    }
}

/// Bit offset of the first septet following a user data header of `header_bits`.
pub fn septet_fill_bits(header_bits: usize) -> usize {
    (7 - header_bits % 7) % 7
}

/// Unpack `septet_count` 7-bit characters packed little-endian into `bytes`.
///
/// `bytes` starts at the first octet after any user data header; `header_bits`
/// is that header's length in bits and only determines the fill offset.
/// Unpacking stops early if the data runs out.
pub fn unpack_gsm7(bytes: &[u8], septet_count: usize, header_bits: usize) -> String {
    let mut out = String::with_capacity(septet_count);
    let mut bit_pos = septet_fill_bits(header_bits);
    for _ in 0..septet_count {
        let byte_idx = bit_pos / 8;
        let shift = bit_pos % 8;
        let Some(&first) = bytes.get(byte_idx) else { break };
        let mut value = u16::from(first) >> shift;
        if shift > 1 {
            // septet straddles into an octet that is not there
            let Some(&next) = bytes.get(byte_idx + 1) else { break };
            value |= u16::from(next) << (8 - shift);
        }
        out.push(gsm7_char((value & 0x7F) as u8));
        bit_pos += 7;
    }
    out
}

/// Decode big-endian UCS2 code units starting at `start_octet`.
///
/// A trailing odd octet is ignored; unpaired surrogates become U+FFFD.
pub fn decode_ucs2(bytes: &[u8], start_octet: usize) -> String {
    let data = bytes.get(start_octet..).unwrap_or(&[]);
    let units = data.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
