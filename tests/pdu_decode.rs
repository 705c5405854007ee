use simbridge::pdu::{self, Concatenation, DecodeError, DecodedMessage};
use tokio_test::{assert_err, assert_ok};

// Reference SMS-DELIVER: SMSC +27381000015, sender 27838890001, "hellohello"
const HELLO: &str = "07917283010010F5040BC87238880900F10000993092516195800AE8329BFD4697D9EC37";

#[test]
fn gsm7_single_message() {
    let msg = assert_ok!(pdu::decode(HELLO));
    assert_eq!(msg.sender, "27838890001");
    assert_eq!(msg.text, "hellohello");
    assert_eq!(msg.concatenation, None);
}

#[test]
fn international_sender_gets_plus() {
    let hex = "00040B915892214365F700009930925161958002E834";
    let msg = assert_ok!(pdu::decode(hex));
    assert_eq!(msg.sender, "+85291234567");
    assert_eq!(msg.text, "hi");
}

#[test]
fn alphanumeric_sender() {
    let hex = "000004D0412100009930925161958002E834";
    let msg = assert_ok!(pdu::decode(hex));
    assert_eq!(msg.sender, "AB");
    assert_eq!(msg.text, "hi");
}

#[test]
fn ucs2_message() {
    let hex = "000004812143000899309251619580044F60597D";
    let msg = assert_ok!(pdu::decode(hex));
    assert_eq!(msg.sender, "1234");
    assert_eq!(msg.text, "你好");
}

#[test]
fn ucs2_with_8bit_concat_header() {
    let hex = "0040048121430008993092516195800A050003A502014F60597D";
    let msg = assert_ok!(pdu::decode(hex));
    assert_eq!(msg.text, "你好");
    assert_eq!(msg.concatenation, Some(Concatenation { reference: 0xA5, total_parts: 2, part_index: 1 }));
}

#[test]
fn ucs2_with_16bit_concat_header() {
    let hex = "0040048121430008993092516195800B06080401A503024E16754C";
    let msg = assert_ok!(pdu::decode(hex));
    assert_eq!(msg.text, "世界");
    assert_eq!(msg.concatenation, Some(Concatenation { reference: 0x01A5, total_parts: 3, part_index: 2 }));
}

#[test]
fn gsm7_after_header_honors_fill_bits() {
    // 6-octet header = 48 bits, 1 fill bit, then "Hi"
    let hex = format!("{}{}", "00400481214300009930925161958009050003420201", "9069");
    let msg = assert_ok!(pdu::decode(&hex));
    assert_eq!(msg.text, "Hi");
    assert_eq!(msg.concatenation, Some(Concatenation { reference: 0x42, total_parts: 2, part_index: 1 }));
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let msg = assert_ok!(pdu::decode(&format!("{}\r", HELLO)));
    assert_eq!(msg.text, "hellohello");
}

#[test]
fn too_short() {
    let err = assert_err!(pdu::decode("0791728301"));
    assert_eq!(err, DecodeError::TooShort { len: 10 });
}

#[test]
fn invalid_hex_digits() {
    let err = assert_err!(pdu::decode("0791728301ZZ10F5040BC872388809"));
    assert_eq!(err, DecodeError::InvalidHex);
}

#[test]
fn odd_length_is_invalid_hex() {
    let err = assert_err!(pdu::decode(&HELLO[..HELLO.len() - 1]));
    assert_eq!(err, DecodeError::InvalidHex);
}

#[test]
fn submit_pdu_is_not_deliver() {
    let err = assert_err!(pdu::decode("000104812143000099309251619580050000000000"));
    assert_eq!(err, DecodeError::NotDeliver { pdu_type: 0x01 });
}

#[test]
fn missing_user_data_is_truncated() {
    let err = assert_err!(pdu::decode("0000048121430000993092"));
    assert!(matches!(err, DecodeError::Truncated { .. }), "got {:?}", err);
}

#[test]
fn user_data_length_beyond_data_stops_at_last_whole_septet() {
    // UDL claims 11 septets, the 9 octets only hold 10
    let hex = HELLO.replace("95800AE8", "95800BE8");
    let msg = assert_ok!(pdu::decode(&hex));
    assert_eq!(msg.text, "hellohello");
}

#[test]
fn eight_bit_body_uses_ascii_fallback() {
    // DCS 0x04: "Hi!" followed by a non-printable octet
    let msg = assert_ok!(pdu::decode("00000481214300049930925161958004486921FF"));
    assert_eq!(msg.sender, "1234");
    assert_eq!(msg.text, "Hi!?");
}

#[test]
fn eight_bit_body_from_class_group_with_concat_header() {
    // DCS 0xF4, 8-bit concat header then "ok"
    let hex = format!("{}{}", "00400481214300F499309251619580080500037B0302", "6F6B");
    let msg = assert_ok!(pdu::decode(&hex));
    assert_eq!(msg.text, "ok");
    assert_eq!(msg.concatenation, Some(Concatenation { reference: 0x7B, total_parts: 3, part_index: 2 }));
}

#[test]
fn decode_into_resets_output_on_failure() {
    let mut out = DecodedMessage {
        sender: "stale".into(),
        text: "stale".into(),
        concatenation: Some(Concatenation { reference: 1, total_parts: 2, part_index: 1 }),
    };
    assert!(pdu::decode_into("00", &mut out).is_err());
    assert_eq!(out, DecodedMessage::default());

    assert_ok!(pdu::decode_into(HELLO, &mut out));
    assert_eq!(out.sender, "27838890001");
}

#[test]
fn decoded_message_serializes_without_empty_concat() {
    let msg = assert_ok!(pdu::decode(HELLO));
    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(json, r#"{"sender":"27838890001","text":"hellohello"}"#);
}
