use simbridge::modem::{AtFramer, FrameOverflow, Record};

const PDU: &str = "07917283010010F5040BC87238880900F10000993092516195800AE8329BFD4697D9EC37";

fn entry(index: u32) -> Record {
    Record::ListEntry { index, status: "1".into(), length: Some(24), pdu: PDU.into() }
}

#[test]
fn list_entry_split_across_reads() {
    let mut f = AtFramer::default();
    f.push(b"\r\n+CMGL: 1,1,,24\r\n").unwrap();
    assert_eq!(f.next_record(), None, "header alone is not a record");
    f.push(&PDU.as_bytes()[..30]).unwrap();
    assert_eq!(f.next_record(), None, "PDU line not terminated yet");
    f.push(&PDU.as_bytes()[30..]).unwrap();
    f.push(b"\r\n").unwrap();
    assert_eq!(f.next_record(), Some(entry(1)));
    assert_eq!(f.next_record(), None);
}

#[test]
fn one_read_with_several_records() {
    let mut f = AtFramer::default();
    let chunk = format!("AT+CMGL=4\r\r\n+CMGL: 1,1,,24\r\n{PDU}\r\n+CMGL: 2,1,,24\r\n{PDU}\r\n\r\nOK\r\n");
    f.push(chunk.as_bytes()).unwrap();
    let got: Vec<Record> = f.records().collect();
    assert_eq!(got, vec![entry(1), entry(2), Record::Ok]);
    assert!(f.buffered().is_empty());
}

#[test]
fn markers_only_count_at_line_start() {
    let mut f = AtFramer::default();
    f.push(b"NOK then +CMTI: \"SM\",9\r\n").unwrap();
    assert_eq!(f.next_record(), None);
    f.push(b"OK\r\n").unwrap();
    assert_eq!(f.next_record(), Some(Record::Ok));
}

#[test]
fn unsolicited_notice_and_status_lines() {
    let mut f = AtFramer::default();
    f.push(b"+CMTI: \"SM\",12\r\n+CPMS: 3,30,3,30,3,30\r\n+CPIN: SIM PIN\r\n").unwrap();
    let got: Vec<Record> = f.records().collect();
    assert_eq!(got, vec![
        Record::NewMessage { storage: "SM".into(), index: 12 },
        Record::Status { tag: "CPMS".into(), value: "3,30,3,30,3,30".into() },
        Record::Status { tag: "CPIN".into(), value: "SIM PIN".into() },
    ]);
}

#[test]
fn list_header_without_length() {
    let mut f = AtFramer::default();
    f.push(format!("+CMGL: 4,\"REC UNREAD\"\r\n{PDU}\r\n").as_bytes()).unwrap();
    assert_eq!(
        f.next_record(),
        Some(Record::ListEntry { index: 4, status: "REC UNREAD".into(), length: None, pdu: PDU.into() })
    );
}

#[test]
fn unparseable_marker_line_is_malformed() {
    let mut f = AtFramer::default();
    f.push(b"+CMTI: \"SM\"\r\n+CMGL: x,1,,24\r\nABCD\r\n").unwrap();
    let got: Vec<Record> = f.records().collect();
    assert_eq!(got, vec![
        Record::Malformed { line: "+CMTI: \"SM\"".into() },
        Record::Malformed { line: "+CMGL: x,1,,24".into() },
    ]);
}

#[test]
fn overflow_drops_buffer_and_chunk() {
    let mut f = AtFramer::new(64, 32);
    f.push(b"+CMGL: 1,1,,24\r\n0123456789").unwrap();
    let err = f.push(&[b'A'; 50]).unwrap_err();
    assert_eq!(err, FrameOverflow { dropped: 76 });
    assert!(f.buffered().is_empty());

    // the framer keeps working afterwards
    f.push(b"OK\r\n").unwrap();
    assert_eq!(f.next_record(), Some(Record::Ok));
}

#[test]
fn unterminated_junk_is_discarded() {
    let mut f = AtFramer::new(64, 32);
    f.push(&[b'x'; 40]).unwrap();
    assert_eq!(f.next_record(), None);
    assert!(f.buffered().is_empty());
}

#[test]
fn noise_lines_are_consumed() {
    let mut f = AtFramer::default();
    f.push(b"RING\r\n\r\nRDY\r\npart").unwrap();
    assert_eq!(f.next_record(), None);
    assert_eq!(f.buffered(), b"part");
}
