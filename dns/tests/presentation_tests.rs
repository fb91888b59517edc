use dns::record::{RData, RecordType};
use dns::{record_from_line, zone_records, Compressor, Message, Name};

use pretty_assertions::assert_eq;


/// Writes a record to wire bytes with a fresh compression map.
fn wire_bytes(record: &dns::record::Record) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut compressor = Compressor::new();
    record.write(&mut buf, &mut compressor).unwrap();
    buf
}


#[test]
fn mx_line_round_trips_to_equal_bytes() {
    let line = "example.com.\t3600\tIN\tMX\t10 mail.example.com.";
    let record = record_from_line(line).unwrap();

    let first_encoding = wire_bytes(&record);

    let mut cursor = std::io::Cursor::new(&first_encoding[..]);
    let read_back = dns::record::Record::read(&mut cursor).unwrap();
    assert_eq!(read_back, record);

    let reprinted = read_back.to_string();
    assert_eq!(reprinted, line);

    let reparsed = record_from_line(&reprinted).unwrap();
    assert_eq!(wire_bytes(&reparsed), first_encoding);
}


#[test]
fn every_octet_survives_name_escaping() {
    for value in 0 ..= 255_u8 {
        let name = Name::from_labels(vec![ vec![ value ], b"tld".to_vec() ]).unwrap();

        let printed = name.to_string();
        let reparsed = Name::parse(&printed)
            .unwrap_or_else(|e| panic!("failed to reparse {:?} (octet {}): {}", printed, value, e));
        assert_eq!(reparsed, name, "octet {} changed through printing", value);

        // and the same through the wire
        let mut buf = Vec::new();
        name.write(&mut buf, None).unwrap();
        let (read_back, _) = Name::read(&mut std::io::Cursor::new(&buf[..])).unwrap();
        assert_eq!(read_back, name, "octet {} changed through the wire", value);
    }
}


#[test]
fn printable_escapes_use_the_character_form() {
    let name = Name::from_labels(vec![ b"a.b".to_vec() ]).unwrap();
    assert_eq!(name.to_string(), "a\\.b.");

    let name = Name::from_labels(vec![ vec![ 0x07 ] ]).unwrap();
    assert_eq!(name.to_string(), "\\007.");
}


#[test]
fn root_delegation_transcript_parses() {
    let mut transcript = String::from("\
;; ->>HEADER<<- opcode: QUERY, status: NOERROR, id: 23910\n\
;; flags: qr rd; QUERY: 1, ANSWER: 0, AUTHORITY: 13, ADDITIONAL: 0\n\
\n\
;; QUESTION SECTION:\n\
;com.\tIN\tNS\n\
\n\
;; AUTHORITY SECTION:\n");
    for letter in b'a' ..= b'm' {
        transcript.push_str(&format!(
            "com.\t172800\tIN\tNS\t{}.gtld-servers.net.\n", char::from(letter)));
    }
    transcript.push_str("\n;; Query time: 12 msec\n;; MSG SIZE  rcvd: 504\n");

    let message = Message::from_transcript(&transcript).unwrap();
    assert_eq!(message.id, 23910);
    assert_eq!(message.authorities.len(), 13);
    assert!(message.authorities.iter().all(|r| r.ttl == 172_800));
    assert_eq!(message.size, 504);

    // the emitted transcript parses back to the same message, except
    // for the informative lines it does not repeat
    let reprinted = message.to_transcript();
    let reparsed = Message::from_transcript(&reprinted).unwrap();
    assert_eq!(reparsed, message);
}


#[test]
fn negative_answer_zone_lines_parse() {
    let soa = record_from_line(
        ". 86400 IN SOA a.root-servers.net. nstld.verisign-grs.com. \
         2018080200 1800 900 604800 86400").unwrap();
    assert_eq!(soa.rtype, RecordType::SOA);
    assert_eq!(soa.soa_minimum(), Some(86400));

    let nsec = record_from_line("id. 86400 IN NSEC ie. NS DS RRSIG NSEC").unwrap();
    assert_eq!(nsec.rtype, RecordType::NSEC);
    match &nsec.data {
        RData::Fields(fields) => {
            match &fields[1] {
                dns::record::FieldValue::Bitmap(bitmap) => {
                    assert!(bitmap.has_type(RecordType::NS.to_u16()));
                    assert!(bitmap.has_type(RecordType::RRSIG.to_u16()));
                    assert!(! bitmap.has_type(RecordType::A.to_u16()));
                }
                other => panic!("not a bitmap: {:?}", other),
            }
        }
        RData::Unknown(_) => panic!("NSEC parsed as unknown"),
    }
}


#[test]
fn unknown_types_round_trip_through_generic_syntax() {
    let record = record_from_line("example.com. 60 IN TYPE4091 \\# 6 0102030405FF").unwrap();

    let bytes = wire_bytes(&record);
    let mut cursor = std::io::Cursor::new(&bytes[..]);
    let read_back = dns::record::Record::read(&mut cursor).unwrap();

    assert_eq!(read_back.to_string(),
               "example.com.\t60\tIN\tTYPE4091\t\\# 6 0102030405FF");
}


#[test]
fn zone_text_survives_a_round_trip() {
    let records = zone_records("
        example.com.     3600 IN SOA ns1.example.com. admin.example.com. ( 77 1800 900 604800 300 )
        example.com.     3600 IN NS ns1.example.com.
        ns1.example.com. 3600 IN A 192.0.2.1
        example.com.     3600 IN MX 10 mail.example.com.
        example.com.     3600 IN TXT \"v=spf1 -all\"
    ").unwrap();
    assert_eq!(records.len(), 5);

    let reprinted = records.iter().map(|r| format!("{}\n", r)).collect::<String>();
    let reparsed = zone_records(&reprinted).unwrap();
    assert_eq!(reparsed, records);
}
