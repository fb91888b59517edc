use std::net::Ipv4Addr;

use dns::{Message, Name, Opcode, QClass, Question, Rcode, WireError};
use dns::record::{Edns, FieldValue, RData, Record, RecordType};

use pretty_assertions::assert_eq;


#[test]
fn parse_nothing() {
    assert!(Message::from_bytes(&[]).is_err());
}


#[test]
fn parse_response_standard() {
    let buf = &[
        0x0d, 0xcd,  // transaction ID
        0x81, 0x80,  // flags (standard query, response, no error)
        0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,  // counts (1, 1, 0, 1)

        // the question:
        0x03, 0x64, 0x6e, 0x73, 0x06, 0x6c, 0x6f, 0x6f, 0x6b, 0x75, 0x70, 0x03,
        0x64, 0x6f, 0x67, 0x00,  // "dns.lookup.dog."
        0x00, 0x01,  // type A
        0x00, 0x01,  // class IN

        // the answer:
        0xc0, 0x0c,  // to find the name, backtrack to position 0x0c (12)
        0x00, 0x01,  // type A
        0x00, 0x01,  // class IN
        0x00, 0x00, 0x03, 0xa5,  // TTL (933 seconds)
        0x00, 0x04,  // record data length 4
        0x8a, 0x44, 0x75, 0x5e,  // record data (138.68.117.94)

        // the additional:
        0x00,        // root name
        0x00, 0x29,  // type OPT
        0x02, 0x00,  // UDP payload size (512)
        0x00,        // extended RCODE bits
        0x00,        // EDNS version
        0x00, 0x00,  // extra flags (DO bit unset)
        0x00, 0x00,  // no payload
    ][..];

    let message = Message::from_bytes(buf).unwrap();

    assert_eq!(message.id, 0x0dcd);
    assert_eq!(message.flags.opcode, Opcode::Query);
    assert!(message.flags.response);
    assert!(message.flags.recursion_desired);
    assert!(message.flags.recursion_available);
    assert_eq!(message.rcode(), Rcode::NoError);

    assert_eq!(message.questions, vec![
        Question::new(Name::parse("dns.lookup.dog.").unwrap(), RecordType::A),
    ]);

    assert_eq!(message.answers, vec![
        Record {
            name: Name::parse("dns.lookup.dog.").unwrap(),
            rtype: RecordType::A,
            qclass: QClass::IN,
            ttl: 933,
            data: RData::Fields(vec![
                FieldValue::Inet4(Ipv4Addr::new(138, 68, 117, 94)),
            ]),
        },
    ]);

    assert!(message.additionals.is_empty());
    assert_eq!(message.edns, Some(Edns {
        udp_size: 512,
        ext_rcode: 0,
        version: 0,
        flags: 0,
        options: vec![],
    }));

    assert_eq!(message.size, buf.len());
    assert!(message.trailing.is_empty());
}


#[test]
fn pointer_loops_fail_instead_of_hanging() {
    // a question whose name is a pointer to itself
    let buf = &[
        0x00, 0x01,
        0x00, 0x00,
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xC0, 0x0C,  // pointer to offset 12, which is this pointer
        0x00, 0x01,
        0x00, 0x01,
    ][..];

    assert_eq!(Message::from_bytes(buf), Err(WireError::OutOfBounds(12)));
}


#[test]
fn transitive_pointer_loops_fail_too() {
    // answer name points at offset 12; the bytes there point forward
    let buf = &[
        0x00, 0x01,
        0x00, 0x00,
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xC0, 0x10,  // question name: pointer to offset 16
        0x00, 0x01,
        0x00, 0x01,  // offset 16 is here: 0x00 0x01 is read as a label
    ][..];

    // offset 16 is ahead of the pointer at offset 12
    assert_eq!(Message::from_bytes(buf), Err(WireError::OutOfBounds(16)));
}


fn tsig_record() -> Record {
    Record {
        name: Name::parse("key.example.com.").unwrap(),
        rtype: RecordType::TSIG,
        qclass: QClass::ANY,
        ttl: 0,
        data: RData::read_str(RecordType::TSIG,
            "hmac-sha256. 1609459200 300 DEADBEEF 7 0 -").unwrap(),
    }
}

fn regular_additional() -> Record {
    Record {
        name: Name::parse("ns1.example.com.").unwrap(),
        rtype: RecordType::A,
        qclass: QClass::IN,
        ttl: 300,
        data: RData::read_str(RecordType::A, "192.0.2.53").unwrap(),
    }
}

#[test]
fn additional_section_splits_into_slots() {
    // arcount 3: a regular record, then OPT, then a trailing TSIG
    let mut message = Message::query(
        0x0707,
        Question::new(Name::parse("example.com.").unwrap(), RecordType::A),
        Some(Edns::default()));
    message.additionals.push(regular_additional());
    message.tsig = Some(tsig_record());

    let bytes = message.to_bytes().unwrap();
    assert_eq!(&bytes[10 .. 12], &[ 0x00, 0x03 ]);  // arcount on the wire

    let read_back = Message::from_bytes(&bytes).unwrap();
    assert_eq!(read_back.additionals, vec![ regular_additional() ]);
    assert_eq!(read_back.edns, Some(Edns::default()));
    assert_eq!(read_back.tsig, Some(tsig_record()));
    assert_eq!(read_back.sig0, None);

    // and arcount recomputed on re-encode is still 3
    let re_encoded = read_back.to_bytes().unwrap();
    assert_eq!(&re_encoded[10 .. 12], &[ 0x00, 0x03 ]);
}


#[test]
fn opt_is_accepted_anywhere_in_additional() {
    // hand-assemble arcount 2 with the OPT record before the regular one
    let mut buf = Vec::new();
    buf.extend_from_slice(&[
        0x07, 0x07,
        0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ]);
    Edns::default().write(&mut buf).unwrap();
    let mut compressor = dns::Compressor::new();
    regular_additional().write(&mut buf, &mut compressor).unwrap();

    let message = Message::from_bytes(&buf).unwrap();
    assert_eq!(message.edns, Some(Edns::default()));
    assert_eq!(message.additionals, vec![ regular_additional() ]);
}


#[test]
fn tsig_not_in_final_position_stays_a_plain_record() {
    // hand-assemble arcount 2 with the TSIG before a regular record
    let mut buf = Vec::new();
    buf.extend_from_slice(&[
        0x07, 0x07,
        0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ]);
    let mut compressor = dns::Compressor::new();
    tsig_record().write(&mut buf, &mut compressor).unwrap();
    let mut compressor = dns::Compressor::new();
    regular_additional().write(&mut buf, &mut compressor).unwrap();

    let message = Message::from_bytes(&buf).unwrap();
    assert_eq!(message.tsig, None);
    assert_eq!(message.additionals.len(), 2);
    assert_eq!(message.additionals[0].rtype, RecordType::TSIG);
}


#[test]
fn sig0_is_lifted_from_final_position() {
    let sig0 = Record {
        name: Name::root(),
        rtype: RecordType::SIG,
        qclass: QClass::ANY,
        ttl: 0,
        data: RData::read_str(RecordType::SIG,
            "TYPE0 13 0 0 20260101000000 20251201000000 12345 signer.example.com. \
             oL9krJun7xfBOIWcGHi7mag+eb1XpaO4t4cnTympXUQ=").unwrap(),
    };

    let mut message = Message::query(
        0x0707,
        Question::new(Name::parse("example.com.").unwrap(), RecordType::A),
        None);
    message.sig0 = Some(sig0.clone());

    let read_back = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
    assert_eq!(read_back.sig0, Some(sig0));
    assert!(read_back.additionals.is_empty());
}
