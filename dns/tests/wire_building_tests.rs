use dns::{Message, Name, Question, QClass, MAX_UDP_SIZE};
use dns::record::{Edns, RData, Record, RecordType};

use pretty_assertions::assert_eq;


#[test]
fn build_query() {
    let mut message = Message::query(
        0xceac,
        Question::new(Name::parse("rfcs.io.").unwrap(), RecordType::from(0x1234)),
        Some(Edns::default()));
    message.questions[0].qclass = QClass::Other(0x42);

    let result = vec![
        0xce, 0xac,  // transaction ID
        0x01, 0x00,  // flags (standard query)
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,  // counts (1, 0, 0, 1)

        // the question:
        0x04, 0x72, 0x66, 0x63, 0x73, 0x02, 0x69, 0x6f, 0x00,  // qname
        0x12, 0x34,  // type
        0x00, 0x42,  // class

        // the OPT record:
        0x00,        // name
        0x00, 0x29,  // type OPT
        0x10, 0x00,  // UDP payload size (4096)
        0x00,        // extended RCODE bits
        0x00,        // EDNS(0) version
        0x00, 0x00,  // more flags
        0x00, 0x00,  // no payload
    ];

    assert_eq!(message.to_bytes().unwrap(), result);
}


#[test]
fn build_header_fields() {
    // authoritative answer, id 0x1234, one A question
    let mut message = Message::query(
        0x1234,
        Question::new(Name::parse("example.com.").unwrap(), RecordType::A),
        None);
    message.flags.response = true;
    message.flags.authoritative = true;
    message.flags.truncated = false;

    let read_back = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();

    assert_eq!(read_back.id, 0x1234);
    assert!(read_back.flags.authoritative);
    assert!(! read_back.flags.truncated);
    assert_eq!(read_back.questions, vec![
        Question::new(Name::parse("example.com.").unwrap(), RecordType::A),
    ]);
}


#[test]
fn repeated_suffixes_become_pointers() {
    let mut message = Message::query(
        7,
        Question::new(Name::parse("example.com.").unwrap(), RecordType::NS),
        None);
    message.flags.response = true;
    message.answers.push(Record {
        name: Name::parse("example.com.").unwrap(),
        rtype: RecordType::NS,
        qclass: QClass::IN,
        ttl: 300,
        data: RData::read_str(RecordType::NS, "ns1.example.com.").unwrap(),
    });

    let bytes = message.to_bytes().unwrap();

    // the answer’s owner name is the question name again, so it is a
    // pointer to offset 12, directly after the header
    let answer_start = 12 + 13 + 4;
    assert_eq!(&bytes[answer_start .. answer_start + 2], &[ 0xC0, 0x0C ]);

    // and inside the record data, "example.com." in ns1’s name is a
    // pointer to the same offset
    let rdata_start = answer_start + 2 + 10;
    assert_eq!(&bytes[rdata_start .. rdata_start + 6],
               &[ 0x03, b'n', b's', b'1', 0xC0, 0x0C ]);

    // everything still reads back
    let read_back = Message::from_bytes(&bytes).unwrap();
    assert_eq!(read_back.answers, message.answers);
}


/// A response sized to land exactly on the UDP boundary: 12 header
/// octets, 17 of question, and one 483-octet TXT answer.
fn message_of_exactly_512() -> Message {
    let mut message = Message::query(
        7,
        Question::new(Name::parse("example.com.").unwrap(), RecordType::TXT),
        None);
    message.flags.response = true;

    let strings = RData::Fields(vec![
        dns::record::FieldValue::Strings(vec![
            vec![ b'x'; 255 ],
            vec![ b'y'; 214 ],
        ]),
    ]);
    message.answers.push(Record {
        name: Name::parse("example.com.").unwrap(),
        rtype: RecordType::TXT,
        qclass: QClass::IN,
        ttl: 60,
        data: strings,
    });

    message
}

#[test]
fn exactly_512_octets_is_not_truncated() {
    let message = message_of_exactly_512();

    let (bytes, truncated) = message.to_bytes_udp().unwrap();
    assert_eq!(bytes.len(), MAX_UDP_SIZE);
    assert!(! truncated);
    assert!(! Message::from_bytes(&bytes).unwrap().flags.truncated);
}

#[test]
fn one_octet_over_is_truncated() {
    let mut message = message_of_exactly_512();
    match &mut message.answers[0].data {
        RData::Fields(fields) => {
            match &mut fields[0] {
                dns::record::FieldValue::Strings(strings) => strings[1].push(b'y'),
                _ => unreachable!(),
            }
        }
        _ => unreachable!(),
    }

    let (bytes, truncated) = message.to_bytes_udp().unwrap();
    assert!(truncated);
    assert!(bytes.len() <= MAX_UDP_SIZE);

    let read_back = Message::from_bytes(&bytes).unwrap();
    assert!(read_back.flags.truncated);
    assert!(read_back.answers.is_empty());
}


#[test]
fn labels_at_the_limits_round_trip() {
    // a 63-octet label, the longest allowed
    let long_label = "a".repeat(63);
    let name = Name::parse(&long_label).unwrap();

    let mut message = Message::query(7, Question::new(name.clone(), RecordType::A), None);
    message.answers.push(Record {
        name,
        rtype: RecordType::A,
        qclass: QClass::IN,
        ttl: 60,
        data: RData::read_str(RecordType::A, "127.0.0.1").unwrap(),
    });

    let read_back = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
    assert_eq!(read_back.answers[0].name.label_count(), 1);

    // a name at the full 255 octets
    let full = [ "a".repeat(63), "b".repeat(63), "c".repeat(63), "d".repeat(61) ].join(".");
    let name = Name::parse(&full).unwrap();
    assert_eq!(name.wire_len(), 255);

    let message = Message::query(8, Question::new(name.clone(), RecordType::A), None);
    let read_back = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
    assert_eq!(read_back.questions[0].name, name);
}
