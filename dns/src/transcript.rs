//! Presentation of whole messages: the dig-style transcript, and
//! zone-file record lines.

use std::fmt;

use data_encoding::{HEXLOWER_PERMISSIVE, HEXUPPER};
use log::*;

use crate::message::Message;
use crate::name::Name;
use crate::record::{Edns, EdnsOption, Record, RecordType, TextError,
                    rdata_to_string, rdata_from_tokens, tokenize};
use crate::types::{Flags, Opcode, QClass, Question, Rcode};


/// Something that can go wrong parsing a transcript or a zone line.
#[derive(PartialEq, Debug, Clone)]
pub enum TranscriptError {

    /// The `->>HEADER<<-` line was missing or malformed.
    BadHeader,

    /// The flags line was malformed.
    BadFlags,

    /// The EDNS pseudosection was malformed.
    BadEdns,

    /// A record line did not have its leading four fields.
    ShortRecordLine(String),

    /// A record line carried an unknown type or class mnemonic.
    BadMnemonic(String),

    /// A record line’s name or TTL failed to parse.
    BadField(String),

    /// A record’s data failed to parse.
    BadData(TextError),

    /// A parenthesis was left open at the end of the input.
    UnbalancedParentheses,
}

impl From<TextError> for TranscriptError {
    fn from(e: TextError) -> Self {
        Self::BadData(e)
    }
}

impl fmt::Display for TranscriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeader               => write!(f, "missing or malformed header line"),
            Self::BadFlags                => write!(f, "malformed flags line"),
            Self::BadEdns                 => write!(f, "malformed EDNS pseudosection"),
            Self::ShortRecordLine(line)   => write!(f, "record line too short: {:?}", line),
            Self::BadMnemonic(token)      => write!(f, "unknown mnemonic {:?}", token),
            Self::BadField(token)         => write!(f, "unparseable field {:?}", token),
            Self::BadData(e)              => write!(f, "bad record data: {}", e),
            Self::UnbalancedParentheses   => write!(f, "unbalanced parentheses"),
        }
    }
}


impl Message {

    /// Renders the message as a dig-style transcript: header and flags
    /// lines, the optional OPT pseudosection, one section per populated
    /// message section, and informative trailers.
    pub fn to_transcript(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(";; ->>HEADER<<- opcode: {}, status: {}, id: {}\n",
                              self.flags.opcode, self.rcode(), self.id));

        let arcount = self.additionals.len()
            + usize::from(self.edns.is_some())
            + usize::from(self.tsig.is_some())
            + usize::from(self.sig0.is_some());
        out.push_str(&format!(";; flags: {}; QUERY: {}, ANSWER: {}, AUTHORITY: {}, ADDITIONAL: {}\n",
                              self.flags.mnemonics().join(" "),
                              self.questions.len(), self.answers.len(),
                              self.authorities.len(), arcount));

        if let Some(edns) = &self.edns {
            out.push_str("\n;; OPT PSEUDOSECTION:\n");
            let do_flag = if edns.dnssec_ok() { " do" } else { "" };
            out.push_str(&format!("; EDNS: version: {}, flags:{}; udp: {}\n",
                                  edns.version, do_flag, edns.udp_size));
            for option in &edns.options {
                out.push_str(&format!("; OPT={}: {}\n",
                                      option.code(), HEXUPPER.encode(&option.payload())));
            }
        }

        if ! self.questions.is_empty() {
            out.push_str("\n;; QUESTION SECTION:\n");
            for question in &self.questions {
                out.push_str(&format!(";{}\n", question));
            }
        }

        let mut section = |title: &str, records: &[Record]| {
            if ! records.is_empty() {
                out.push_str(&format!("\n;; {} SECTION:\n", title));
                for record in records {
                    out.push_str(&format!("{}\n", record));
                }
            }
        };

        section("ANSWER", &self.answers);
        section("AUTHORITY", &self.authorities);

        let mut additionals = self.additionals.clone();
        additionals.extend(self.tsig.iter().cloned());
        additionals.extend(self.sig0.iter().cloned());
        section("ADDITIONAL", &additionals);

        if self.size > 0 {
            out.push_str(&format!("\n;; MSG SIZE  rcvd: {}\n", self.size));
        }
        if ! self.trailing.is_empty() {
            out.push_str(&format!(";; WARNING: {} bytes of trailing garbage\n",
                                  self.trailing.len()));
        }

        out
    }

    /// Parses a transcript back into a message. The informative trailer
    /// lines are ignored, except the received size, which is restored.
    pub fn from_transcript(input: &str) -> Result<Self, TranscriptError> {
        let mut message = Self::query(0, Question::new(Name::root(), RecordType::A), None);
        message.questions.clear();

        let mut rcode = Rcode::NoError;
        let mut seen_header = false;
        let mut section = Section::Answer;

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix(";; ->>HEADER<<-") {
                let (opcode, status, id) = parse_header_line(rest)?;
                message.flags.opcode = opcode;
                message.id = id;
                rcode = status;
                seen_header = true;
            }
            else if let Some(rest) = line.strip_prefix(";; flags:") {
                message.flags = parse_flags_line(rest, message.flags)?;
            }
            else if let Some(rest) = line.strip_prefix("; EDNS:") {
                let edns = message.edns.get_or_insert_with(Edns::default);
                parse_edns_line(rest, edns)?;
            }
            else if let Some(rest) = line.strip_prefix("; OPT=") {
                let edns = message.edns.get_or_insert_with(Edns::default);
                edns.options.push(parse_option_line(rest)?);
            }
            else if line.ends_with("SECTION:") && line.starts_with(";;") {
                section = match line {
                    ";; QUESTION SECTION:"    => Section::Question,
                    ";; ANSWER SECTION:"      => Section::Answer,
                    ";; AUTHORITY SECTION:"   => Section::Authority,
                    ";; ADDITIONAL SECTION:"  => Section::Additional,
                    _ => return Err(TranscriptError::BadHeader),
                };
            }
            else if let Some(rest) = line.strip_prefix(";; MSG SIZE  rcvd:") {
                message.size = rest.trim().parse().unwrap_or(0);
            }
            else if line.starts_with(";;") {
                trace!("Skipping comment line {:?}", line);
            }
            else if let Some(rest) = line.strip_prefix(';') {
                if section == Section::Question {
                    message.questions.push(parse_question_line(rest)?);
                }
            }
            else {
                let record = record_from_line(line)?;
                match section {
                    Section::Question => return Err(TranscriptError::BadHeader),
                    Section::Answer => message.answers.push(record),
                    Section::Authority => message.authorities.push(record),
                    Section::Additional => push_additional(&mut message, record),
                }
            }
        }

        if ! seen_header {
            return Err(TranscriptError::BadHeader);
        }

        message.set_rcode(rcode);
        Ok(message)
    }
}

#[derive(PartialEq, Debug, Copy, Clone)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

/// A TSIG or SIG(0) parsed from the additional section returns to its
/// pseudo-record slot, mirroring the wire decoder.
fn push_additional(message: &mut Message, record: Record) {
    use crate::record::FieldValue;

    if record.rtype == RecordType::TSIG {
        message.tsig = Some(record);
    }
    else if record.rtype == RecordType::SIG
         && record.name.is_root()
         && record.data.fields().first() == Some(&FieldValue::Type(RecordType::Other(0))) {
        message.sig0 = Some(record);
    }
    else {
        message.additionals.push(record);
    }
}

fn parse_header_line(rest: &str) -> Result<(Opcode, Rcode, u16), TranscriptError> {
    let mut opcode = None;
    let mut status = None;
    let mut id = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("opcode: ") {
            opcode = Opcode::from_name(value);
        }
        else if let Some(value) = part.strip_prefix("status: ") {
            status = Rcode::from_name(value);
        }
        else if let Some(value) = part.strip_prefix("id: ") {
            id = value.parse().ok();
        }
    }

    match (opcode, status, id) {
        (Some(opcode), Some(status), Some(id)) => Ok((opcode, status, id)),
        _ => Err(TranscriptError::BadHeader),
    }
}

fn parse_flags_line(rest: &str, mut flags: Flags) -> Result<Flags, TranscriptError> {
    let mnemonics = rest.split(';').next().ok_or(TranscriptError::BadFlags)?;

    flags.response = false;
    flags.authoritative = false;
    flags.truncated = false;
    flags.recursion_desired = false;
    flags.recursion_available = false;
    flags.authentic_data = false;
    flags.checking_disabled = false;

    for mnemonic in mnemonics.split_whitespace() {
        match mnemonic {
            "qr" => flags.response = true,
            "aa" => flags.authoritative = true,
            "tc" => flags.truncated = true,
            "rd" => flags.recursion_desired = true,
            "ra" => flags.recursion_available = true,
            "ad" => flags.authentic_data = true,
            "cd" => flags.checking_disabled = true,
            _ => return Err(TranscriptError::BadFlags),
        }
    }

    Ok(flags)
}

fn parse_edns_line(rest: &str, edns: &mut Edns) -> Result<(), TranscriptError> {
    for part in rest.split(&[',', ';'][..]) {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("version: ") {
            edns.version = value.parse().map_err(|_| TranscriptError::BadEdns)?;
        }
        else if let Some(value) = part.strip_prefix("flags:") {
            edns.flags = if value.trim() == "do" { 0x8000 } else { 0 };
        }
        else if let Some(value) = part.strip_prefix("udp: ") {
            edns.udp_size = value.parse().map_err(|_| TranscriptError::BadEdns)?;
        }
    }
    Ok(())
}

fn parse_option_line(rest: &str) -> Result<EdnsOption, TranscriptError> {
    let (code_text, hex) = rest.split_once(": ").ok_or(TranscriptError::BadEdns)?;
    let code = code_text.parse().map_err(|_| TranscriptError::BadEdns)?;
    let data = HEXLOWER_PERMISSIVE.decode(hex.trim().as_bytes())
        .map_err(|_| TranscriptError::BadEdns)?;

    EdnsOption::from_wire_parts(code, &data).map_err(|_| TranscriptError::BadEdns)
}

fn parse_question_line(rest: &str) -> Result<Question, TranscriptError> {
    let mut parts = rest.split_whitespace();
    let name_text = parts.next().ok_or_else(|| TranscriptError::ShortRecordLine(rest.into()))?;
    let class_text = parts.next().ok_or_else(|| TranscriptError::ShortRecordLine(rest.into()))?;
    let type_text = parts.next().ok_or_else(|| TranscriptError::ShortRecordLine(rest.into()))?;

    Ok(Question {
        name: Name::parse(name_text).map_err(|_| TranscriptError::BadField(name_text.into()))?,
        qclass: QClass::from_name(class_text)
            .ok_or_else(|| TranscriptError::BadMnemonic(class_text.into()))?,
        qtype: RecordType::from_name(type_text)
            .ok_or_else(|| TranscriptError::BadMnemonic(type_text.into()))?,
    })
}


/// Parses one record from its zone-file line form:
/// `<name> <ttl> <class> <type> <rdata…>`, with the TTL and class
/// accepted in either order.
pub fn record_from_line(line: &str) -> Result<Record, TranscriptError> {
    let tokens = tokenize(line)?;
    if tokens.len() < 4 {
        return Err(TranscriptError::ShortRecordLine(line.into()));
    }

    let name = Name::parse(&tokens[0].text)
        .map_err(|_| TranscriptError::BadField(tokens[0].text.clone()))?;

    let (ttl_token, class_token) = if tokens[1].text.bytes().all(|b| b.is_ascii_digit()) {
        (&tokens[1], &tokens[2])
    }
    else {
        (&tokens[2], &tokens[1])
    };

    let ttl = ttl_token.text.parse()
        .map_err(|_| TranscriptError::BadField(ttl_token.text.clone()))?;
    let qclass = QClass::from_name(&class_token.text)
        .ok_or_else(|| TranscriptError::BadMnemonic(class_token.text.clone()))?;
    let rtype = RecordType::from_name(&tokens[3].text)
        .ok_or_else(|| TranscriptError::BadMnemonic(tokens[3].text.clone()))?;

    let data = rdata_from_tokens(rtype, &tokens[4 ..])?;

    Ok(Record { name, rtype, qclass, ttl, data })
}

/// Parses a zone file’s worth of record lines. Lines are logical: an
/// open parenthesis outside quotes continues the record onto following
/// lines, which is how SOA records are usually laid out.
pub fn zone_records(input: &str) -> Result<Vec<Record>, TranscriptError> {
    let mut records = Vec::new();
    let mut pending = String::new();
    let mut depth = 0_i32;

    for line in input.lines() {
        let mut in_quotes = false;
        let mut escaped = false;
        let mut content_len = line.len();

        for (i, c) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => in_quotes = ! in_quotes,
                '(' if ! in_quotes => depth += 1,
                ')' if ! in_quotes => depth -= 1,
                ';' if ! in_quotes => {
                    content_len = i;
                    break;
                }
                _ => {}
            }
        }

        pending.push_str(&line[.. content_len]);
        pending.push(' ');

        if depth > 0 {
            continue;
        }

        let logical = pending.trim();
        if ! logical.is_empty() {
            records.push(record_from_line(logical)?);
        }
        pending.clear();
    }

    if depth != 0 || ! pending.trim().is_empty() {
        return Err(TranscriptError::UnbalancedParentheses);
    }

    Ok(records)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::record::{Edns, RData};
    use pretty_assertions::assert_eq;

    #[test]
    fn record_line_round_trip() {
        let line = "example.com.\t3600\tIN\tMX\t10 mail.example.com.";
        let record = record_from_line(line).unwrap();

        assert_eq!(record.name, Name::parse("example.com.").unwrap());
        assert_eq!(record.ttl, 3600);
        assert_eq!(record.to_string(), line);
    }

    #[test]
    fn record_line_with_swapped_class_and_ttl() {
        let record = record_from_line("example.com. IN 3600 A 127.0.0.1").unwrap();
        assert_eq!(record.ttl, 3600);
        assert_eq!(record.qclass, QClass::IN);
    }

    #[test]
    fn unknown_type_line() {
        let record = record_from_line("example.com. 60 IN TYPE4091 \\# 2 ABCD").unwrap();
        assert_eq!(record.rtype, RecordType::Other(4091));
        assert_eq!(record.data, RData::Unknown(vec![ 0xAB, 0xCD ]));
    }

    #[test]
    fn zone_with_parentheses_and_comments() {
        let zone = "\
example.com. 86400 IN SOA ns.example.com. admin.example.com. (\n\
    2024010101 ; serial\n\
    7200       ; refresh\n\
    3600       ; retry\n\
    1209600    ; expire\n\
    300 )      ; minimum\n\
example.com. 3600 IN NS ns.example.com.\n";

        let records = zone_records(zone).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rtype, RecordType::SOA);
        assert_eq!(records[0].soa_minimum(), Some(300));
        assert_eq!(records[1].rtype, RecordType::NS);
    }

    #[test]
    fn unbalanced_zone_fails() {
        assert_eq!(zone_records("example.com. 60 IN SOA a. b. ( 1 2 3 4"),
                   Err(TranscriptError::UnbalancedParentheses));
    }

    #[test]
    fn transcript_round_trip() {
        let mut message = Message::query(
            1234,
            Question::new(Name::parse("com.").unwrap(), RecordType::NS),
            Some(Edns::default()));
        message.flags.response = true;
        message.flags.recursion_available = true;
        for server in &[ "a", "b", "c" ] {
            message.answers.push(record_from_line(&format!(
                "com. 172800 IN NS {}.gtld-servers.net.", server)).unwrap());
        }

        let transcript = message.to_transcript();
        let rebuilt = Message::from_transcript(&transcript).unwrap();

        assert_eq!(rebuilt, message);
    }

    #[test]
    fn transcript_header_is_required() {
        assert_eq!(Message::from_transcript("com. 60 IN A 1.2.3.4\n"),
                   Err(TranscriptError::BadHeader));
    }

    #[test]
    fn transcript_restores_extended_rcode() {
        let mut message = Message::query(
            9, Question::new(Name::parse("example.com.").unwrap(), RecordType::A),
            Some(Edns::default()));
        message.flags.response = true;
        message.set_rcode(Rcode::BadVers);

        let transcript = message.to_transcript();
        assert!(transcript.contains("status: BADVERS"));

        let rebuilt = Message::from_transcript(&transcript).unwrap();
        assert_eq!(rebuilt.rcode(), Rcode::BadVers);
    }

    #[test]
    fn transcript_ignores_informative_lines() {
        let transcript = "\
;; ->>HEADER<<- opcode: QUERY, status: NOERROR, id: 77\n\
;; flags: qr rd ra; QUERY: 1, ANSWER: 1, AUTHORITY: 0, ADDITIONAL: 0\n\
\n\
;; QUESTION SECTION:\n\
;example.com.\tIN\tA\n\
\n\
;; ANSWER SECTION:\n\
example.com.\t60\tIN\tA\t93.184.216.34\n\
\n\
;; Query time: 4 msec\n\
;; SERVER: 198.41.0.4#53(198.41.0.4)\n\
;; MSG SIZE  rcvd: 56\n";

        let message = Message::from_transcript(transcript).unwrap();
        assert_eq!(message.id, 77);
        assert_eq!(message.answers.len(), 1);
        assert_eq!(message.size, 56);
    }
}
