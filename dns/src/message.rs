//! Whole DNS messages: the twelve-byte header, the four sections, the
//! pseudo-record slots, and the size-bounded serialisation.

use std::io;

use log::*;
use serde_json::{json, Map, Value as JsonValue};

use crate::name::Name;
use crate::record::{Edns, EdnsOption, Record, RecordType, FieldValue, OPT_TYPE,
                    rdata_to_json, rdata_from_json};
use crate::types::{Flags, Question, Rcode, MAX_UDP_SIZE};
use crate::wire::*;


/// A DNS message: a query or a response, depending on its flags.
///
/// The additional section is split three ways on decode: the one
/// permitted OPT record promotes to the `edns` slot, and a TSIG or
/// SIG(0) record in final position moves to its own slot. Everything
/// else stays in `additionals`.
#[derive(PartialEq, Debug, Clone)]
pub struct Message {

    /// The transaction ID, matching responses to their queries.
    pub id: u16,

    /// The flags that accompany every DNS message.
    pub flags: Flags,

    /// The questions section.
    pub questions: Vec<Question>,

    /// The answers section.
    pub answers: Vec<Record>,

    /// The authority section.
    pub authorities: Vec<Record>,

    /// The additional section, minus the pseudo-records below.
    pub additionals: Vec<Record>,

    /// The EDNS(0) data lifted out of the OPT record, if one was present.
    pub edns: Option<Edns>,

    /// A transaction signature, which must be the final additional
    /// record when present.
    pub tsig: Option<Record>,

    /// A SIG(0) signature, which must be the final additional record
    /// when present.
    pub sig0: Option<Record>,

    /// The number of octets the message occupied on decode, or zero for
    /// a message built in memory.
    pub size: usize,

    /// Bytes that followed the structured content. Some servers append
    /// garbage; it is preserved so callers can see it, but it is not an
    /// error.
    pub trailing: Vec<u8>,
}

impl Message {

    /// A query message with one question and optional EDNS data.
    pub fn query(id: u16, question: Question, edns: Option<Edns>) -> Self {
        Self {
            id,
            flags: Flags::query(),
            questions: vec![ question ],
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            edns,
            tsig: None,
            sig0: None,
            size: 0,
            trailing: Vec::new(),
        }
    }

    /// The logical twelve-bit response code, spliced together from the
    /// header nibble and the OPT record’s extended bits.
    pub fn rcode(&self) -> Rcode {
        let high = self.edns.as_ref().map_or(0, |e| e.ext_rcode);
        Rcode::from_parts(self.flags.rcode, high)
    }

    /// Stores the given response code, spilling its high bits into the
    /// EDNS slot. Codes above 15 on a message without EDNS data get a
    /// default OPT record to carry them.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.flags.rcode = rcode.low_bits();

        let high = rcode.high_bits();
        if high != 0 || self.edns.is_some() {
            self.edns.get_or_insert_with(Edns::default).ext_rcode = high;
        }
    }

    /// Reads bytes into a message.
    ///
    /// If the truncation flag is set and the data runs out in the middle
    /// of an answer or authority record, the records read so far are
    /// returned as a partial message, which is how truncated UDP
    /// responses arrive; the caller is expected to retry over TCP.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        info!("Parsing message");
        trace!("Bytes -> {:?}", bytes);
        let mut c = Cursor::new(bytes);

        let id = c.read_u16::<BigEndian>()?;
        trace!("Read txid -> {:#06x}", id);

        let flags = Flags::from_u16(c.read_u16::<BigEndian>()?);
        trace!("Read flags -> {:#?}", flags);

        let qdcount = c.read_u16::<BigEndian>()?;
        let ancount = c.read_u16::<BigEndian>()?;
        let nscount = c.read_u16::<BigEndian>()?;
        let arcount = c.read_u16::<BigEndian>()?;

        // The count fields are user-controlled, so cap the pre-allocation
        // rather than trusting them outright.
        let mut questions = Vec::with_capacity(usize::from(qdcount.min(9)));
        debug!("Reading {}x question", qdcount);
        for _ in 0 .. qdcount {
            questions.push(Question::read(&mut c)?);
        }

        let mut truncated_early = false;

        let mut answers = Vec::with_capacity(usize::from(ancount.min(9)));
        debug!("Reading {}x answer", ancount);
        for _ in 0 .. ancount {
            match Record::read(&mut c) {
                Ok(record) => answers.push(record),
                Err(WireError::IO) if flags.truncated => {
                    debug!("Message truncated mid-answer");
                    truncated_early = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let mut authorities = Vec::with_capacity(usize::from(nscount.min(9)));
        if ! truncated_early {
            debug!("Reading {}x authority", nscount);
            for _ in 0 .. nscount {
                match Record::read(&mut c) {
                    Ok(record) => authorities.push(record),
                    Err(WireError::IO) if flags.truncated => {
                        debug!("Message truncated mid-authority");
                        truncated_early = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut additionals = Vec::with_capacity(usize::from(arcount.min(9)));
        let mut edns = None;
        if ! truncated_early {
            debug!("Reading {}x additional", arcount);
            for _ in 0 .. arcount {
                let (name, _) = Name::read(&mut c)?;
                let type_position = c.position();
                let type_number = c.read_u16::<BigEndian>()?;

                if type_number == OPT_TYPE && edns.is_none() {
                    if ! name.is_root() {
                        warn!("OPT record owned by {} rather than the root", name);
                    }
                    edns = Some(Edns::read(&mut c)?);
                }
                else {
                    c.set_position(type_position);
                    additionals.push(Record::read_after_name(name, &mut c)?);
                }
            }
        }

        // A TSIG or SIG(0) only counts when it is the final record.
        let mut tsig = None;
        let mut sig0 = None;
        if additionals.last().map_or(false, |r| r.rtype == RecordType::TSIG) {
            tsig = additionals.pop();
        }
        else if additionals.last().map_or(false, is_sig0) {
            sig0 = additionals.pop();
        }

        let mut trailing = Vec::new();
        c.read_to_end(&mut trailing)?;
        if ! trailing.is_empty() {
            debug!("Message has {} bytes of trailing garbage", trailing.len());
        }

        Ok(Self {
            id, flags, questions, answers, authorities, additionals,
            edns, tsig, sig0,
            size: bytes.len(),
            trailing,
        })
    }

    /// Serialises the message with no size bound, as sent over TCP.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let (bytes, _) = self.encode(None)?;
        Ok(bytes)
    }

    /// Serialises the message bounded to what UDP allows: 512 octets, or
    /// the larger size the outgoing EDNS data advertises. Returns the
    /// bytes and whether anything had to be dropped.
    pub fn to_bytes_udp(&self) -> io::Result<(Vec<u8>, bool)> {
        let max_size = self.edns.as_ref()
            .map_or(MAX_UDP_SIZE, |e| usize::from(e.udp_size).max(MAX_UDP_SIZE));
        self.encode(Some(max_size))
    }

    /// The two-pass encoder. The size pass serialises everything to
    /// learn each record’s end offset, the plan decides what fits, and
    /// the write pass re-runs serialisation with a fresh compression map
    /// so its pointer choices match the first pass.
    fn encode(&self, max_size: Option<usize>) -> io::Result<(Vec<u8>, bool)> {
        let full_plan = Plan {
            answers: self.answers.len(),
            authorities: self.authorities.len(),
            include_additionals: true,
            truncated: false,
        };

        let plan = match max_size {
            None => full_plan,
            Some(max) => {
                let (bytes, ends) = self.write_plan(&full_plan)?;
                if bytes.len() <= max {
                    full_plan
                }
                else {
                    debug!("Message of {} bytes exceeds {}, truncating", bytes.len(), max);
                    self.shrink_to_fit(max, &ends)
                }
            }
        };

        let (bytes, _) = self.write_plan(&plan)?;
        Ok((bytes, plan.truncated))
    }

    /// Decides what survives truncation: the additional block goes first
    /// and whole, then authority and answer records are dropped from the
    /// tail until the rest fits.
    fn shrink_to_fit(&self, max: usize, ends: &SectionEnds) -> Plan {
        let mut plan = Plan {
            answers: self.answers.len(),
            authorities: self.authorities.len(),
            include_additionals: false,
            truncated: true,
        };

        while plan.authorities > 0 {
            if ends.authorities[plan.authorities - 1] <= max {
                return plan;
            }
            plan.authorities -= 1;
        }

        while plan.answers > 0 {
            if ends.answers[plan.answers - 1] <= max {
                return plan;
            }
            plan.answers -= 1;
        }

        plan
    }

    fn write_plan(&self, plan: &Plan) -> io::Result<(Vec<u8>, SectionEnds)> {
        let mut buf = Vec::with_capacity(self.size.max(64));
        let mut compressor = Compressor::new();
        let mut ends = SectionEnds::default();

        let mut flags = self.flags;
        if plan.truncated {
            flags.truncated = true;
        }

        let arcount = if plan.include_additionals {
            self.additionals.len()
                + usize::from(self.edns.is_some())
                + usize::from(self.tsig.is_some())
                + usize::from(self.sig0.is_some())
        }
        else {
            0
        };

        buf.write_u16::<BigEndian>(self.id)?;
        buf.write_u16::<BigEndian>(flags.to_u16())?;
        buf.write_u16::<BigEndian>(self.questions.len() as u16)?;
        buf.write_u16::<BigEndian>(plan.answers as u16)?;
        buf.write_u16::<BigEndian>(plan.authorities as u16)?;
        buf.write_u16::<BigEndian>(arcount as u16)?;

        for question in &self.questions {
            question.write(&mut buf, &mut compressor)?;
        }

        for record in &self.answers[.. plan.answers] {
            record.write(&mut buf, &mut compressor)?;
            ends.answers.push(buf.len());
        }

        for record in &self.authorities[.. plan.authorities] {
            record.write(&mut buf, &mut compressor)?;
            ends.authorities.push(buf.len());
        }

        if plan.include_additionals {
            for record in &self.additionals {
                record.write(&mut buf, &mut compressor)?;
            }
            if let Some(edns) = &self.edns {
                edns.write(&mut buf)?;
            }
            if let Some(tsig) = &self.tsig {
                tsig.write(&mut buf, &mut compressor)?;
            }
            if let Some(sig0) = &self.sig0 {
                sig0.write(&mut buf, &mut compressor)?;
            }
        }

        Ok((buf, ends))
    }

    /// The JSON form of the whole message.
    pub fn to_json(&self) -> JsonValue {
        let records = |list: &[Record]| {
            list.iter().map(record_to_json).collect::<Vec<_>>()
        };

        let mut object = Map::new();
        object.insert("id".into(), json!(self.id));
        object.insert("opcode".into(), json!(self.flags.opcode.to_string()));
        object.insert("status".into(), json!(self.rcode().to_string()));
        object.insert("flags".into(), json!(self.flags.mnemonics()));
        object.insert("queries".into(), json!(
            self.questions.iter().map(|q| json!({
                "name": q.name.to_string(),
                "type": q.qtype.to_string(),
                "class": q.qclass.to_string(),
            })).collect::<Vec<_>>()
        ));
        object.insert("answers".into(), json!(records(&self.answers)));
        object.insert("authorities".into(), json!(records(&self.authorities)));
        object.insert("additionals".into(), json!(records(&self.additionals)));

        if let Some(edns) = &self.edns {
            object.insert("edns".into(), json!({
                "udp_size": edns.udp_size,
                "ext_rcode": edns.ext_rcode,
                "version": edns.version,
                "flags": edns.flags,
                "options": edns.options.iter().map(option_to_json).collect::<Vec<_>>(),
            }));
        }

        JsonValue::Object(object)
    }

    /// Rebuilds a message from its JSON form.
    pub fn from_json(value: &JsonValue) -> Result<Self, crate::record::JsonError> {
        use crate::record::JsonError;

        let object = value.as_object().ok_or(JsonError::NotAnObject)?;
        let bad = JsonError::BadField;

        let id = object.get("id").and_then(JsonValue::as_u64)
            .filter(|n| *n <= u64::from(u16::MAX))
            .ok_or(bad("id"))? as u16;

        let mut flags = Flags::query();
        flags.opcode = object.get("opcode").and_then(JsonValue::as_str)
            .and_then(crate::types::Opcode::from_name)
            .ok_or(bad("opcode"))?;
        let mnemonics = object.get("flags").and_then(JsonValue::as_array)
            .ok_or(bad("flags"))?;
        let has = |m: &str| mnemonics.iter().any(|v| v.as_str() == Some(m));
        flags.response = has("qr");
        flags.authoritative = has("aa");
        flags.truncated = has("tc");
        flags.recursion_desired = has("rd");
        flags.recursion_available = has("ra");
        flags.authentic_data = has("ad");
        flags.checking_disabled = has("cd");

        let rcode = object.get("status").and_then(JsonValue::as_str)
            .and_then(Rcode::from_name)
            .ok_or(bad("status"))?;

        let questions = object.get("queries").and_then(JsonValue::as_array)
            .ok_or(bad("queries"))?
            .iter().map(question_from_json).collect::<Result<Vec<_>, _>>()?;

        let section = |key: &'static str| -> Result<Vec<Record>, JsonError> {
            object.get(key).and_then(JsonValue::as_array)
                .ok_or(JsonError::BadField(key))?
                .iter().map(record_from_json).collect()
        };

        let mut message = Self {
            id, flags,
            questions,
            answers: section("answers")?,
            authorities: section("authorities")?,
            additionals: section("additionals")?,
            edns: None,
            tsig: None,
            sig0: None,
            size: 0,
            trailing: Vec::new(),
        };

        if let Some(edns_value) = object.get("edns") {
            let edns_object = edns_value.as_object().ok_or(bad("edns"))?;
            let number = |key: &'static str, max: u64| {
                edns_object.get(key).and_then(JsonValue::as_u64)
                    .filter(|n| *n <= max)
                    .ok_or(JsonError::BadField(key))
            };

            // The options member must be an array of option objects;
            // anything else is refused rather than coerced.
            let options = edns_object.get("options").and_then(JsonValue::as_array)
                .ok_or(bad("options"))?
                .iter().map(option_from_json).collect::<Result<Vec<_>, _>>()?;

            message.edns = Some(Edns {
                udp_size: number("udp_size", u64::from(u16::MAX))? as u16,
                ext_rcode: number("ext_rcode", u64::from(u8::MAX))? as u8,
                version: number("version", u64::from(u8::MAX))? as u8,
                flags: number("flags", u64::from(u16::MAX))? as u16,
                options,
            });
        }

        message.set_rcode(rcode);
        Ok(message)
    }
}

/// A SIG record is a SIG(0) when it covers type zero and is owned by
/// the root.
fn is_sig0(record: &Record) -> bool {
    record.rtype == RecordType::SIG
        && record.name.is_root()
        && record.data.fields().first()
               == Some(&FieldValue::Type(RecordType::Other(0)))
}

/// What the size pass decided fits.
#[derive(Debug)]
struct Plan {
    answers: usize,
    authorities: usize,
    include_additionals: bool,
    truncated: bool,
}

/// The cumulative end offset of each record, from the size pass.
#[derive(Debug, Default)]
struct SectionEnds {
    answers: Vec<usize>,
    authorities: Vec<usize>,
}


fn record_to_json(record: &Record) -> JsonValue {
    json!({
        "name": record.name.to_string(),
        "type": record.rtype.to_string(),
        "class": record.qclass.to_string(),
        "ttl": record.ttl,
        "data": rdata_to_json(record.rtype, &record.data),
    })
}

fn record_from_json(value: &JsonValue) -> Result<Record, crate::record::JsonError> {
    use crate::record::JsonError;

    let object = value.as_object().ok_or(JsonError::NotAnObject)?;
    let bad = JsonError::BadField;

    let name = object.get("name").and_then(JsonValue::as_str)
        .and_then(|s| Name::parse(s).ok())
        .ok_or(bad("name"))?;
    let rtype = object.get("type").and_then(JsonValue::as_str)
        .and_then(RecordType::from_name)
        .ok_or(bad("type"))?;
    let qclass = object.get("class").and_then(JsonValue::as_str)
        .and_then(crate::types::QClass::from_name)
        .ok_or(bad("class"))?;
    let ttl = object.get("ttl").and_then(JsonValue::as_u64)
        .filter(|n| *n <= u64::from(u32::MAX))
        .ok_or(bad("ttl"))? as u32;
    let data = rdata_from_json(rtype, object.get("data").ok_or(bad("data"))?)?;

    Ok(Record { name, rtype, qclass, ttl, data })
}

fn question_from_json(value: &JsonValue) -> Result<Question, crate::record::JsonError> {
    use crate::record::JsonError;

    let object = value.as_object().ok_or(JsonError::NotAnObject)?;
    let bad = JsonError::BadField;

    Ok(Question {
        name: object.get("name").and_then(JsonValue::as_str)
            .and_then(|s| Name::parse(s).ok())
            .ok_or(bad("name"))?,
        qtype: object.get("type").and_then(JsonValue::as_str)
            .and_then(RecordType::from_name)
            .ok_or(bad("type"))?,
        qclass: object.get("class").and_then(JsonValue::as_str)
            .and_then(crate::types::QClass::from_name)
            .ok_or(bad("class"))?,
    })
}

fn option_to_json(option: &EdnsOption) -> JsonValue {
    json!({
        "code": option.code(),
        "data": data_encoding::HEXUPPER.encode(&option.payload()),
    })
}

fn option_from_json(value: &JsonValue) -> Result<EdnsOption, crate::record::JsonError> {
    use crate::record::JsonError;

    let object = value.as_object().ok_or(JsonError::NotAnObject)?;

    let code = object.get("code").and_then(JsonValue::as_u64)
        .filter(|n| *n <= u64::from(u16::MAX))
        .ok_or(JsonError::BadField("code"))? as u16;
    let data = object.get("data").and_then(JsonValue::as_str)
        .and_then(|s| data_encoding::HEXLOWER_PERMISSIVE.decode(s.as_bytes()).ok())
        .ok_or(JsonError::BadField("data"))?;

    EdnsOption::from_wire_parts(code, &data)
        .map_err(|_| JsonError::BadField("data"))
}
