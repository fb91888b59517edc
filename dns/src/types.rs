//! The header-level protocol types: flags, opcodes, response codes,
//! classes, and questions.

use std::fmt;
use std::io;

use crate::name::Name;
use crate::record::RecordType;
use crate::wire::*;


/// The port DNS servers listen on.
pub const DNS_PORT: u16 = 53;

/// The most bytes a plain UDP response may occupy.
pub const MAX_UDP_SIZE: usize = 512;

/// The UDP size advertised by default when EDNS is in play.
pub const MAX_EDNS_SIZE: usize = 4096;


/// The flags that accompany every DNS message.
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Flags {

    /// Whether this message is a response.
    pub response: bool,

    /// The operation being performed.
    pub opcode: Opcode,

    /// In a response, whether the server holds authoritative data for the
    /// queried zone.
    pub authoritative: bool,

    /// In a response, whether the message had to be truncated to fit the
    /// transport.
    pub truncated: bool,

    /// In a query, whether the server should recurse on our behalf.
    pub recursion_desired: bool,

    /// In a response, whether the server offers recursion.
    pub recursion_available: bool,

    /// The reserved Z bit, which should be zero but is carried through.
    pub z: bool,

    /// In a response, whether the server validated the data.
    pub authentic_data: bool,

    /// In a query, whether the server should skip its validation.
    pub checking_disabled: bool,

    /// The low four bits of the response code. The high eight bits, when
    /// present, travel in the OPT record and are spliced back in at the
    /// message level.
    pub rcode: u8,
}

impl Flags {

    /// The set of flags that represents a recursion-desired query.
    pub fn query() -> Self {
        Self::from_u16(0b_0000_0001_0000_0000)
    }

    /// The set of flags that represents a successful response.
    pub fn standard_response() -> Self {
        Self::from_u16(0b_1000_0001_1000_0000)
    }

    /// Converts the flags into a two-byte number.
    pub fn to_u16(self) -> u16 {                 // 0123 4567 89AB CDEF
        let mut                          bits  = 0b_0000_0000_0000_0000;
        if self.response               { bits |= 0b_1000_0000_0000_0000; }
        bits |= u16::from(self.opcode.to_u4()) << 11;
        if self.authoritative          { bits |= 0b_0000_0100_0000_0000; }
        if self.truncated              { bits |= 0b_0000_0010_0000_0000; }
        if self.recursion_desired      { bits |= 0b_0000_0001_0000_0000; }
        if self.recursion_available    { bits |= 0b_0000_0000_1000_0000; }
        if self.z                      { bits |= 0b_0000_0000_0100_0000; }
        if self.authentic_data         { bits |= 0b_0000_0000_0010_0000; }
        if self.checking_disabled      { bits |= 0b_0000_0000_0001_0000; }
        bits |= u16::from(self.rcode & 0b_1111);

        bits
    }

    /// Extracts the flags from the given two-byte number.
    pub fn from_u16(bits: u16) -> Self {
        let has_bit = |bit| { bits & bit == bit };

        Self {
            response:               has_bit(0b_1000_0000_0000_0000),
            opcode:                 Opcode::from_u4(((bits >> 11) & 0b_1111) as u8),
            authoritative:          has_bit(0b_0000_0100_0000_0000),
            truncated:              has_bit(0b_0000_0010_0000_0000),
            recursion_desired:      has_bit(0b_0000_0001_0000_0000),
            recursion_available:    has_bit(0b_0000_0000_1000_0000),
            z:                      has_bit(0b_0000_0000_0100_0000),
            authentic_data:         has_bit(0b_0000_0000_0010_0000),
            checking_disabled:      has_bit(0b_0000_0000_0001_0000),
            rcode:                  (bits & 0b_1111) as u8,
        }
    }

    /// The flag mnemonics that are set, in the order dig prints them.
    pub fn mnemonics(self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.response             { set.push("qr"); }
        if self.authoritative        { set.push("aa"); }
        if self.truncated            { set.push("tc"); }
        if self.recursion_desired    { set.push("rd"); }
        if self.recursion_available  { set.push("ra"); }
        if self.authentic_data       { set.push("ad"); }
        if self.checking_disabled    { set.push("cd"); }
        set
    }
}


/// A number representing the operation a message performs.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Opcode {

    /// A standard query.
    Query,

    /// An inverse query, long obsolete but still assigned.
    IQuery,

    /// A server status request.
    Status,

    /// A zone change notification.
    Notify,

    /// A dynamic update.
    Update,

    /// An opcode number that does not map to any known operation.
    Other(u8),
}

impl Opcode {
    pub(crate) fn to_u4(self) -> u8 {
        match self {
            Self::Query     => 0,
            Self::IQuery    => 1,
            Self::Status    => 2,
            Self::Notify    => 4,
            Self::Update    => 5,
            Self::Other(n)  => n & 0b_1111,
        }
    }

    pub(crate) fn from_u4(bits: u8) -> Self {
        match bits {
            0 => Self::Query,
            1 => Self::IQuery,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            n => Self::Other(n),
        }
    }

    /// Parses an opcode mnemonic as dig prints it.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "QUERY"  => Some(Self::Query),
            "IQUERY" => Some(Self::IQuery),
            "STATUS" => Some(Self::Status),
            "NOTIFY" => Some(Self::Notify),
            "UPDATE" => Some(Self::Update),
            _ => {
                let n: u8 = name.strip_prefix("OPCODE")?.parse().ok()?;
                Some(Self::from_u4(n))
            }
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query     => write!(f, "QUERY"),
            Self::IQuery    => write!(f, "IQUERY"),
            Self::Status    => write!(f, "STATUS"),
            Self::Notify    => write!(f, "NOTIFY"),
            Self::Update    => write!(f, "UPDATE"),
            Self::Other(n)  => write!(f, "OPCODE{}", n),
        }
    }
}


/// The logical twelve-bit response code: the low four bits come from the
/// header flags, and the high eight from the OPT record TTL when EDNS is
/// in play.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Rcode {

    /// No error.
    NoError,

    /// The server was unable to interpret the query.
    FormErr,

    /// There was a problem with the server.
    ServFail,

    /// The queried name does not exist.
    NxDomain,

    /// The server does not support the requested operation.
    NotImp,

    /// The server understood the query but refused to answer it.
    Refused,

    /// A name exists when it should not.
    YxDomain,

    /// An RRset exists when it should not.
    YxRrset,

    /// An RRset that should exist does not.
    NxRrset,

    /// The server is not authoritative for the zone.
    NotAuth,

    /// A name is not contained in the zone.
    NotZone,

    /// The server did not accept the EDNS version.
    BadVers,

    /// A key is not recognised.
    BadKey,

    /// A signature is outside its validity window.
    BadTime,

    /// A TKEY mode is invalid.
    BadMode,

    /// A key name is duplicated.
    BadName,

    /// An algorithm is unsupported.
    BadAlg,

    /// A message was badly truncated.
    BadTrunc,

    /// A server cookie was bad or missing.
    BadCookie,

    /// A code that does not map to any known response condition.
    Other(u16),
}

impl Rcode {

    /// Builds the logical code out of the header nibble and the extended
    /// bits from the OPT record.
    pub fn from_parts(low: u8, high: u8) -> Self {
        Self::from_u16(u16::from(high) << 4 | u16::from(low & 0b_1111))
    }

    /// The header nibble: the low four bits.
    pub fn low_bits(self) -> u8 {
        (self.to_u16() & 0b_1111) as u8
    }

    /// The extended bits that travel in the OPT record.
    pub fn high_bits(self) -> u8 {
        (self.to_u16() >> 4) as u8
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            0  => Self::NoError,
            1  => Self::FormErr,
            2  => Self::ServFail,
            3  => Self::NxDomain,
            4  => Self::NotImp,
            5  => Self::Refused,
            6  => Self::YxDomain,
            7  => Self::YxRrset,
            8  => Self::NxRrset,
            9  => Self::NotAuth,
            10 => Self::NotZone,
            16 => Self::BadVers,
            17 => Self::BadKey,
            18 => Self::BadTime,
            19 => Self::BadMode,
            20 => Self::BadName,
            21 => Self::BadAlg,
            22 => Self::BadTrunc,
            23 => Self::BadCookie,
            n  => Self::Other(n),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::NoError    => 0,
            Self::FormErr    => 1,
            Self::ServFail   => 2,
            Self::NxDomain   => 3,
            Self::NotImp     => 4,
            Self::Refused    => 5,
            Self::YxDomain   => 6,
            Self::YxRrset    => 7,
            Self::NxRrset    => 8,
            Self::NotAuth    => 9,
            Self::NotZone    => 10,
            Self::BadVers    => 16,
            Self::BadKey     => 17,
            Self::BadTime    => 18,
            Self::BadMode    => 19,
            Self::BadName    => 20,
            Self::BadAlg     => 21,
            Self::BadTrunc   => 22,
            Self::BadCookie  => 23,
            Self::Other(n)   => n,
        }
    }

    /// Parses a status mnemonic as dig prints it.
    pub fn from_name(name: &str) -> Option<Self> {
        let rcode = match name {
            "NOERROR"   => Self::NoError,
            "FORMERR"   => Self::FormErr,
            "SERVFAIL"  => Self::ServFail,
            "NXDOMAIN"  => Self::NxDomain,
            "NOTIMP"    => Self::NotImp,
            "REFUSED"   => Self::Refused,
            "YXDOMAIN"  => Self::YxDomain,
            "YXRRSET"   => Self::YxRrset,
            "NXRRSET"   => Self::NxRrset,
            "NOTAUTH"   => Self::NotAuth,
            "NOTZONE"   => Self::NotZone,
            // BADSIG shares the number; BADVERS wins on output
            "BADVERS" | "BADSIG" => Self::BadVers,
            "BADKEY"    => Self::BadKey,
            "BADTIME"   => Self::BadTime,
            "BADMODE"   => Self::BadMode,
            "BADNAME"   => Self::BadName,
            "BADALG"    => Self::BadAlg,
            "BADTRUNC"  => Self::BadTrunc,
            "BADCOOKIE" => Self::BadCookie,
            _ => {
                let n = name.strip_prefix("RCODE")?.parse().ok()?;
                Self::Other(n)
            }
        };
        Some(rcode)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError    => write!(f, "NOERROR"),
            Self::FormErr    => write!(f, "FORMERR"),
            Self::ServFail   => write!(f, "SERVFAIL"),
            Self::NxDomain   => write!(f, "NXDOMAIN"),
            Self::NotImp     => write!(f, "NOTIMP"),
            Self::Refused    => write!(f, "REFUSED"),
            Self::YxDomain   => write!(f, "YXDOMAIN"),
            Self::YxRrset    => write!(f, "YXRRSET"),
            Self::NxRrset    => write!(f, "NXRRSET"),
            Self::NotAuth    => write!(f, "NOTAUTH"),
            Self::NotZone    => write!(f, "NOTZONE"),
            Self::BadVers    => write!(f, "BADVERS"),
            Self::BadKey     => write!(f, "BADKEY"),
            Self::BadTime    => write!(f, "BADTIME"),
            Self::BadMode    => write!(f, "BADMODE"),
            Self::BadName    => write!(f, "BADNAME"),
            Self::BadAlg     => write!(f, "BADALG"),
            Self::BadTrunc   => write!(f, "BADTRUNC"),
            Self::BadCookie  => write!(f, "BADCOOKIE"),
            Self::Other(n)   => write!(f, "RCODE{}", n),
        }
    }
}


/// A DNS record class. Of these, the only one in regular use anymore is
/// the Internet class.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub enum QClass {

    /// The **Internet** class.
    IN,

    /// The **Chaosnet** class.
    CH,

    /// The **Hesiod** class.
    HS,

    /// The query-only class matching any class.
    ANY,

    /// A class number that does not map to any known class.
    Other(u16),
}

impl QClass {
    pub fn from_u16(uu: u16) -> Self {
        match uu {
            0x0001 => Self::IN,
            0x0003 => Self::CH,
            0x0004 => Self::HS,
            0x00FF => Self::ANY,
                 _ => Self::Other(uu),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::IN        => 0x0001,
            Self::CH        => 0x0003,
            Self::HS        => 0x0004,
            Self::ANY       => 0x00FF,
            Self::Other(uu) => uu,
        }
    }

    /// Parses a class mnemonic, with `CLASSn` as the generic fallback.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "IN"  => Some(Self::IN),
            "CH"  => Some(Self::CH),
            "HS"  => Some(Self::HS),
            "ANY" => Some(Self::ANY),
            _     => {
                let n = name.strip_prefix("CLASS")?.parse().ok()?;
                Some(Self::from_u16(n))
            }
        }
    }
}

impl fmt::Display for QClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IN        => write!(f, "IN"),
            Self::CH        => write!(f, "CH"),
            Self::HS        => write!(f, "HS"),
            Self::ANY       => write!(f, "ANY"),
            Self::Other(n)  => write!(f, "CLASS{}", n),
        }
    }
}


/// A question: the name being asked about, and the type and class being
/// asked for.
#[derive(PartialEq, Debug, Clone)]
pub struct Question {

    /// The domain name being queried.
    pub name: Name,

    /// The type number.
    pub qtype: RecordType,

    /// The class number.
    pub qclass: QClass,
}

impl Question {

    /// A question for the given name and type, in the Internet class.
    pub fn new(name: Name, qtype: RecordType) -> Self {
        Self { name, qtype, qclass: QClass::IN }
    }

    /// Reads a question off the cursor.
    pub fn read(c: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let (name, _) = Name::read(c)?;
        let qtype = RecordType::from(c.read_u16::<BigEndian>()?);
        let qclass = QClass::from_u16(c.read_u16::<BigEndian>()?);

        Ok(Self { name, qtype, qclass })
    }

    /// Writes the question, compressing its name against the map.
    pub fn write(&self, buf: &mut Vec<u8>, compressor: &mut Compressor) -> io::Result<()> {
        self.name.write(buf, Some(compressor))?;
        buf.write_u16::<BigEndian>(self.qtype.to_u16())?;
        buf.write_u16::<BigEndian>(self.qclass.to_u16())?;
        Ok(())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.qclass, self.qtype)
    }
}
