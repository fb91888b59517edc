//! Resource records: the type registry, the record frame, and the
//! schema-driven record data.

use std::fmt;
use std::io;

use log::*;

use crate::name::Name;
use crate::types::QClass;
use crate::wire::*;

mod schema;
pub use self::schema::{Field, FieldKind, schema_of};

mod value;
pub use self::value::{FieldValue, Gateway, AplItem, RData};

mod text;
pub use self::text::{TextError, rdata_to_string, rdata_from_str};
pub(crate) use self::text::{Token, tokenize, rdata_from_tokens};

mod json;
pub use self::json::{rdata_to_json, rdata_from_json, JsonError};

mod opt;
pub use self::opt::{Edns, EdnsOption, OPT_TYPE};


macro_rules! record_types {
    ( $( $name:ident ($text:literal) = $number:literal, )* ) => {

        /// One of the record types this library has a schema for, or
        /// `Other` for a type number it can only carry opaquely.
        #[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
        #[allow(non_camel_case_types)]
        pub enum RecordType {
            $( #[allow(missing_docs)] $name, )*

            /// A record type that does not map to any known mnemonic.
            Other(u16),
        }

        impl RecordType {

            /// The number signifying this record type.
            /// See <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4>
            pub fn to_u16(self) -> u16 {
                match self {
                    $( Self::$name => $number, )*
                    Self::Other(n) => n,
                }
            }

            /// Looks up a record type from its presentation mnemonic,
            /// accepting the generic `TYPEn` form for any number.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $text => Some(Self::$name), )*
                    _ => {
                        let n: u16 = name.strip_prefix("TYPE")?.parse().ok()?;
                        Some(Self::from(n))
                    }
                }
            }
        }

        impl From<u16> for RecordType {
            fn from(number: u16) -> Self {
                match number {
                    $( $number => Self::$name, )*
                    n => Self::Other(n),
                }
            }
        }

        impl fmt::Display for RecordType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( Self::$name => write!(f, $text), )*
                    Self::Other(n) => write!(f, "TYPE{}", n),
                }
            }
        }
    }
}

record_types! {
    A          ("A")          = 1,
    NS         ("NS")         = 2,
    MD         ("MD")         = 3,
    MF         ("MF")         = 4,
    CNAME      ("CNAME")      = 5,
    SOA        ("SOA")        = 6,
    MB         ("MB")         = 7,
    MG         ("MG")         = 8,
    MR         ("MR")         = 9,
    NULL       ("NULL")       = 10,
    WKS        ("WKS")        = 11,
    PTR        ("PTR")        = 12,
    HINFO      ("HINFO")      = 13,
    MINFO      ("MINFO")      = 14,
    MX         ("MX")         = 15,
    TXT        ("TXT")        = 16,
    RP         ("RP")         = 17,
    AFSDB      ("AFSDB")      = 18,
    X25        ("X25")        = 19,
    ISDN       ("ISDN")       = 20,
    RT         ("RT")         = 21,
    NSAP       ("NSAP")       = 22,
    NSAPPTR    ("NSAP-PTR")   = 23,
    SIG        ("SIG")        = 24,
    KEY        ("KEY")        = 25,
    PX         ("PX")         = 26,
    GPOS       ("GPOS")       = 27,
    AAAA       ("AAAA")       = 28,
    LOC        ("LOC")        = 29,
    NXT        ("NXT")        = 30,
    EID        ("EID")        = 31,
    NIMLOC     ("NIMLOC")     = 32,
    SRV        ("SRV")        = 33,
    ATMA       ("ATMA")       = 34,
    NAPTR      ("NAPTR")      = 35,
    KX         ("KX")         = 36,
    CERT       ("CERT")       = 37,
    A6         ("A6")         = 38,
    DNAME      ("DNAME")      = 39,
    OPT        ("OPT")        = 41,
    APL        ("APL")        = 42,
    DS         ("DS")         = 43,
    SSHFP      ("SSHFP")      = 44,
    IPSECKEY   ("IPSECKEY")   = 45,
    RRSIG      ("RRSIG")      = 46,
    NSEC       ("NSEC")       = 47,
    DNSKEY     ("DNSKEY")     = 48,
    DHCID      ("DHCID")      = 49,
    NSEC3      ("NSEC3")      = 50,
    NSEC3PARAM ("NSEC3PARAM") = 51,
    TLSA       ("TLSA")       = 52,
    SMIMEA     ("SMIMEA")     = 53,
    HIP        ("HIP")        = 55,
    NINFO      ("NINFO")      = 56,
    RKEY       ("RKEY")       = 57,
    TALINK     ("TALINK")     = 58,
    CDS        ("CDS")        = 59,
    CDNSKEY    ("CDNSKEY")    = 60,
    OPENPGPKEY ("OPENPGPKEY") = 61,
    CSYNC      ("CSYNC")      = 62,
    SPF        ("SPF")        = 99,
    UINFO      ("UINFO")      = 100,
    UID        ("UID")        = 101,
    GID        ("GID")        = 102,
    UNSPEC     ("UNSPEC")     = 103,
    NID        ("NID")        = 104,
    L32        ("L32")        = 105,
    L64        ("L64")        = 106,
    LP         ("LP")         = 107,
    EUI48      ("EUI48")      = 108,
    EUI64      ("EUI64")      = 109,
    TKEY       ("TKEY")       = 249,
    TSIG       ("TSIG")       = 250,
    ANY        ("ANY")        = 255,
    URI        ("URI")        = 256,
    CAA        ("CAA")        = 257,
    AVC        ("AVC")        = 258,
    DOA        ("DOA")        = 259,
    TA         ("TA")         = 32768,
    DLV        ("DLV")        = 32769,
}

impl RecordType {

    /// Whether names inside this type’s record data may be written with
    /// compression pointers. Only the original RFC 1035 types compress;
    /// everything later is written as plain labels so naive clients can
    /// re-parse it.
    pub fn compresses_names(self) -> bool {
        matches!(self,
            Self::NS | Self::MD | Self::MF | Self::CNAME | Self::SOA
            | Self::MB | Self::MG | Self::MR | Self::PTR | Self::MINFO
            | Self::MX | Self::RP | Self::AFSDB | Self::RT | Self::PX)
    }
}


/// A resource record: an owner name, a type, a class, a time-to-live,
/// and the type-specific record data.
#[derive(PartialEq, Debug, Clone)]
pub struct Record {

    /// The domain name this record describes.
    pub name: Name,

    /// The record type, which selects the shape of the data.
    pub rtype: RecordType,

    /// The record’s class.
    pub qclass: QClass,

    /// The time-to-live duration, in seconds.
    pub ttl: u32,

    /// The record data.
    pub data: RData,
}

impl Record {

    /// Reads a record off the cursor: the frame fields, then the
    /// length-bounded record data.
    ///
    /// The data is read through the same cursor so compression pointers
    /// can reach back into the message, but it is bounded by the stated
    /// length, and the cursor is resynchronised to the stated end
    /// afterwards so a record with bad internal lengths cannot knock the
    /// rest of the message out of alignment.
    pub fn read(c: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let (name, _) = Name::read(c)?;
        Self::read_after_name(name, c)
    }

    /// Reads the rest of a record when the owner name has already been
    /// taken off the cursor.
    pub fn read_after_name(name: Name, c: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let rtype = RecordType::from(c.read_u16::<BigEndian>()?);
        trace!("Read rtype -> {}", rtype);

        let qclass = QClass::from_u16(c.read_u16::<BigEndian>()?);
        let ttl = c.read_u32::<BigEndian>()?;
        let stated_length = c.read_u16::<BigEndian>()?;
        trace!("Read ttl -> {}, record length -> {}", ttl, stated_length);

        let start = c.position();
        let end = start + u64::from(stated_length);
        if end > c.get_ref().len() as u64 {
            return Err(WireError::IO);
        }

        let result = RData::read(rtype, c, end);

        // Resynchronise before deciding anything else.
        let consumed = c.position();
        c.set_position(end);

        let data = result?;
        if consumed != end {
            warn!("Record data length {} but fields consumed {}", stated_length, consumed - start);
            return Err(WireError::WrongLabelLength {
                stated_length,
                length_after_labels: (consumed - start) as u16,
            });
        }

        Ok(Self { name, rtype, qclass, ttl, data })
    }

    /// Writes the record. The buffer must be the whole message so far;
    /// the data length is measured and patched in after the data is
    /// written.
    pub fn write(&self, buf: &mut Vec<u8>, compressor: &mut Compressor) -> io::Result<()> {
        self.name.write(buf, Some(compressor))?;
        buf.write_u16::<BigEndian>(self.rtype.to_u16())?;
        buf.write_u16::<BigEndian>(self.qclass.to_u16())?;
        buf.write_u32::<BigEndian>(self.ttl)?;

        let length_position = buf.len();
        buf.write_u16::<BigEndian>(0)?;

        let rdata_compressor = if self.rtype.compresses_names() {
            Some(&mut *compressor)
        }
        else {
            None
        };
        self.data.write(self.rtype, buf, rdata_compressor)?;

        let rdata_len = buf.len() - length_position - 2;
        buf[length_position .. length_position + 2]
            .copy_from_slice(&(rdata_len as u16).to_be_bytes());
        Ok(())
    }

    /// The size of this record on the wire with no compression applied.
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 10 + self.data.wire_len(self.rtype)
    }

    /// The target of an NS, CNAME, DNAME, PTR, or similar single-name
    /// record, if this is one.
    pub fn target_name(&self) -> Option<&Name> {
        match self.rtype {
            RecordType::NS | RecordType::CNAME | RecordType::DNAME
            | RecordType::PTR | RecordType::MD | RecordType::MF
            | RecordType::MB | RecordType::MG | RecordType::MR => {
                self.data.first_name()
            }
            _ => None,
        }
    }

    /// The address of an A or AAAA record, if this is one.
    pub fn address(&self) -> Option<std::net::IpAddr> {
        match self.data.fields() {
            [FieldValue::Inet4(a)] => Some(std::net::IpAddr::V4(*a)),
            [FieldValue::Inet6(a)] => Some(std::net::IpAddr::V6(*a)),
            _ => None,
        }
    }

    /// The MINIMUM field of an SOA record, used as the negative-caching
    /// TTL bound, if this is an SOA.
    pub fn soa_minimum(&self) -> Option<u32> {
        if self.rtype != RecordType::SOA {
            return None;
        }
        match self.data.fields().last() {
            Some(FieldValue::U32(min)) => Some(*min),
            _ => None,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}\t{}",
               self.name, self.ttl, self.qclass, self.rtype,
               rdata_to_string(self.rtype, &self.data))
    }
}
